//! Renewal decision.

use chrono::{DateTime, Duration, Utc};

use crate::vault::CertificateDescriptor;

/// Decide whether the stored certificate must be renewed.
///
/// A missing descriptor or a descriptor without an expiry always needs
/// renewal. Otherwise renewal is due once `now` is strictly past
/// `expires - lead_days`; exactly at that instant it is not yet due.
pub fn needs_renewal(
    descriptor: Option<&CertificateDescriptor>,
    lead_days: u32,
    now: DateTime<Utc>,
) -> bool {
    let Some(expires) = descriptor.and_then(|d| d.expires) else {
        return true;
    };

    match expires.checked_sub_signed(Duration::days(i64::from(lead_days))) {
        Some(renewal_date) => now > renewal_date,
        None => true,
    }
}
