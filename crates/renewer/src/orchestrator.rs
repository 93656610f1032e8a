//! One renewal cycle: expiry check, obtain, convert, upload.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use vaultcert_common::{CertificateName, DomainSet, SecretString};
use vaultcert_config::Config;

use crate::acme::{AcmeError, CertificateIssuer};
use crate::bundle::{self, ConversionError};
use crate::expiry::needs_renewal;
use crate::notify::error_chain;
use crate::vault::{SecretStore, VaultError};

/// What a successful cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The stored certificate is still good
    Skipped,
    /// A new certificate was issued and imported
    Renewed,
}

/// A cycle stage failed; nothing was written to the store
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to obtain certificate")]
    ObtainFailed(#[source] AcmeError),

    #[error("failed to convert certificate to PKCS#12")]
    ConversionFailed(#[source] ConversionError),

    #[error("failed to upload certificate to Key Vault")]
    UploadFailed(#[source] VaultError),
}

/// Inputs that stay fixed for every cycle
#[derive(Debug, Clone)]
pub struct RenewalTarget {
    pub domains: DomainSet,
    pub cert_name: CertificateName,
    pub bundle_password: SecretString,
    pub renew_before_days: u32,
}

impl From<&Config> for RenewalTarget {
    fn from(config: &Config) -> Self {
        Self {
            domains: config.domains.clone(),
            cert_name: config.vault.cert_name.clone(),
            bundle_password: config.bundle_password.clone(),
            renew_before_days: config.renewal.renew_before_days,
        }
    }
}

/// Runs renewal cycles against injected collaborators
pub struct RenewalOrchestrator {
    target: RenewalTarget,
    issuer: Arc<dyn CertificateIssuer>,
    store: Arc<dyn SecretStore>,
}

impl RenewalOrchestrator {
    pub fn new(
        target: RenewalTarget,
        issuer: Arc<dyn CertificateIssuer>,
        store: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            target,
            issuer,
            store,
        }
    }

    pub fn target(&self) -> &RenewalTarget {
        &self.target
    }

    /// Run one cycle.
    ///
    /// Safe to call repeatedly: every call starts by re-reading the stored
    /// certificate, so a cycle after a successful renewal is a no-op.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let target = &self.target;

        let descriptor = match self.store.get_certificate_metadata(&target.cert_name).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(
                    certificate = %target.cert_name,
                    error = %error_chain(&e),
                    "Failed to query certificate metadata, assuming renewal is needed"
                );
                None
            }
        };

        if let Some(expires) = descriptor.as_ref().and_then(|d| d.expires) {
            debug!(
                certificate = %target.cert_name,
                expires = %expires,
                renew_before_days = target.renew_before_days,
                "Current certificate expiry"
            );
        }

        if !needs_renewal(descriptor.as_ref(), target.renew_before_days, Utc::now()) {
            info!(
                certificate = %target.cert_name,
                "Certificate is still valid, skipping renewal"
            );
            return Ok(CycleOutcome::Skipped);
        }

        info!(
            certificate = %target.cert_name,
            domains = %target.domains,
            "Certificate needs renewal"
        );

        let obtained = self
            .issuer
            .obtain(&target.domains)
            .await
            .map_err(CycleError::ObtainFailed)?;

        let bundle = bundle::convert(
            &obtained.cert_chain_pem,
            &obtained.key_pem,
            &target.bundle_password,
        )
        .map_err(CycleError::ConversionFailed)?;

        self.store
            .import_certificate(&target.cert_name, &bundle.to_base64(), bundle.password())
            .await
            .map_err(CycleError::UploadFailed)?;

        info!(
            certificate = %target.cert_name,
            domains = %target.domains,
            "Certificate renewed"
        );
        Ok(CycleOutcome::Renewed)
    }
}

impl std::fmt::Debug for RenewalOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalOrchestrator")
            .field("target", &self.target)
            .finish()
    }
}
