//! Remote certificate storage.
//!
//! [`SecretStore`] is what the orchestrator talks to; [`KeyVaultClient`] is
//! the Azure Key Vault implementation.

mod credential;
mod error;
mod keyvault;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vaultcert_common::{CertificateName, SecretString};

pub use credential::TokenCredential;
pub use error::VaultError;
pub use keyvault::{KeyVaultClient, API_VERSION};

/// Metadata the store keeps for a certificate object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateDescriptor {
    /// Expiry of the current version, if the store reports one
    pub expires: Option<DateTime<Utc>>,
}

/// Where renewed certificates end up
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the descriptor for `name`; `Ok(None)` if no such certificate
    async fn get_certificate_metadata(
        &self,
        name: &CertificateName,
    ) -> Result<Option<CertificateDescriptor>, VaultError>;

    /// Import a base64 PKCS#12 bundle as a new version of `name`
    async fn import_certificate(
        &self,
        name: &CertificateName,
        bundle_base64: &str,
        password: &SecretString,
    ) -> Result<(), VaultError>;
}
