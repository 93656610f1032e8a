//! vaultcert library
//!
//! Keeps an ACME-issued TLS certificate valid inside Azure Key Vault.
//!
//! Every check interval the [`RenewalOrchestrator`] reads the stored
//! certificate's expiry, and when renewal is due it obtains a new chain over
//! HTTP-01, repacks it as a password-protected PKCS#12 bundle and imports it
//! into the vault. Failures are reported through a [`Notifier`] and retried
//! on the next tick.
//!
//! # Example
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//! use vaultcert::{Collaborators, Service};
//! use vaultcert_config::Config;
//!
//! let config = Config::from_env()?;
//! let collaborators = Collaborators::from_config(&config)?;
//! let service = Service::start(&config, collaborators).await?;
//! service.run(CancellationToken::new()).await;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod bundle;
pub mod expiry;
pub mod lifecycle;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod server;
pub mod signals;
pub mod vault;

#[cfg(test)]
mod test_support;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Challenge handling and issuance
pub use acme::{
    AcmeClient, AcmeError, CertificateIssuer, ChallengeResponder, ChallengeStore,
    ObtainedCertificate,
};

// Bundle conversion
pub use bundle::{convert, Bundle, ConversionError};

// Renewal policy
pub use expiry::needs_renewal;

// Secret store
pub use vault::{CertificateDescriptor, KeyVaultClient, SecretStore, VaultError};

// Notifications
pub use notify::{DisabledNotifier, EmailNotifier, Notifier, NotifyError};

// Renewal cycle
pub use orchestrator::{CycleError, CycleOutcome, RenewalOrchestrator, RenewalTarget};
pub use scheduler::RenewalScheduler;

// HTTP responder
pub use server::ChallengeServer;

// Lifecycle
pub use lifecycle::{Collaborators, LifecycleState, Service, StartupError};
