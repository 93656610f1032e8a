//! Common types and utilities shared by the vaultcert crates.
//!
//! - [`types`]: domain set, certificate name and secret newtypes
//! - [`logging`]: `tracing-subscriber` setup for binaries

pub mod types;

#[cfg(feature = "runtime")]
pub mod logging;

pub use types::{CertificateName, DomainSet, DomainSetError, SecretString};

#[cfg(feature = "runtime")]
pub use logging::{init_logging, LogFormat};
