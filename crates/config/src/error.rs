//! Configuration errors.
//!
//! Every variant is fatal: the service never leaves its starting phase with
//! an invalid configuration.

use thiserror::Error;
use vaultcert_common::DomainSetError;

/// Configuration is missing or invalid
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment could not be mapped at all
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    /// A required variable is unset or blank
    #[error("Required environment variable {var} is not set")]
    Missing { var: &'static str },

    /// A variable is set but cannot be parsed
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: &'static str, message: String },

    /// The domain list is empty or contains a malformed hostname
    #[error("Invalid DOMAINS: {0}")]
    Domains(#[from] DomainSetError),

    /// Field or cross-field validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
