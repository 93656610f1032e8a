//! ACME error types

use thiserror::Error;

/// Errors that can occur while talking to the certificate authority
#[derive(Debug, Error)]
pub enum AcmeError {
    /// No ACME account has been registered
    #[error("ACME account not registered - call register() first")]
    NoAccount,

    /// Failed to create the ACME account
    #[error("Failed to create ACME account: {0}")]
    AccountCreation(String),

    /// Failed to create certificate order
    #[error("Failed to create certificate order: {0}")]
    OrderCreation(String),

    /// Challenge validation failed
    #[error("Challenge validation failed for domain '{domain}': {message}")]
    ChallengeValidation { domain: String, message: String },

    /// No HTTP-01 challenge offered for a domain
    #[error("No HTTP-01 challenge available for domain '{0}'")]
    NoHttp01Challenge(String),

    /// The order ended up invalid
    #[error("Order became invalid: {0}")]
    OrderInvalid(String),

    /// Certificate key or CSR generation failed
    #[error("Failed to generate certificate key: {0}")]
    KeyGeneration(String),

    /// Certificate finalization failed
    #[error("Failed to finalize certificate: {0}")]
    Finalization(String),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

