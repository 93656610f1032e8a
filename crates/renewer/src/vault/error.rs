//! Secret store error types

use thiserror::Error;

/// Errors talking to the secret store or its token endpoint
#[derive(Debug, Error)]
pub enum VaultError {
    /// Transport failure
    #[error("HTTP request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The vault answered with an unexpected status
    #[error("Key Vault returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// A bearer token could not be obtained
    #[error("Failed to acquire access token: {0}")]
    Token(String),

    /// A response body did not have the expected shape
    #[error("Unexpected response from {operation}: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}
