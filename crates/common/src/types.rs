//! Type-safe newtypes shared across vaultcert crates.
//!
//! These types keep domain lists, certificate object names and secrets from
//! being passed around as interchangeable `String`s.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced when building a [`DomainSet`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainSetError {
    /// No hostnames were supplied
    #[error("domain set must contain at least one hostname")]
    Empty,

    /// A hostname failed basic syntax checks
    #[error("invalid hostname '{domain}': {reason}")]
    InvalidHostname { domain: String, reason: &'static str },
}

// ============================================================================
// Domain Set
// ============================================================================

/// Ordered, non-empty list of hostnames covered by one certificate.
///
/// The first entry is the primary name. Order is preserved exactly as
/// configured and the set is never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DomainSet(Vec<String>);

impl DomainSet {
    /// Build a domain set from individual hostnames.
    ///
    /// Surrounding whitespace is trimmed and blank entries are dropped
    /// before validation.
    pub fn new<I, S>(domains: I) -> Result<Self, DomainSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains: Vec<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        if domains.is_empty() {
            return Err(DomainSetError::Empty);
        }

        for domain in &domains {
            validate_hostname(domain)?;
        }

        Ok(Self(domains))
    }

    /// Parse a comma-separated list such as `example.com,www.example.com`
    pub fn parse_list(list: &str) -> Result<Self, DomainSetError> {
        Self::new(list.split(','))
    }

    /// The primary (first) hostname
    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    /// All hostnames in configured order
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Number of hostnames
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over hostnames in configured order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for DomainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl TryFrom<Vec<String>> for DomainSet {
    type Error = DomainSetError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DomainSet> for Vec<String> {
    fn from(value: DomainSet) -> Self {
        value.0
    }
}

fn validate_hostname(domain: &str) -> Result<(), DomainSetError> {
    let reason = if domain.contains(char::is_whitespace) {
        Some("contains whitespace")
    } else if domain.starts_with('.') || domain.ends_with('.') {
        Some("starts or ends with a dot")
    } else if domain.contains('/') || domain.contains(':') {
        Some("contains '/' or ':'")
    } else if domain.contains("..") {
        Some("contains an empty label")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DomainSetError::InvalidHostname {
            domain: domain.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Certificate Name
// ============================================================================

/// Name of the certificate object inside the remote secret store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertificateName(String);

impl CertificateName {
    /// Create from an existing string
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CertificateName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CertificateName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Secret String
// ============================================================================

/// A string that never prints its contents.
///
/// Used for bundle passwords and credentials. The empty string is a valid
/// secret and is kept as-is.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Access the secret value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is the empty string
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}
