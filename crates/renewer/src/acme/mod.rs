//! ACME certificate issuance
//!
//! # Architecture
//!
//! - [`ChallengeStore`] - Pending HTTP-01 challenges, served by the HTTP responder
//! - [`AcmeClient`] - Wrapper around `instant-acme` implementing [`CertificateIssuer`]
//!
//! # Challenge Flow
//!
//! 1. [`AcmeClient`] creates an order for every configured domain
//! 2. For each pending authorization it publishes the HTTP-01 token and key
//!    authorization through [`ChallengeResponder::present`]
//! 3. The CA fetches `/.well-known/acme-challenge/<token>` from the HTTP responder
//! 4. Once the order is ready (or has failed) every published token is withdrawn
//! 5. The order is finalized with a CSR for a fresh RSA key and the chain is returned

mod challenge;
mod client;
mod error;

pub use challenge::{ChallengeResponder, ChallengeStore, ACME_CHALLENGE_PREFIX};
pub use client::{AcmeClient, CertificateIssuer, ObtainedCertificate};
pub use error::AcmeError;
