//! ACME client wrapper around instant-acme
//!
//! Registers the account once, then for every renewal creates an order,
//! answers the HTTP-01 challenges through the injected
//! [`ChallengeResponder`], finalizes with a fresh RSA key and returns the
//! issued chain.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    Account, AuthorizationStatus, ChallengeType, Identifier, NewAccount, NewOrder, Order,
    OrderStatus,
};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace};

use vaultcert_common::DomainSet;
use vaultcert_config::AcmeConfig;

use super::challenge::ChallengeResponder;
use super::error::AcmeError;

/// Timeout for challenge validation
const CHALLENGE_TIMEOUT: Duration = Duration::from_secs(120);
/// Timeout for certificate issuance after finalization
const ISSUANCE_TIMEOUT: Duration = Duration::from_secs(60);
/// Delay between order status polls
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Size of the certificate key; Key Vault imports require RSA
const CERT_KEY_BITS: usize = 2048;

/// Certificate material returned by a successful order.
///
/// Lives only for the duration of one renewal cycle.
#[derive(Clone)]
pub struct ObtainedCertificate {
    /// PEM chain as returned by the CA, leaf first
    pub cert_chain_pem: String,
    /// PKCS#8 PEM private key for the leaf
    pub key_pem: String,
}

impl fmt::Debug for ObtainedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObtainedCertificate")
            .field("cert_chain_pem", &self.cert_chain_pem)
            .field("key_pem", &"***")
            .finish()
    }
}

/// Something that can issue certificates for a domain set
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Create or look up the ACME account; called once at startup
    async fn register(&self) -> Result<(), AcmeError>;

    /// Run a full order for `domains`
    async fn obtain(&self, domains: &DomainSet) -> Result<ObtainedCertificate, AcmeError>;
}

/// ACME client for HTTP-01 certificate issuance
pub struct AcmeClient {
    /// ACME account, set by `register`
    account: RwLock<Option<Account>>,
    /// Directory settings
    config: AcmeConfig,
    /// Contact address used on registration
    email: String,
    /// Where challenge proofs are published
    responder: Arc<dyn ChallengeResponder>,
}

impl AcmeClient {
    /// Create a new ACME client
    ///
    /// # Arguments
    ///
    /// * `config` - ACME directory settings
    /// * `email` - Account contact address
    /// * `responder` - Challenge publication capability, normally the
    ///   [`ChallengeStore`](super::ChallengeStore) behind the HTTP responder
    pub fn new(config: AcmeConfig, email: impl Into<String>, responder: Arc<dyn ChallengeResponder>) -> Self {
        Self {
            account: RwLock::new(None),
            config,
            email: email.into(),
            responder,
        }
    }

    /// Answer every pending HTTP-01 challenge of `order`.
    ///
    /// Tokens are pushed onto `presented` as soon as they are published so
    /// the caller can withdraw them even if this fails part way.
    async fn answer_challenges(
        &self,
        order: &mut Order,
        presented: &mut Vec<String>,
    ) -> Result<(), AcmeError> {
        let mut authorizations = order.authorizations();

        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| {
                AcmeError::OrderCreation(format!("Failed to get authorization: {}", e))
            })?;

            let domain = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.clone(),
                _ => continue,
            };

            debug!(domain = %domain, status = ?authz.status, "Processing authorization");

            if authz.status == AuthorizationStatus::Valid {
                debug!(domain = %domain, "Authorization already valid");
                continue;
            }

            let mut challenge = authz
                .challenge(ChallengeType::Http01)
                .ok_or_else(|| AcmeError::NoHttp01Challenge(domain.clone()))?;

            let token = challenge.token.clone();
            let key_authorization = challenge.key_authorization();

            self.responder.present(&token, key_authorization.as_str());
            presented.push(token);

            challenge
                .set_ready()
                .await
                .map_err(|e| AcmeError::ChallengeValidation {
                    domain: domain.clone(),
                    message: e.to_string(),
                })?;
        }

        Ok(())
    }

    /// Poll the order until the CA has validated every authorization
    async fn wait_for_order_ready(&self, order: &mut Order) -> Result<(), AcmeError> {
        let deadline = tokio::time::Instant::now() + CHALLENGE_TIMEOUT;

        loop {
            let status = order
                .refresh()
                .await
                .map_err(|e| AcmeError::OrderCreation(format!("Failed to refresh order: {}", e)))?
                .status;

            match status {
                OrderStatus::Ready | OrderStatus::Valid => {
                    info!("Order is ready for finalization");
                    return Ok(());
                }
                OrderStatus::Invalid => {
                    error!("Order became invalid during validation");
                    return Err(AcmeError::OrderInvalid(
                        "one or more challenges failed validation".to_string(),
                    ));
                }
                OrderStatus::Pending | OrderStatus::Processing => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(AcmeError::Timeout(
                            "Timed out waiting for order to become ready".to_string(),
                        ));
                    }
                    trace!(status = ?status, "Order not ready yet, waiting...");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Finalize with a fresh RSA key and download the chain
    async fn finalize_order(
        &self,
        order: &mut Order,
        domains: &DomainSet,
    ) -> Result<ObtainedCertificate, AcmeError> {
        info!("Finalizing certificate order");

        let key_pem = generate_rsa_key_pem().await?;
        let csr = build_csr(domains, &key_pem)?;

        order
            .finalize_csr(&csr)
            .await
            .map_err(|e| AcmeError::Finalization(format!("Failed to finalize order: {}", e)))?;

        let deadline = tokio::time::Instant::now() + ISSUANCE_TIMEOUT;
        let cert_chain_pem = loop {
            let status = order
                .refresh()
                .await
                .map_err(|e| AcmeError::Finalization(format!("Failed to refresh order: {}", e)))?
                .status;

            match status {
                OrderStatus::Valid => {
                    let chain = order.certificate().await.map_err(|e| {
                        AcmeError::Finalization(format!("Failed to get certificate: {}", e))
                    })?;
                    break chain.ok_or_else(|| {
                        AcmeError::Finalization("No certificate in response".to_string())
                    })?;
                }
                OrderStatus::Invalid => {
                    return Err(AcmeError::OrderInvalid(
                        "order rejected after finalization".to_string(),
                    ));
                }
                _ => {
                    if tokio::time::Instant::now() > deadline {
                        return Err(AcmeError::Timeout(
                            "Timed out waiting for certificate".to_string(),
                        ));
                    }
                    tokio::time::sleep(POLL_INTERVAL / 2).await;
                }
            }
        };

        Ok(ObtainedCertificate {
            cert_chain_pem,
            key_pem,
        })
    }
}

#[async_trait]
impl CertificateIssuer for AcmeClient {
    async fn register(&self) -> Result<(), AcmeError> {
        info!(
            email = %self.email,
            directory = %self.config.directory_url,
            "Registering ACME account"
        );

        let contact = format!("mailto:{}", self.email);
        let (account, _credentials) = Account::builder()
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?
            .create(
                &NewAccount {
                    contact: &[&contact],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.config.directory_url.clone(),
                None,
            )
            .await
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?;

        *self.account.write().await = Some(account);
        info!("ACME account registered");

        Ok(())
    }

    async fn obtain(&self, domains: &DomainSet) -> Result<ObtainedCertificate, AcmeError> {
        let account_guard = self.account.read().await;
        let account = account_guard.as_ref().ok_or(AcmeError::NoAccount)?;

        let identifiers: Vec<Identifier> = domains
            .iter()
            .map(|d| Identifier::Dns(d.to_string()))
            .collect();

        info!(domains = %domains, "Creating certificate order");

        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| AcmeError::OrderCreation(e.to_string()))?;

        let mut presented = Vec::new();
        let validated = match self.answer_challenges(&mut order, &mut presented).await {
            Ok(()) => self.wait_for_order_ready(&mut order).await,
            Err(e) => Err(e),
        };

        for token in &presented {
            self.responder.clean_up(token);
        }
        validated?;

        let obtained = self.finalize_order(&mut order, domains).await?;
        info!(domains = %domains, "Certificate issued successfully");

        Ok(obtained)
    }
}

impl fmt::Debug for AcmeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcmeClient")
            .field("config", &self.config)
            .field("email", &self.email)
            .field(
                "has_account",
                &self
                    .account
                    .try_read()
                    .map(|a| a.is_some())
                    .unwrap_or(false),
            )
            .finish()
    }
}

/// Generate an RSA key off the async runtime and return it as PKCS#8 PEM
async fn generate_rsa_key_pem() -> Result<String, AcmeError> {
    tokio::task::spawn_blocking(|| {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), CERT_KEY_BITS)
            .map_err(|e| AcmeError::KeyGeneration(e.to_string()))?;
        key.to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| AcmeError::KeyGeneration(e.to_string()))
    })
    .await
    .map_err(|e| AcmeError::KeyGeneration(format!("Key generation task failed: {}", e)))?
}

/// Build a DER CSR covering every domain, named after the primary one and
/// signed with `key_pem`
fn build_csr(domains: &DomainSet, key_pem: &str) -> Result<Vec<u8>, AcmeError> {
    let key_pair = rcgen::KeyPair::from_pem_and_sign_algo(key_pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| AcmeError::KeyGeneration(format!("Failed to load key: {}", e)))?;

    let mut params = rcgen::CertificateParams::new(domains.as_slice().to_vec())
        .map_err(|e| AcmeError::Finalization(format!("Failed to create CSR params: {}", e)))?;
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, domains.primary());

    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| AcmeError::Finalization(format!("Failed to serialize CSR: {}", e)))?;

    Ok(csr.der().to_vec())
}
