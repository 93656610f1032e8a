//! Bearer token acquisition for Key Vault.
//!
//! Supports the service principal client-credentials flow, workload identity
//! federation, the App Service identity endpoint and the Azure instance
//! metadata (managed identity) endpoint. Tokens are cached until shortly
//! before they expire.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use vaultcert_config::CredentialConfig;

use super::error::VaultError;

/// Resource the tokens are issued for
const VAULT_RESOURCE: &str = "https://vault.azure.net";
/// IMDS API version for managed identity tokens
const IMDS_API_VERSION: &str = "2018-02-01";
/// App Service identity endpoint API version
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
/// Header carrying the App Service identity secret
const IDENTITY_HEADER_NAME: &str = "X-IDENTITY-HEADER";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
/// Refresh this long before the token actually expires
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// Token payload from any of the supported endpoints.
///
/// AAD and IMDS report a relative `expires_in`; the App Service endpoint
/// reports an absolute `expires_on` in Unix seconds.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<NumberOrText>,
    #[serde(default)]
    expires_on: Option<NumberOrText>,
}

impl TokenResponse {
    fn lifetime(&self) -> Result<Duration, VaultError> {
        if let Some(expires_in) = &self.expires_in {
            return Ok(Duration::from_secs(expires_in.value("expires_in")?));
        }

        match &self.expires_on {
            Some(expires_on) => {
                let expires_on = expires_on.value("expires_on")?;
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                Ok(Duration::from_secs(expires_on.saturating_sub(now)))
            }
            None => Err(VaultError::Token(
                "token response carries neither expires_in nor expires_on".to_string(),
            )),
        }
    }
}

/// IMDS and App Service report numbers as strings, AAD as numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

impl NumberOrText {
    fn value(&self, field: &str) -> Result<u64, VaultError> {
        match self {
            NumberOrText::Number(value) => Ok(*value),
            NumberOrText::Text(text) => text.trim().parse().map_err(|_| {
                VaultError::Token(format!("invalid {} value '{}'", field, text))
            }),
        }
    }
}

/// Source of Key Vault access tokens
#[derive(Debug)]
pub struct TokenCredential {
    http: reqwest::Client,
    source: CredentialConfig,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenCredential {
    pub fn new(http: reqwest::Client, source: CredentialConfig) -> Self {
        Self {
            http,
            source,
            cache: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a new one if needed
    pub async fn token(&self) -> Result<String, VaultError> {
        let cached = self.cache.lock().clone();
        if let Some(cached) = cached {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.access_token);
            }
        }

        let response = self.fetch().await?;
        let lifetime = response.lifetime()?;
        let cached = CachedToken {
            access_token: response.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        };

        debug!(
            source = self.source.kind(),
            expires_in_secs = lifetime.as_secs(),
            "Acquired Key Vault access token"
        );

        let token = cached.access_token.clone();
        *self.cache.lock() = Some(cached);
        Ok(token)
    }

    async fn fetch(&self) -> Result<TokenResponse, VaultError> {
        let scope = format!("{}/.default", VAULT_RESOURCE);

        let (url, request) = match &self.source {
            CredentialConfig::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
                authority_host,
            } => {
                let url = token_url(authority_host, tenant_id);
                let request = self.http.post(&url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.expose()),
                    ("scope", scope.as_str()),
                ]);
                (url, request)
            }
            CredentialConfig::WorkloadIdentity {
                tenant_id,
                client_id,
                token_file,
                authority_host,
            } => {
                let assertion = tokio::fs::read_to_string(token_file).await.map_err(|e| {
                    VaultError::Token(format!(
                        "failed to read federated token file {}: {}",
                        token_file.display(),
                        e
                    ))
                })?;
                let url = token_url(authority_host, tenant_id);
                let request = self.http.post(&url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                    ("client_assertion", assertion.trim()),
                    ("scope", scope.as_str()),
                ]);
                (url, request)
            }
            CredentialConfig::AppServiceIdentity {
                endpoint,
                identity_header,
                client_id,
            } => {
                let mut query = vec![
                    ("api-version", APP_SERVICE_API_VERSION),
                    ("resource", VAULT_RESOURCE),
                ];
                if let Some(client_id) = client_id {
                    query.push(("client_id", client_id.as_str()));
                }
                let request = self
                    .http
                    .get(endpoint)
                    .header(IDENTITY_HEADER_NAME, identity_header.expose())
                    .query(&query);
                (endpoint.clone(), request)
            }
            CredentialConfig::ManagedIdentity { endpoint, client_id } => {
                let mut query = vec![
                    ("api-version", IMDS_API_VERSION),
                    ("resource", VAULT_RESOURCE),
                ];
                if let Some(client_id) = client_id {
                    query.push(("client_id", client_id.as_str()));
                }
                let request = self
                    .http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query);
                (endpoint.clone(), request)
            }
        };

        let response = request.send().await.map_err(|source| VaultError::Http {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::Token(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| VaultError::Token(format!("invalid token response: {}", e)))
    }
}

fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}
