//! Azure Key Vault certificates REST client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use vaultcert_common::{CertificateName, SecretString};
use vaultcert_config::VaultConfig;

use super::credential::TokenCredential;
use super::error::VaultError;
use super::{CertificateDescriptor, SecretStore};

/// Key Vault REST API version
pub const API_VERSION: &str = "7.4";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in a [`VaultError::Status`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct CertificateBundle {
    #[serde(default)]
    attributes: Option<CertificateAttributes>,
}

#[derive(Debug, Deserialize)]
struct CertificateAttributes {
    /// Expiry as Unix seconds
    #[serde(default)]
    exp: Option<i64>,
}

/// Client for one vault
#[derive(Debug)]
pub struct KeyVaultClient {
    http: reqwest::Client,
    endpoint: String,
    credential: TokenCredential,
}

impl KeyVaultClient {
    /// Build a client from validated configuration
    pub fn new(config: &VaultConfig) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| VaultError::Http {
                url: config.endpoint.clone(),
                source,
            })?;

        Ok(Self::with_http(http, config))
    }

    /// Build a client around an existing HTTP client
    fn with_http(http: reqwest::Client, config: &VaultConfig) -> Self {
        Self {
            credential: TokenCredential::new(http.clone(), config.credential.clone()),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn certificate_url(&self, name: &CertificateName) -> String {
        format!("{}/certificates/{}", self.endpoint, name)
    }
}

#[async_trait]
impl SecretStore for KeyVaultClient {
    async fn get_certificate_metadata(
        &self,
        name: &CertificateName,
    ) -> Result<Option<CertificateDescriptor>, VaultError> {
        let url = self.certificate_url(name);
        let token = self.credential.token().await?;

        let response = self
            .http
            .get(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| VaultError::Http {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(certificate = %name, "Certificate not found in Key Vault");
                Ok(None)
            }
            status if status.is_success() => {
                let bundle: CertificateBundle =
                    response
                        .json()
                        .await
                        .map_err(|e| VaultError::InvalidResponse {
                            operation: "get certificate",
                            message: e.to_string(),
                        })?;

                let expires = bundle
                    .attributes
                    .and_then(|a| a.exp)
                    .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0));

                debug!(
                    certificate = %name,
                    expires = ?expires,
                    "Fetched certificate metadata"
                );
                Ok(Some(CertificateDescriptor { expires }))
            }
            status => Err(status_error("get certificate", status, response).await),
        }
    }

    async fn import_certificate(
        &self,
        name: &CertificateName,
        bundle_base64: &str,
        password: &SecretString,
    ) -> Result<(), VaultError> {
        let url = format!("{}/import", self.certificate_url(name));
        let token = self.credential.token().await?;

        // pwd is sent even when empty
        let body = json!({
            "value": bundle_base64,
            "pwd": password.expose(),
            "policy": {
                "secret_props": { "contentType": "application/x-pkcs12" }
            }
        });

        let response = self
            .http
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|source| VaultError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error("import certificate", status, response).await);
        }

        info!(certificate = %name, "Imported certificate into Key Vault");
        Ok(())
    }
}

async fn status_error(
    operation: &'static str,
    status: StatusCode,
    response: reqwest::Response,
) -> VaultError {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    VaultError::Status {
        operation,
        status: status.as_u16(),
        body,
    }
}
