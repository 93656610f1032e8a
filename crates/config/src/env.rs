//! Environment variable mapping.
//!
//! `envy` maps variables onto [`RawEnv`] by lower-cased name
//! (`AZURE_CERT_NAME` → `azure_cert_name`). Every field is kept as a string
//! here so that parse errors can name the offending variable.

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vaultcert_common::{CertificateName, DomainSet, LogFormat, SecretString};

use crate::error::ConfigError;
use crate::{
    AcmeConfig, Config, CredentialConfig, LoggingConfig, NotificationConfig, RenewalConfig,
    ServerConfig, VaultConfig, DEFAULT_AUTHORITY_HOST, DEFAULT_CHECK_INTERVAL,
    DEFAULT_IDENTITY_ENDPOINT, DEFAULT_LISTEN_ADDR, DEFAULT_RENEW_BEFORE_DAYS,
    DEFAULT_SHUTDOWN_GRACE, DEFAULT_SMTP_PORT, LETSENCRYPT_PRODUCTION,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawEnv {
    domains: Option<String>,
    email: Option<String>,
    azure_keyvault_name: Option<String>,
    azure_cert_name: Option<String>,
    pfx_password: Option<String>,
    check_interval: Option<String>,
    renew_before_days: Option<String>,
    acme_directory_url: Option<String>,
    listen_addr: Option<String>,
    shutdown_grace: Option<String>,
    azure_keyvault_endpoint: Option<String>,
    azure_tenant_id: Option<String>,
    azure_client_id: Option<String>,
    azure_client_secret: Option<String>,
    azure_authority_host: Option<String>,
    azure_federated_token_file: Option<String>,
    identity_endpoint: Option<String>,
    identity_header: Option<String>,
    notify_email_enabled: Option<String>,
    smtp_host: Option<String>,
    smtp_port: Option<String>,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    smtp_from: Option<String>,
    smtp_to: Option<String>,
    log_level: Option<String>,
    log_format: Option<String>,
}

impl RawEnv {
    pub(crate) fn into_config(self) -> Result<Config, ConfigError> {
        let domains_raw = required(self.domains, "DOMAINS")?;
        let domains = DomainSet::parse_list(&domains_raw)?;
        let email = required(self.email, "EMAIL")?;
        let vault_name = required(self.azure_keyvault_name, "AZURE_KEYVAULT_NAME")?;
        let cert_name = required(self.azure_cert_name, "AZURE_CERT_NAME")?;

        let renewal = RenewalConfig {
            check_interval: parse_or(self.check_interval, "CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL, parse_duration)?,
            renew_before_days: parse_or(
                self.renew_before_days,
                "RENEW_BEFORE_DAYS",
                DEFAULT_RENEW_BEFORE_DAYS,
                parse_from_str,
            )?,
        };

        let acme = AcmeConfig {
            directory_url: optional(self.acme_directory_url)
                .unwrap_or_else(|| LETSENCRYPT_PRODUCTION.to_string()),
        };

        let server = ServerConfig {
            listen_addr: optional(self.listen_addr).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            shutdown_grace: parse_or(self.shutdown_grace, "SHUTDOWN_GRACE", DEFAULT_SHUTDOWN_GRACE, parse_duration)?,
        };

        let tenant_id = optional(self.azure_tenant_id);
        let client_id = optional(self.azure_client_id);
        let authority_host =
            optional(self.azure_authority_host).unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        // Same precedence as the Azure SDK default chain
        let credential = match (
            tenant_id,
            client_id,
            optional(self.azure_client_secret),
            optional(self.azure_federated_token_file),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret), _) => CredentialConfig::ClientSecret {
                tenant_id,
                client_id,
                client_secret: SecretString::new(client_secret),
                authority_host,
            },
            (Some(tenant_id), Some(client_id), None, Some(token_file)) => CredentialConfig::WorkloadIdentity {
                tenant_id,
                client_id,
                token_file: PathBuf::from(token_file),
                authority_host,
            },
            (_, client_id, _, _) => match (optional(self.identity_endpoint), optional(self.identity_header)) {
                (Some(endpoint), Some(identity_header)) => CredentialConfig::AppServiceIdentity {
                    endpoint,
                    identity_header: SecretString::new(identity_header),
                    client_id,
                },
                (endpoint, _) => CredentialConfig::ManagedIdentity {
                    endpoint: endpoint.unwrap_or_else(|| DEFAULT_IDENTITY_ENDPOINT.to_string()),
                    client_id,
                },
            },
        };

        let vault = VaultConfig {
            endpoint: optional(self.azure_keyvault_endpoint)
                .unwrap_or_else(|| format!("https://{}.vault.azure.net", vault_name)),
            name: vault_name,
            cert_name: CertificateName::new(cert_name),
            credential,
        };

        let notification = NotificationConfig {
            enabled: parse_or(self.notify_email_enabled, "NOTIFY_EMAIL_ENABLED", false, parse_flag)?,
            smtp_host: optional(self.smtp_host),
            smtp_port: parse_or(self.smtp_port, "SMTP_PORT", DEFAULT_SMTP_PORT, parse_from_str)?,
            username: optional(self.smtp_username),
            password: optional(self.smtp_password).map(SecretString::new),
            from: optional(self.smtp_from).unwrap_or_else(|| email.clone()),
            to: optional(self.smtp_to).unwrap_or_else(|| email.clone()),
        };

        let logging = LoggingConfig {
            level: optional(self.log_level).unwrap_or_else(|| "info".to_string()),
            format: parse_or(self.log_format, "LOG_FORMAT", LogFormat::Text, |v| {
                v.parse::<LogFormat>()
            })?,
        };

        Ok(Config {
            domains,
            email,
            // Empty is a legitimate password, so no blank filtering here
            bundle_password: SecretString::new(self.pfx_password.unwrap_or_default()),
            renewal,
            acme,
            vault,
            server,
            notification,
            logging,
        })
    }
}

/// Treat unset and blank variables the same way
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, var: &'static str) -> Result<String, ConfigError> {
    optional(value).ok_or(ConfigError::Missing { var })
}

fn parse_or<T, E, F>(value: Option<String>, var: &'static str, default: T, parse: F) -> Result<T, ConfigError>
where
    F: FnOnce(&str) -> Result<T, E>,
    E: ToString,
{
    match optional(value) {
        Some(v) => parse(&v).map_err(|e| ConfigError::InvalidValue {
            var,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}

fn parse_from_str<T: FromStr>(value: &str) -> Result<T, T::Err> {
    value.parse::<T>()
}

/// Only the literal `true` (any case) enables a flag
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected 'true' or 'false', got '{}'", other)),
    }
}
