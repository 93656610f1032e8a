//! Configuration for the vaultcert certificate renewer.
//!
//! Configuration comes from the process environment only. It is read once
//! at startup by [`Config::from_env`], validated, and then shared read-only
//! for the lifetime of the process. Any problem is a [`ConfigError`] and
//! keeps the service from entering its running state.
//!
//! # Example
//!
//! ```ignore
//! DOMAINS=example.com,www.example.com
//! EMAIL=ops@example.com
//! AZURE_KEYVAULT_NAME=prod-vault
//! AZURE_CERT_NAME=example-com
//! CHECK_INTERVAL=12h
//! RENEW_BEFORE_DAYS=30
//! ```

use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use vaultcert_common::{CertificateName, DomainSet, LogFormat, SecretString};

mod env;
mod error;
pub mod validation;

pub use error::ConfigError;

// ============================================================================
// Defaults
// ============================================================================

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_RENEW_BEFORE_DAYS: u32 = 30;
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:80";
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_IDENTITY_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

// ============================================================================
// Top-level Configuration
// ============================================================================

/// Complete, validated service configuration
#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Hostnames covered by the certificate, primary first
    pub domains: DomainSet,

    /// ACME contact identity
    #[validate(email(message = "EMAIL must be a valid e-mail address"))]
    pub email: String,

    /// Password protecting the uploaded bundle (may be empty)
    pub bundle_password: SecretString,

    #[validate(nested)]
    pub renewal: RenewalConfig,

    #[validate(nested)]
    pub acme: AcmeConfig,

    #[validate(nested)]
    pub vault: VaultConfig,

    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub notification: NotificationConfig,

    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load and validate configuration from an explicit set of variables
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let raw: env::RawEnv = envy::from_iter(vars)?;
        let config = raw.into_config()?;
        config.validate()?;

        tracing::debug!(
            domains = %config.domains,
            certificate = %config.vault.cert_name,
            check_interval_secs = config.renewal.check_interval.as_secs(),
            renew_before_days = config.renewal.renew_before_days,
            notifications = config.notification.enabled,
            "Loaded configuration"
        );

        Ok(config)
    }
}

// ============================================================================
// Renewal Policy
// ============================================================================

/// Renewal policy parameters
#[derive(Debug, Clone, Validate)]
pub struct RenewalConfig {
    /// Time between renewal checks
    #[validate(custom(function = "crate::validation::validate_non_zero_duration"))]
    pub check_interval: Duration,

    /// Renew this many days before the stored certificate expires; 0 renews
    /// only once it has expired
    #[validate(range(max = 365, message = "RENEW_BEFORE_DAYS must be between 0 and 365"))]
    pub renew_before_days: u32,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            renew_before_days: DEFAULT_RENEW_BEFORE_DAYS,
        }
    }
}

// ============================================================================
// ACME
// ============================================================================

/// ACME directory settings
#[derive(Debug, Clone, Validate)]
pub struct AcmeConfig {
    /// Directory URL of the certificate authority
    #[validate(url(message = "ACME_DIRECTORY_URL must be a valid URL"))]
    pub directory_url: String,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            directory_url: LETSENCRYPT_PRODUCTION.to_string(),
        }
    }
}

// ============================================================================
// Secret Store
// ============================================================================

/// Azure Key Vault target
#[derive(Debug, Clone, Validate)]
pub struct VaultConfig {
    /// Vault name (`<name>.vault.azure.net`)
    #[validate(length(min = 1, message = "AZURE_KEYVAULT_NAME must not be empty"))]
    pub name: String,

    /// Certificate object name inside the vault
    pub cert_name: CertificateName,

    /// Base URL of the vault REST API
    #[validate(url(message = "AZURE_KEYVAULT_ENDPOINT must be a valid URL"))]
    pub endpoint: String,

    /// How bearer tokens are obtained
    pub credential: CredentialConfig,
}

/// Source of access tokens for the vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialConfig {
    /// Service principal client-credentials flow
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: SecretString,
        authority_host: String,
    },
    /// Federated token exchange; the assertion file is re-read on every fetch
    WorkloadIdentity {
        tenant_id: String,
        client_id: String,
        token_file: PathBuf,
        authority_host: String,
    },
    /// App Service / Container Apps identity endpoint (`IDENTITY_HEADER` set)
    AppServiceIdentity {
        endpoint: String,
        identity_header: SecretString,
        client_id: Option<String>,
    },
    /// Instance metadata (IMDS) managed identity endpoint
    ManagedIdentity {
        endpoint: String,
        client_id: Option<String>,
    },
}

impl CredentialConfig {
    /// Short human-readable name of the credential source
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialConfig::ClientSecret { .. } => "client secret",
            CredentialConfig::WorkloadIdentity { .. } => "workload identity",
            CredentialConfig::AppServiceIdentity { .. } => "app service managed identity",
            CredentialConfig::ManagedIdentity { .. } => "managed identity",
        }
    }
}

// ============================================================================
// HTTP Responder
// ============================================================================

/// Challenge responder settings
#[derive(Debug, Clone, Validate)]
pub struct ServerConfig {
    /// Socket address the HTTP responder binds to
    #[validate(custom(function = "crate::validation::validate_socket_addr"))]
    pub listen_addr: String,

    /// Grace period for in-flight requests on shutdown
    #[validate(custom(function = "crate::validation::validate_non_zero_duration"))]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// E-mail notification settings.
///
/// Host and credentials are only required when `enabled` is set.
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "crate::validation::validate_notification"))]
pub struct NotificationConfig {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
    pub to: String,
}

impl NotificationConfig {
    /// Notification settings with delivery turned off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: DEFAULT_SMTP_PORT,
            username: None,
            password: None,
            from: String::new(),
            to: String::new(),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Logging settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn minimal() -> Vec<(String, String)> {
        vars(&[
            ("DOMAINS", "example.com,www.example.com"),
            ("EMAIL", "ops@example.com"),
            ("AZURE_KEYVAULT_NAME", "prod-vault"),
            ("AZURE_CERT_NAME", "example-com"),
        ])
    }

    fn with(mut base: Vec<(String, String)>, key: &str, value: &str) -> Vec<(String, String)> {
        base.retain(|(k, _)| k != key);
        base.push((key.to_string(), value.to_string()));
        base
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_vars(minimal()).unwrap();

        assert_eq!(config.domains.as_slice(), &["example.com", "www.example.com"]);
        assert_eq!(config.email, "ops@example.com");
        assert_eq!(config.vault.name, "prod-vault");
        assert_eq!(config.vault.cert_name.as_str(), "example-com");
        assert_eq!(config.vault.endpoint, "https://prod-vault.vault.azure.net");
        assert_eq!(config.bundle_password.expose(), "");
        assert_eq!(config.renewal.check_interval, DEFAULT_CHECK_INTERVAL);
        assert_eq!(config.renewal.renew_before_days, 30);
        assert_eq!(config.acme.directory_url, LETSENCRYPT_PRODUCTION);
        assert_eq!(config.server.listen_addr, "0.0.0.0:80");
        assert_eq!(config.server.shutdown_grace, Duration::from_secs(5));
        assert!(!config.notification.enabled);
        assert_eq!(config.notification.from, "ops@example.com");
        assert_eq!(config.notification.smtp_port, 587);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(matches!(
            config.vault.credential,
            CredentialConfig::ManagedIdentity { ref endpoint, client_id: None }
                if endpoint == DEFAULT_IDENTITY_ENDPOINT
        ));
    }

    #[test]
    fn test_each_required_variable_is_enforced() {
        for var in ["DOMAINS", "EMAIL", "AZURE_KEYVAULT_NAME", "AZURE_CERT_NAME"] {
            let mut env = minimal();
            env.retain(|(k, _)| k != var);

            match Config::from_vars(env) {
                Err(ConfigError::Missing { var: missing }) => assert_eq!(missing, var),
                other => panic!("expected missing {}, got {:?}", var, other),
            }
        }
    }

    #[test]
    fn test_blank_required_variable_counts_as_missing() {
        let env = with(minimal(), "EMAIL", "   ");
        assert!(matches!(
            Config::from_vars(env),
            Err(ConfigError::Missing { var: "EMAIL" })
        ));
    }

    #[test]
    fn test_empty_domain_list_is_rejected() {
        let env = with(minimal(), "DOMAINS", " , ");
        assert!(matches!(Config::from_vars(env), Err(ConfigError::Domains(_))));
    }

    #[test]
    fn test_check_interval_parsing() {
        let config = Config::from_vars(with(minimal(), "CHECK_INTERVAL", "1h30m")).unwrap();
        assert_eq!(config.renewal.check_interval, Duration::from_secs(5400));

        let err = Config::from_vars(with(minimal(), "CHECK_INTERVAL", "soon")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "CHECK_INTERVAL", .. }));

        let err = Config::from_vars(with(minimal(), "CHECK_INTERVAL", "0s")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_renew_before_days_bounds() {
        let config = Config::from_vars(with(minimal(), "RENEW_BEFORE_DAYS", "14")).unwrap();
        assert_eq!(config.renewal.renew_before_days, 14);

        let config = Config::from_vars(with(minimal(), "RENEW_BEFORE_DAYS", "0")).unwrap();
        assert_eq!(config.renewal.renew_before_days, 0);

        assert!(matches!(
            Config::from_vars(with(minimal(), "RENEW_BEFORE_DAYS", "366")),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            Config::from_vars(with(minimal(), "RENEW_BEFORE_DAYS", "-3")),
            Err(ConfigError::InvalidValue { var: "RENEW_BEFORE_DAYS", .. })
        ));
    }

    #[test]
    fn test_invalid_email_is_rejected() {
        let err = Config::from_vars(with(minimal(), "EMAIL", "not-an-email")).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_listen_addr_is_rejected() {
        let err = Config::from_vars(with(minimal(), "LISTEN_ADDR", "port-eighty")).unwrap_err();
        assert!(err.to_string().contains("Invalid socket address"));
    }

    #[test]
    fn test_bundle_password_is_kept_verbatim() {
        let config = Config::from_vars(with(minimal(), "PFX_PASSWORD", " p@ss ")).unwrap();
        assert_eq!(config.bundle_password.expose(), " p@ss ");
        assert_eq!(format!("{:?}", config.bundle_password), "***");
    }

    #[test]
    fn test_client_secret_credential_requires_all_three() {
        let env = with(minimal(), "AZURE_TENANT_ID", "tenant");
        let env = with(env, "AZURE_CLIENT_ID", "client");
        let config = Config::from_vars(env.clone()).unwrap();
        assert!(matches!(
            config.vault.credential,
            CredentialConfig::ManagedIdentity { client_id: Some(ref id), .. } if id == "client"
        ));

        let config = Config::from_vars(with(env, "AZURE_CLIENT_SECRET", "s3cret")).unwrap();
        match config.vault.credential {
            CredentialConfig::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
                authority_host,
            } => {
                assert_eq!(tenant_id, "tenant");
                assert_eq!(client_id, "client");
                assert_eq!(client_secret.expose(), "s3cret");
                assert_eq!(authority_host, DEFAULT_AUTHORITY_HOST);
            }
            other => panic!("unexpected credential {:?}", other),
        }
    }

    #[test]
    fn test_app_service_identity_needs_endpoint_and_header() {
        let env = with(minimal(), "IDENTITY_ENDPOINT", "http://localhost:42356/msi/token");
        let config = Config::from_vars(env.clone()).unwrap();
        assert!(matches!(
            config.vault.credential,
            CredentialConfig::ManagedIdentity { ref endpoint, .. }
                if endpoint == "http://localhost:42356/msi/token"
        ));

        let config = Config::from_vars(with(env, "IDENTITY_HEADER", "header-secret")).unwrap();
        match config.vault.credential {
            CredentialConfig::AppServiceIdentity {
                endpoint,
                identity_header,
                client_id,
            } => {
                assert_eq!(endpoint, "http://localhost:42356/msi/token");
                assert_eq!(identity_header.expose(), "header-secret");
                assert_eq!(client_id, None);
            }
            other => panic!("unexpected credential {:?}", other),
        }
    }

    #[test]
    fn test_workload_identity_from_federated_token_file() {
        let env = with(minimal(), "AZURE_TENANT_ID", "tenant");
        let env = with(env, "AZURE_CLIENT_ID", "client");
        let env = with(env, "AZURE_FEDERATED_TOKEN_FILE", "/var/run/secrets/azure/tokens/token");
        let config = Config::from_vars(env.clone()).unwrap();
        assert!(matches!(
            config.vault.credential,
            CredentialConfig::WorkloadIdentity { ref token_file, .. }
                if token_file == &PathBuf::from("/var/run/secrets/azure/tokens/token")
        ));
        assert_eq!(config.vault.credential.kind(), "workload identity");

        // A client secret takes precedence
        let config = Config::from_vars(with(env, "AZURE_CLIENT_SECRET", "s3cret")).unwrap();
        assert_eq!(config.vault.credential.kind(), "client secret");
    }

    #[test]
    fn test_enabled_notifications_require_smtp_settings() {
        let env = with(minimal(), "NOTIFY_EMAIL_ENABLED", "true");
        let err = Config::from_vars(env.clone()).unwrap_err();
        assert!(err.to_string().contains("SMTP_HOST"));

        let env = with(env, "SMTP_HOST", "smtp.example.com");
        let env = with(env, "SMTP_USERNAME", "mailer");
        let env = with(env, "SMTP_PASSWORD", "secret");
        let env = with(env, "SMTP_TO", "alerts@example.com");
        let config = Config::from_vars(env).unwrap();
        assert!(config.notification.enabled);
        assert_eq!(config.notification.to, "alerts@example.com");
        assert_eq!(config.notification.from, "ops@example.com");
    }

    #[test]
    fn test_notification_flag_must_be_boolean() {
        let err = Config::from_vars(with(minimal(), "NOTIFY_EMAIL_ENABLED", "yes")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "NOTIFY_EMAIL_ENABLED", .. }));
    }

    #[test]
    fn test_endpoint_override() {
        let config = Config::from_vars(with(
            minimal(),
            "AZURE_KEYVAULT_ENDPOINT",
            "http://127.0.0.1:8200",
        ))
        .unwrap();
        assert_eq!(config.vault.endpoint, "http://127.0.0.1:8200");
    }
}
