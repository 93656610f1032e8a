//! Custom field validators used by the `validator` derives.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;

use validator::ValidationError;

use crate::NotificationConfig;

/// Validate socket address format
pub fn validate_socket_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>().map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("invalid_socket_address");
        err.message = Some(Cow::Owned(format!(
            "Invalid socket address '{}'. Expected format: IP:PORT (e.g., '0.0.0.0:80')",
            addr
        )));
        err
    })
}

/// Durations used as intervals or timeouts must be positive
pub fn validate_non_zero_duration(duration: &Duration) -> Result<(), ValidationError> {
    if duration.is_zero() {
        let mut err = ValidationError::new("zero_duration");
        err.message = Some(Cow::Borrowed("Duration must be greater than zero"));
        return Err(err);
    }
    Ok(())
}

/// SMTP host and credentials are mandatory once notifications are enabled
pub fn validate_notification(config: &NotificationConfig) -> Result<(), ValidationError> {
    if !config.enabled {
        return Ok(());
    }

    let mut missing = Vec::new();
    if config.smtp_host.is_none() {
        missing.push("SMTP_HOST");
    }
    if config.username.is_none() {
        missing.push("SMTP_USERNAME");
    }
    if config.password.is_none() {
        missing.push("SMTP_PASSWORD");
    }
    if config.from.is_empty() || config.to.is_empty() {
        missing.push("SMTP_FROM/SMTP_TO");
    }

    if missing.is_empty() {
        return Ok(());
    }

    let mut err = ValidationError::new("incomplete_smtp_configuration");
    err.message = Some(Cow::Owned(format!(
        "NOTIFY_EMAIL_ENABLED is true but {} not set",
        missing.join(", ")
    )));
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultcert_common::SecretString;

    #[test]
    fn test_validate_socket_addr() {
        assert!(validate_socket_addr("0.0.0.0:80").is_ok());
        assert!(validate_socket_addr("[::]:8080").is_ok());
        assert!(validate_socket_addr("localhost").is_err());
        assert!(validate_socket_addr(":80").is_err());
    }

    #[test]
    fn test_validate_non_zero_duration() {
        assert!(validate_non_zero_duration(&Duration::from_secs(1)).is_ok());
        assert!(validate_non_zero_duration(&Duration::ZERO).is_err());
    }

    #[test]
    fn test_disabled_notification_needs_nothing() {
        assert!(validate_notification(&NotificationConfig::disabled()).is_ok());
    }

    #[test]
    fn test_enabled_notification_requires_smtp() {
        let mut config = NotificationConfig::disabled();
        config.enabled = true;
        config.from = "ops@example.com".to_string();
        config.to = "ops@example.com".to_string();

        let err = validate_notification(&config).unwrap_err();
        let message = err.message.unwrap();
        assert!(message.contains("SMTP_HOST"));
        assert!(message.contains("SMTP_PASSWORD"));

        config.smtp_host = Some("smtp.example.com".to_string());
        config.username = Some("mailer".to_string());
        config.password = Some(SecretString::new("secret"));
        assert!(validate_notification(&config).is_ok());
    }
}
