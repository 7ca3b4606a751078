//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, AuthConfig, BrokerSettings, CourierConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_app_config(&config.app)?;
    validate_broker_settings(&config.broker)?;
    validate_features(&config.features.enabled)?;
    validate_auth_config(&config.auth)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Ids become segments of `app://{app}/{instance}` urls.
fn validate_app_config(app: &AppConfig) -> ConfigResult<()> {
    for (field, value) in [("app.app_id", &app.app_id), ("app.instance_id", &app.instance_id)] {
        let Some(value) = value else { continue };
        if value.is_empty() {
            return Err(ConfigError::missing_field(field));
        }
        if value == "*" || value.contains(['/', ' ']) {
            return Err(ConfigError::validation(format!(
                "{field} '{value}' cannot be '*' or contain '/' or spaces"
            )));
        }
    }
    Ok(())
}

fn validate_broker_settings(broker: &BrokerSettings) -> ConfigResult<()> {
    for (field, value) in [
        ("broker.default_timeout_ms", broker.default_timeout_ms),
        ("broker.sweep_interval_ms", broker.sweep_interval_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::ZeroDuration {
                field: field.to_owned(),
            });
        }
    }

    if broker.inbox_capacity == 0 {
        return Err(ConfigError::validation(
            "broker.inbox_capacity must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_features(enabled: &[String]) -> ConfigResult<()> {
    if enabled.iter().any(|feature| feature.trim().is_empty()) {
        return Err(ConfigError::validation("Feature names cannot be empty"));
    }
    Ok(())
}

fn validate_auth_config(auth: &AuthConfig) -> ConfigResult<()> {
    for (token, entry) in &auth.tokens {
        if token.is_empty() {
            return Err(ConfigError::validation("Auth tokens cannot be empty"));
        }
        if entry.subject.is_empty() {
            return Err(ConfigError::missing_field(format!(
                "auth.tokens.{token}.subject"
            )));
        }
    }

    if auth.enabled && auth.tokens.is_empty() {
        return Err(ConfigError::validation(
            "Authentication is enabled but no tokens are configured",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|target| target.is_empty()) {
        return Err(ConfigError::validation("Log filter targets cannot be empty"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TokenConfig;

    #[test]
    fn test_validate_default_config() {
        let config = CourierConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_instance_id_with_slash() {
        let mut config = CourierConfig::default();
        config.app.instance_id = Some("a/b".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = CourierConfig::default();
        config.broker.default_timeout_ms = 0;
        match validate_config(&config) {
            Err(ConfigError::ZeroDuration { field }) => {
                assert_eq!(field, "broker.default_timeout_ms");
            }
            other => panic!("expected zero duration error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_auth_without_tokens() {
        let mut config = CourierConfig::default();
        config.auth.enabled = true;
        assert!(validate_config(&config).is_err());

        config.auth.tokens.insert(
            "secret".to_string(),
            TokenConfig {
                subject: "alice".to_string(),
                roles: Vec::new(),
            },
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}
