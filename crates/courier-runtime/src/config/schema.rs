//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use courier_core::{Endpoint, Identity};
use courier_framework::BrokerConfig;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    /// Identity of this application instance.
    #[serde(default)]
    pub app: AppConfig,

    /// Correlation and timeout settings.
    #[serde(default)]
    pub broker: BrokerSettings,

    /// Router table settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Feature flags consulted by the required-feature behavior.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Bearer-token authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// App
// =============================================================================

/// Identity of this application instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Application id shared by every instance of the app.
    #[serde(default)]
    pub app_id: Option<String>,

    /// Id of this particular instance.
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl AppConfig {
    /// Returns the endpoint this instance is reachable at, if it has an id.
    pub fn endpoint(&self) -> Option<Endpoint> {
        let mut endpoint = Endpoint::default();
        endpoint.app_id.clone_from(&self.app_id);
        endpoint.app_instance_id.clone_from(&self.instance_id);
        (!endpoint.is_empty()).then_some(endpoint)
    }
}

// =============================================================================
// Broker
// =============================================================================

/// Broker settings as they appear in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Reply timeout for envelopes that do not set one, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Grace period past a call's deadline before it is swept, in milliseconds.
    #[serde(default = "default_reply_grace_ms")]
    pub reply_grace_ms: u64,

    /// How often the sweeper runs, in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Capacity of the in-process inbox.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            reply_grace_ms: default_reply_grace_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

impl BrokerSettings {
    /// Returns the sweeper period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Converts to the framework's broker config.
    pub fn to_broker_config(&self, endpoint: Option<Endpoint>) -> BrokerConfig {
        let config = BrokerConfig::default()
            .with_default_timeout(Duration::from_millis(self.default_timeout_ms))
            .with_reply_grace(Duration::from_millis(self.reply_grace_ms));
        match endpoint {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        }
    }
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_reply_grace_ms() -> u64 {
    5000
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_inbox_capacity() -> usize {
    courier_transport::DEFAULT_INBOX_CAPACITY
}

// =============================================================================
// Routing, features, auth
// =============================================================================

/// Router table settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    /// Reject ambiguous routers at startup instead of warning.
    #[serde(default)]
    pub strict: bool,
}

/// Enabled feature names.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// Bearer-token authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Install the authentication behavior.
    #[serde(default)]
    pub enabled: bool,

    /// Known tokens and the identities they resolve to.
    #[serde(default)]
    pub tokens: HashMap<String, TokenConfig>,
}

/// The identity behind one token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub subject: String,

    #[serde(default)]
    pub roles: Vec<String>,
}

impl TokenConfig {
    /// Builds the identity this token resolves to.
    pub fn to_identity(&self) -> Identity {
        self.roles
            .iter()
            .fold(Identity::new(self.subject.clone()), |identity, role| {
                identity.with_role(role.clone())
            })
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON. Needs the `json-log` feature, otherwise
    /// falls back to [`LogFormat::Full`].
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level applied to every target.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in each line.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in each line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-target levels, e.g. `courier_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::Never,
            filters: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_endpoint() {
        assert!(AppConfig::default().endpoint().is_none());

        let app = AppConfig {
            app_id: Some("billing".into()),
            instance_id: Some("b1".into()),
        };
        let endpoint = app.endpoint().unwrap();
        assert_eq!(endpoint.app_id.as_deref(), Some("billing"));
        assert_eq!(endpoint.app_instance_id.as_deref(), Some("b1"));
    }

    #[test]
    fn test_broker_settings_conversion() {
        let settings = BrokerSettings {
            default_timeout_ms: 250,
            reply_grace_ms: 10,
            ..Default::default()
        };
        let config = settings.to_broker_config(Some(Endpoint::instance("w1")));

        assert_eq!(config.default_timeout, Duration::from_millis(250));
        assert_eq!(config.reply_grace, Duration::from_millis(10));
        assert!(config.endpoint.is_some());
    }

    #[test]
    fn test_token_identity_carries_roles() {
        let token = TokenConfig {
            subject: "alice".into(),
            roles: vec!["admin".into()],
        };
        let identity = token.to_identity();
        assert_eq!(identity.subject, "alice");
        assert!(identity.has_role("admin"));
    }
}
