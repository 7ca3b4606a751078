//! Configuration for Courier applications.
//!
//! Settings are loaded by [`ConfigLoader`] from layered sources (defaults,
//! files, `COURIER_*` environment variables) into a [`CourierConfig`] and
//! checked by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AppConfig, AuthConfig, BrokerSettings, CourierConfig, FeaturesConfig, LogFormat, LogLevel,
    LogOutput, LogRotation, LoggingConfig, RoutingConfig, SpanEventConfig, TokenConfig,
};
pub use validation::validate_config;
