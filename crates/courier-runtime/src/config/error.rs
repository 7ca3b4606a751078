//! Errors raised while loading or validating a `CourierConfig`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {0} does not exist")]
    FileNotFound(PathBuf),

    /// The sources could not be merged or extracted into the schema.
    #[error("config could not be read: {0}")]
    ParseError(String),

    #[error("config rejected: {message}")]
    ValidationError { message: String },

    /// A value the runtime needs for the requested setup is absent.
    #[error("config value '{field}' is required")]
    MissingField { field: String },

    #[error("'{field}' must be greater than 0")]
    ZeroDuration { field: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Names a dotted config path, e.g. `app.instance_id`.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
