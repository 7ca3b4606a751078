//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use courier_core::TransportError;
use courier_framework::FrameworkError;

/// Errors that can occur while assembling or running a runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Router registrations are invalid or ambiguous.
    #[error(transparent)]
    Framework(#[from] FrameworkError),

    /// The in-process attachment failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The runtime was stopped and cannot be started again.
    #[error("Runtime has been stopped")]
    Stopped,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
