//! Errors raised while composing the framework.
//!
//! Dispatch-time failures use [`DispatchError`](courier_core::DispatchError);
//! the errors here only occur when registrations are built or validated.

use thiserror::Error;

/// Composition-time errors.
#[derive(Debug, Clone, Error)]
pub enum FrameworkError {
    /// A router's receiver pattern is not a valid regular expression.
    #[error("invalid receiver pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two non-fallback routers cannot be told apart.
    #[error("routers '{first}' and '{second}' share pattern '{pattern}' at priority {priority}")]
    AmbiguousRouters {
        /// The router registered first.
        first: String,
        /// The router registered second.
        second: String,
        /// The shared pattern.
        pattern: String,
        /// The shared priority.
        priority: i32,
    },
}

/// Result type for composition.
pub type FrameworkResult<T> = Result<T, FrameworkError>;
