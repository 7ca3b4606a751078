//! Unified error types for the Courier core.
//!
//! [`DispatchError`] is the taxonomy surfaced to callers of the pipeline and
//! the broker. Router implementations report through [`RouterError`], which
//! distinguishes a declined envelope from a transport failure.

use std::time::Duration;

use thiserror::Error;

use crate::envelope::MessageId;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by a transport after it accepted an envelope.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Message send failed.
    #[error("failed to send envelope: {0}")]
    SendFailed(String),

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Transport not available.
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport that's not available.
        transport: &'static str,
    },

    /// The endpoint cannot join a transport without an instance id.
    #[error("cannot attach '{endpoint}' without an app instance id")]
    MissingInstanceId {
        /// The rejected endpoint.
        endpoint: String,
    },

    /// Another participant already uses this instance id.
    #[error("instance '{instance}' is already attached")]
    AlreadyAttached {
        /// The duplicated instance id.
        instance: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Router Errors
// =============================================================================

/// Result of a router's send attempt.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// The router does not handle this kind of envelope.
    #[error("router '{router}' does not support this envelope")]
    NotSupported {
        /// Name of the declining router.
        router: String,
    },

    /// The router handles the envelope but cannot reach a recipient.
    #[error("router '{router}' cannot address '{endpoint}'")]
    Addressing {
        /// Name of the router.
        router: String,
        /// The unreachable endpoint.
        endpoint: String,
    },

    /// The router accepted the envelope but the transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RouterError {
    /// Creates a not-supported error for the given router.
    pub fn not_supported(router: impl Into<String>) -> Self {
        Self::NotSupported {
            router: router.into(),
        }
    }

    /// Creates an addressing error.
    pub fn addressing(router: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::Addressing {
            router: router.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Returns `true` if router selection should move on to the next candidate.
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::NotSupported { .. } | Self::Addressing { .. })
    }
}

// =============================================================================
// Authentication Errors
// =============================================================================

/// Errors raised while resolving an identity from a bearer token.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The token is unknown or malformed.
    #[error("invalid bearer token")]
    InvalidToken,

    /// The token is no longer valid.
    #[error("bearer token expired")]
    Expired,

    /// Other authentication failure.
    #[error("{0}")]
    Other(String),
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Errors surfaced by local processing and by the broker.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No router accepted the envelope.
    #[error("no router accepted the envelope for: {}", .endpoints.join(", "))]
    Routing {
        /// The unresolved endpoints, rendered as routing urls.
        endpoints: Vec<String>,
    },

    /// No handler is registered for the message type.
    #[error("no handler registered for message '{message}'")]
    NoHandler {
        /// Name of the message type.
        message: &'static str,
    },

    /// A two-way call did not receive a reply before its deadline.
    #[error("call {id} timed out after {timeout:?}")]
    Timeout {
        /// Correlation id of the call.
        id: MessageId,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The caller cancelled the dispatch.
    #[error("dispatch cancelled")]
    Cancelled,

    /// A feature required by the message is not enabled.
    #[error("feature '{feature}' required by '{message}' is not enabled")]
    FeatureUnavailable {
        /// The disabled feature.
        feature: String,
        /// Name of the message type.
        message: &'static str,
    },

    /// Identity resolution failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The handler itself failed.
    #[error("handler fault: {0}")]
    Handler(String),

    /// A router accepted the envelope but the transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A call with the same correlation id is already in flight.
    #[error("a call with correlation id {0} is already in flight")]
    DuplicateCorrelation(MessageId),

    /// A reply was submitted as a two-way call. Replies are always one-way.
    #[error("envelope {id} answers {reply_to} and cannot await a reply")]
    ReplyNotAwaitable {
        /// Id of the rejected envelope.
        id: MessageId,
        /// The call it answers.
        reply_to: MessageId,
    },
}

impl DispatchError {
    /// Creates a handler fault from any displayable error.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::Handler(err.to_string())
    }

    /// Creates a routing error for the given endpoints.
    pub fn routing<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Routing {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` for [`DispatchError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` for [`DispatchError::Routing`].
    pub fn is_routing(&self) -> bool {
        matches!(self, Self::Routing { .. })
    }

    /// Returns `true` for [`DispatchError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for router send attempts.
pub type RouterResult<T> = Result<T, RouterError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_error_declines() {
        assert!(RouterError::not_supported("redis").is_declined());
        assert!(RouterError::addressing("pipe", "app://*/w1").is_declined());
        assert!(!RouterError::from(TransportError::SendFailed("closed".into())).is_declined());
    }

    #[test]
    fn test_routing_error_names_endpoints() {
        let err = DispatchError::routing(["app://*/a", "app://*/b"]);
        assert!(err.is_routing());
        assert_eq!(
            err.to_string(),
            "no router accepted the envelope for: app://*/a, app://*/b"
        );
    }

    #[test]
    fn test_auth_error_converts() {
        let err: DispatchError = AuthError::InvalidToken.into();
        assert!(matches!(err, DispatchError::Auth(AuthError::InvalidToken)));
    }
}
