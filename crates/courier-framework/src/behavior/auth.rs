//! Authentication enrichment.
//!
//! [`AuthenticationBehavior`] turns the bearer token carried by a dispatch
//! context into an [`Identity`] before any other behavior runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Behavior, BehaviorRegistration, Flow, Priority};
use courier_core::{AuthError, DispatchContext, Identity};

/// Resolves bearer tokens into identities.
#[async_trait]
pub trait AuthenticationService: Send + Sync + 'static {
    /// Returns the identity the token stands for.
    async fn resolve_identity(&self, token: &str) -> Result<Identity, AuthError>;
}

// ============================================================================
// AuthenticationBehavior
// ============================================================================

/// Sets the context identity from its bearer token.
///
/// Contexts without a token, or that already carry an identity, pass
/// through untouched. A token the service rejects faults the call.
pub struct AuthenticationBehavior {
    service: Arc<dyn AuthenticationService>,
}

impl AuthenticationBehavior {
    /// Creates the behavior.
    pub fn new(service: Arc<dyn AuthenticationService>) -> Self {
        Self { service }
    }

    /// Returns the registration for every message at [`Priority::HIGHEST`].
    pub fn registration(self) -> BehaviorRegistration {
        BehaviorRegistration::new(self).with_priority(Priority::HIGHEST)
    }
}

#[async_trait]
impl Behavior for AuthenticationBehavior {
    fn name(&self) -> &str {
        "authentication"
    }

    async fn before(&self, ctx: &mut DispatchContext) -> Flow {
        if ctx.identity().is_some() {
            return Flow::Proceed;
        }
        let Some(token) = ctx.bearer_token().map(str::to_owned) else {
            return Flow::Proceed;
        };

        match self.service.resolve_identity(&token).await {
            Ok(identity) => {
                debug!(subject = %identity.subject, "Resolved caller identity");
                ctx.set_identity(identity);
                Flow::Proceed
            }
            Err(err) => {
                warn!(
                    message = ctx.message().message_name(),
                    error = %err,
                    "Rejecting call with unresolvable bearer token"
                );
                Flow::Fault(err.into())
            }
        }
    }
}

// ============================================================================
// StaticTokenAuthenticator
// ============================================================================

/// An [`AuthenticationService`] backed by a fixed token table.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator that knows no tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `token` to `identity` (builder pattern).
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Builds an authenticator from `(token, subject)` pairs.
    pub fn from_subjects<I, T, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        Self {
            tokens: pairs
                .into_iter()
                .map(|(token, subject)| (token.into(), Identity::new(subject)))
                .collect(),
        }
    }

    /// Returns the number of known tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no token is known.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl AuthenticationService for StaticTokenAuthenticator {
    async fn resolve_identity(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{DispatchError, Message};

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {}

    fn behavior() -> AuthenticationBehavior {
        let service = StaticTokenAuthenticator::new()
            .with_token("secret", Identity::new("alice").with_role("admin"));
        AuthenticationBehavior::new(Arc::new(service))
    }

    #[tokio::test]
    async fn test_sets_identity_from_token() {
        let mut ctx = DispatchContext::new(Arc::new(Ping)).with_bearer_token("secret");

        assert!(matches!(behavior().before(&mut ctx).await, Flow::Proceed));
        let identity = ctx.identity().unwrap();
        assert_eq!(identity.subject, "alice");
        assert!(identity.has_role("admin"));
    }

    #[tokio::test]
    async fn test_without_token_passes_through() {
        let mut ctx = DispatchContext::new(Arc::new(Ping));

        assert!(matches!(behavior().before(&mut ctx).await, Flow::Proceed));
        assert!(ctx.identity().is_none());
    }

    #[tokio::test]
    async fn test_existing_identity_is_kept() {
        let mut ctx = DispatchContext::new(Arc::new(Ping))
            .with_bearer_token("unknown")
            .with_identity(Identity::new("bob"));

        assert!(matches!(behavior().before(&mut ctx).await, Flow::Proceed));
        assert_eq!(ctx.identity().unwrap().subject, "bob");
    }

    #[tokio::test]
    async fn test_unknown_token_faults() {
        let mut ctx = DispatchContext::new(Arc::new(Ping)).with_bearer_token("unknown");

        let flow = behavior().before(&mut ctx).await;
        assert!(matches!(
            flow,
            Flow::Fault(DispatchError::Auth(AuthError::InvalidToken))
        ));
        assert!(ctx.identity().is_none());
    }

    #[test]
    fn test_registration_priority() {
        let registration = behavior().registration();
        assert_eq!(registration.priority, Priority::HIGHEST);
        assert_eq!(registration.name(), "authentication");
    }
}
