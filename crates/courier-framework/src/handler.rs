//! Message handlers and handler resolution.
//!
//! A handler processes exactly one message type. Handlers are written
//! against the concrete type through [`Handler<M>`] (or [`handler_fn`] for
//! closures) and stored type-erased as [`MessageHandler`] in a
//! [`HandlerResolver`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mut handlers = HandlerRegistry::new();
//! handlers.register::<Ping, _>(handler_fn(|ping: Arc<Ping>| async move {
//!     Ok(json!({ "pong": ping.seq }))
//! }));
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use courier_core::{DispatchContext, DispatchError, DispatchResult, Message, downcast_message};

// ============================================================================
// Handler - typed
// ============================================================================

/// Handles one concrete message type.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync + 'static {
    /// Processes the message and produces the call result.
    async fn handle(&self, message: Arc<M>, ctx: &DispatchContext) -> DispatchResult<Value>;
}

/// A handler built from an async closure over the message.
pub struct HandlerFn<F> {
    f: F,
}

/// Wraps an async closure into a [`Handler`].
///
/// The closure receives the message only; implement [`Handler`] directly
/// when the dispatch context is needed.
pub fn handler_fn<M, F, Fut>(f: F) -> HandlerFn<F>
where
    M: Message,
    F: Fn(Arc<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Value>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<M, F, Fut> Handler<M> for HandlerFn<F>
where
    M: Message,
    F: Fn(Arc<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DispatchResult<Value>> + Send + 'static,
{
    async fn handle(&self, message: Arc<M>, _ctx: &DispatchContext) -> DispatchResult<Value> {
        (self.f)(message).await
    }
}

// ============================================================================
// MessageHandler - type-erased
// ============================================================================

/// A handler stored without its message type.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Name of the message type this handler accepts.
    fn message_name(&self) -> &'static str;

    /// Processes the message carried by `ctx`.
    async fn handle_erased(&self, ctx: &DispatchContext) -> DispatchResult<Value>;
}

/// A boxed, shareable handler.
pub type BoxedHandler = Arc<dyn MessageHandler>;

struct TypedHandler<M, H> {
    handler: H,
    _marker: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M, H> MessageHandler for TypedHandler<M, H>
where
    M: Message,
    H: Handler<M>,
{
    fn message_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    async fn handle_erased(&self, ctx: &DispatchContext) -> DispatchResult<Value> {
        let Some(message) = downcast_message::<M>(ctx.message().clone()) else {
            return Err(DispatchError::handler(format!(
                "handler for '{}' received '{}'",
                self.message_name(),
                ctx.message().message_name()
            )));
        };
        self.handler.handle(message, ctx).await
    }
}

/// Erases a typed handler.
pub fn into_message_handler<M, H>(handler: H) -> BoxedHandler
where
    M: Message,
    H: Handler<M>,
{
    Arc::new(TypedHandler {
        handler,
        _marker: PhantomData,
    })
}

// ============================================================================
// HandlerResolver
// ============================================================================

/// Maps a message type to zero or one handler.
pub trait HandlerResolver: Send + Sync + 'static {
    /// Returns the handler for the given message type, if any.
    fn resolve(&self, message_type: TypeId) -> Option<BoxedHandler>;
}

/// A map-backed [`HandlerResolver`].
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TypeId, BoxedHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for message type `M`, replacing any previous one.
    pub fn register<M, H>(&mut self, handler: H) -> &mut Self
    where
        M: Message,
        H: Handler<M>,
    {
        let erased = into_message_handler::<M, H>(handler);
        if self.handlers.insert(TypeId::of::<M>(), erased).is_some() {
            warn!(
                message = std::any::type_name::<M>(),
                "Replacing previously registered handler"
            );
        }
        self
    }

    /// Registers a handler (builder pattern).
    pub fn with<M, H>(mut self, handler: H) -> Self
    where
        M: Message,
        H: Handler<M>,
    {
        self.register::<M, H>(handler);
        self
    }

    /// Returns `true` if a handler for `M` is registered.
    pub fn contains<M: Message>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<M>())
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, message_type: TypeId) -> Option<BoxedHandler> {
        self.handlers.get(&message_type).cloned()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping {
        seq: u64,
    }

    impl Message for Ping {}

    #[derive(Debug)]
    struct Other;

    impl Message for Other {}

    #[tokio::test]
    async fn test_registry_resolves_by_type() {
        let increment = handler_fn(|ping: Arc<Ping>| async move { Ok(Value::from(ping.seq + 1)) });
        let registry = HandlerRegistry::new().with::<Ping, _>(increment);

        assert!(registry.contains::<Ping>());
        assert!(registry.resolve(TypeId::of::<Other>()).is_none());

        let handler = registry.resolve(TypeId::of::<Ping>()).unwrap();
        let ctx = DispatchContext::new(Arc::new(Ping { seq: 41 }));
        assert_eq!(handler.handle_erased(&ctx).await.unwrap(), Value::from(42));
    }

    #[tokio::test]
    async fn test_erased_handler_rejects_wrong_type() {
        let handler =
            into_message_handler::<Ping, _>(handler_fn(|_: Arc<Ping>| async { Ok(Value::Null) }));
        let ctx = DispatchContext::new(Arc::new(Other));

        let err = handler.handle_erased(&ctx).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
    }

    struct ContextAware;

    #[async_trait]
    impl Handler<Ping> for ContextAware {
        async fn handle(
            &self,
            _message: Arc<Ping>,
            ctx: &DispatchContext,
        ) -> DispatchResult<Value> {
            Ok(Value::from(ctx.bearer_token().unwrap_or("anonymous")))
        }
    }

    #[tokio::test]
    async fn test_handler_sees_context() {
        let registry = HandlerRegistry::new().with::<Ping, _>(ContextAware);
        let handler = registry.resolve(TypeId::of::<Ping>()).unwrap();
        let ctx = DispatchContext::new(Arc::new(Ping { seq: 0 })).with_bearer_token("alice");

        assert_eq!(handler.handle_erased(&ctx).await.unwrap(), Value::from("alice"));
    }
}
