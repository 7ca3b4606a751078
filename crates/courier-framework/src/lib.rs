//! # Courier Framework
//!
//! Message handling and distribution for Courier applications.
//!
//! This layer provides:
//! - The behavior pipeline ([`MessageProcessor`]) with priority-ordered
//!   interceptors and short-circuit semantics
//! - Typed handlers and handler resolution ([`Handler`], [`HandlerRegistry`])
//! - Built-in authentication and required-feature behaviors
//! - Router selection with regex addressing, priority and fallback
//!   ([`RouterTable`])
//! - The [`Broker`], which sends envelopes and correlates replies
//!
//! Transports plug in by implementing [`MessageRouter`] for outbound traffic
//! and feeding inbound envelopes to [`Broker::receive`].

pub mod behavior;
pub mod broker;
pub mod error;
pub mod handler;
pub mod processor;
pub mod routing;

pub use behavior::{
    AppliesTo, AuthenticationBehavior, AuthenticationService, Behavior, BehaviorRegistration,
    FeatureRegistry, Flow, Priority, RequiredFeatureBehavior, StaticFeatureRegistry,
    StaticTokenAuthenticator,
};
pub use broker::{Broker, BrokerBuilder, BrokerConfig, BrokerStats};
pub use error::{FrameworkError, FrameworkResult};
pub use handler::{
    BoxedHandler, Handler, HandlerFn, HandlerRegistry, HandlerResolver, MessageHandler,
    handler_fn, into_message_handler,
};
pub use processor::{MessageProcessor, ProcessorService};
pub use routing::{BoxedRouter, MessageRouter, RouterRegistration, RouterTable};
