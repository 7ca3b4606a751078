//! # Courier Core
//!
//! The data model of the Courier message-dispatch framework.
//!
//! This crate has no behavior of its own. It defines the types every other
//! layer agrees on:
//!
//! - **Messages**: type-erased, immutable payloads ([`Message`], [`BoxedMessage`])
//! - **Addressing**: logical recipients ([`Endpoint`])
//! - **Envelopes**: routable wrappers with correlation ids ([`Envelope`], [`MessageId`], [`Payload`])
//! - **Dispatch context**: the per-call state threaded through the pipeline ([`DispatchContext`])
//! - **Errors**: the dispatch error taxonomy ([`DispatchError`], [`RouterError`])
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  wrap   ┌──────────┐  route   ┌──────────┐  deliver  ┌──────────┐
//! │ Message  │───────▶│ Envelope │────────▶│  Router  │─────────▶│  Broker  │
//! └──────────┘         └──────────┘          └──────────┘           └──────────┘
//!                                                                      │
//!                                              DispatchContext ◀───────┘
//!                                                    │
//!                                               Behaviors + Handler
//! ```

extern crate self as courier_core;

pub mod context;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod message;

pub use context::DispatchContext;
pub use endpoint::{BROADCAST_URL, Endpoint};
pub use envelope::{Envelope, MessageId, Payload};
pub use error::{
    AuthError, DispatchError, DispatchResult, RouterError, RouterResult, TransportError,
    TransportResult,
};
pub use identity::Identity;
pub use message::{AsAny, BoxedMessage, Message, MessageDescriptor, downcast_message};

/// Derive macro for [`Message`].
#[cfg(feature = "macros")]
pub use courier_macros::Message;

/// Re-exported so handlers can build responses without a direct dependency.
pub use serde_json::Value;

/// Prelude for common imports.
pub mod prelude {
    pub use super::context::DispatchContext;
    pub use super::endpoint::Endpoint;
    pub use super::envelope::{Envelope, MessageId, Payload};
    pub use super::error::{DispatchError, DispatchResult};
    pub use super::identity::Identity;
    pub use super::message::{BoxedMessage, Message};

    #[cfg(feature = "macros")]
    pub use courier_macros::Message;
}

#[cfg(all(test, feature = "macros"))]
mod derive_tests {
    use std::sync::Arc;

    use crate::{BoxedMessage, Message};

    #[derive(Debug, Message)]
    #[message(name = "billing.invoice", kinds("NonFree", "Billing"), requires("billing"))]
    struct CreateInvoice {
        #[allow(dead_code)]
        amount: u64,
    }

    #[derive(Debug, Message)]
    struct Ping;

    #[test]
    fn test_derive_with_attributes() {
        let msg: BoxedMessage = Arc::new(CreateInvoice { amount: 3 });
        assert_eq!(msg.message_name(), "billing.invoice");
        assert_eq!(msg.kinds(), &["NonFree", "Billing"]);
        assert_eq!(msg.required_features(), &["billing"]);
    }

    #[test]
    fn test_derive_defaults() {
        let msg: BoxedMessage = Arc::new(Ping);
        assert_eq!(msg.message_name(), "Ping");
        assert!(msg.kinds().is_empty());
        assert!(msg.required_features().is_empty());
    }
}
