//! Message abstraction for the Courier framework.
//!
//! A [`Message`] is an opaque, immutable payload. It carries no addressing
//! information itself; addressing lives on the [`Envelope`](crate::Envelope)
//! that wraps it for distribution.
//!
//! Every message type exposes static metadata:
//!
//! - [`message_name`](Message::message_name) – a stable, human-readable name
//! - [`kinds`](Message::kinds) – ancestor/interface tags used for hierarchy
//!   matching of behaviors (the Rust stand-in for base classes)
//! - [`required_features`](Message::required_features) – application features
//!   that must be enabled for the message to be handled
//!
//! # Derive Macro
//!
//! ```rust,ignore
//! use courier_core::Message;
//!
//! #[derive(Debug, Message)]
//! #[message(name = "billing.invoice", kinds("NonFree"), requires("billing"))]
//! pub struct CreateInvoice {
//!     pub amount: u64,
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// AsAny - object-safe downcasting support
// ============================================================================

/// Object-safe access to `Any` for message trait objects.
///
/// Implemented automatically for every sized [`Message`]; never implement it
/// by hand.
pub trait AsAny: Any + Send + Sync {
    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Converts an `Arc<Self>` into an `Arc<dyn Any>` for owned downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Message> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Message trait
// ============================================================================

/// The base trait for all messages handled by Courier.
///
/// Messages are shared as `Arc<dyn Message>` once submitted and are never
/// mutated afterwards.
pub trait Message: AsAny + fmt::Debug {
    /// Returns the human-readable name of this message type.
    ///
    /// Defaults to the Rust type name.
    fn message_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Ancestor and interface tags of this message type.
    ///
    /// Behaviors registered with hierarchy matching apply to a message when
    /// their declared tag appears here.
    fn kinds(&self) -> &'static [&'static str] {
        &[]
    }

    /// Names of the application features this message type requires.
    fn required_features(&self) -> &'static [&'static str] {
        &[]
    }
}

/// A shared, type-erased message.
pub type BoxedMessage = Arc<dyn Message>;

/// Static metadata of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDescriptor {
    /// Human-readable name.
    pub name: &'static str,
    /// Ancestor and interface tags.
    pub kinds: &'static [&'static str],
    /// Features that must be enabled.
    pub required_features: &'static [&'static str],
}

impl MessageDescriptor {
    /// Returns `true` if the descriptor declares the given kind tag.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.contains(&kind)
    }
}

impl dyn Message {
    /// Returns the `TypeId` of the concrete message type.
    pub fn message_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    /// Returns `true` if the concrete message type is `T`.
    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Returns a reference to the concrete message if it is of type `T`.
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if this message declares the given kind tag.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds().contains(&kind)
    }

    /// Collects the static metadata of this message.
    pub fn descriptor(&self) -> MessageDescriptor {
        MessageDescriptor {
            name: self.message_name(),
            kinds: self.kinds(),
            required_features: self.required_features(),
        }
    }
}

/// Downcasts a shared message into its concrete type.
///
/// Returns `None` (dropping the clone) if the message is not a `T`.
pub fn downcast_message<T: Message>(message: BoxedMessage) -> Option<Arc<T>> {
    message.into_any().downcast::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {}

    #[derive(Debug)]
    struct Invoice {
        amount: u64,
    }

    impl Message for Invoice {
        fn message_name(&self) -> &'static str {
            "billing.invoice"
        }

        fn kinds(&self) -> &'static [&'static str] {
            &["NonFree"]
        }

        fn required_features(&self) -> &'static [&'static str] {
            &["billing"]
        }
    }

    #[test]
    fn test_default_metadata() {
        let msg: BoxedMessage = Arc::new(Ping);
        assert!(msg.message_name().ends_with("Ping"));
        assert!(msg.kinds().is_empty());
        assert!(msg.required_features().is_empty());
    }

    #[test]
    fn test_downcast_and_kinds() {
        let msg: BoxedMessage = Arc::new(Invoice { amount: 12 });

        assert!(msg.is::<Invoice>());
        assert!(!msg.is::<Ping>());
        assert!(msg.has_kind("NonFree"));
        assert_eq!(msg.message_type_id(), TypeId::of::<Invoice>());
        assert_eq!(msg.downcast_ref::<Invoice>().map(|i| i.amount), Some(12));

        let descriptor = msg.descriptor();
        assert_eq!(descriptor.name, "billing.invoice");
        assert!(descriptor.has_kind("NonFree"));
        assert_eq!(descriptor.required_features, &["billing"]);

        let invoice = downcast_message::<Invoice>(msg).unwrap();
        assert_eq!(invoice.amount, 12);
    }

    #[test]
    fn test_downcast_wrong_type() {
        let msg: BoxedMessage = Arc::new(Ping);
        assert!(downcast_message::<Invoice>(msg).is_none());
    }
}
