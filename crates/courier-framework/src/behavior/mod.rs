//! Behaviors: ordered interceptors around message handling.
//!
//! A [`Behavior`] gets a `before` hook, run in descending priority order
//! before the handler, and an `after` hook, run in reverse order for every
//! behavior whose `before` was entered. `before` decides how the pipeline
//! continues by returning a [`Flow`].
//!
//! ```text
//!   before(HIGH) ─▶ before(NORMAL) ─▶ before(LOW) ─▶ handler
//!                                                      │
//!   after(HIGH)  ◀─ after(NORMAL)  ◀─ after(LOW)  ◀────┘
//! ```
//!
//! Which messages a behavior sees is declared on its
//! [`BehaviorRegistration`] through [`AppliesTo`].
//!
//! # Example
//!
//! ```rust,ignore
//! struct Audit;
//!
//! #[async_trait]
//! impl Behavior for Audit {
//!     async fn after(&self, ctx: &mut DispatchContext, outcome: &mut DispatchResult<Value>) {
//!         info!(message = ctx.message().message_name(), ok = outcome.is_ok(), "handled");
//!     }
//! }
//!
//! let registration = BehaviorRegistration::new(Audit)
//!     .for_kind("NonFree")
//!     .with_priority(Priority::LOW);
//! ```

pub mod auth;
pub mod features;

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use courier_core::{DispatchContext, DispatchError, DispatchResult, Message};

pub use auth::{AuthenticationBehavior, AuthenticationService, StaticTokenAuthenticator};
pub use features::{FeatureRegistry, RequiredFeatureBehavior, StaticFeatureRegistry};

// ============================================================================
// Flow
// ============================================================================

/// Outcome of a `before` hook.
#[derive(Debug, Clone)]
pub enum Flow {
    /// Continue with the next behavior, then the handler.
    Proceed,
    /// Skip the remaining `before` hooks and the handler; the value becomes
    /// the call result.
    Interrupt(Value),
    /// Abort with an error.
    Fault(DispatchError),
}

// ============================================================================
// Behavior
// ============================================================================

/// An interceptor around message handling.
///
/// Both hooks default to doing nothing.
#[async_trait]
pub trait Behavior: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs before the handler. May read or replace the context identity.
    async fn before(&self, _ctx: &mut DispatchContext) -> Flow {
        Flow::Proceed
    }

    /// Runs after the handler, or after an interrupt or fault, if this
    /// behavior's `before` was entered. May observe or replace the outcome.
    async fn after(&self, _ctx: &mut DispatchContext, _outcome: &mut DispatchResult<Value>) {}
}

// ============================================================================
// Priority
// ============================================================================

/// Ordering weight of a behavior or router. Higher runs first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Runs before everything else.
    pub const HIGHEST: Priority = Priority(i32::MAX);
    /// Runs early.
    pub const HIGH: Priority = Priority(1000);
    /// The default.
    pub const NORMAL: Priority = Priority(0);
    /// Runs late.
    pub const LOW: Priority = Priority(-1000);
    /// Runs after everything else.
    pub const LOWEST: Priority = Priority(i32::MIN);
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// AppliesTo
// ============================================================================

/// Which messages a behavior applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliesTo {
    /// Every message.
    Any,
    /// One message type, optionally extended to its subtypes.
    ///
    /// With `hierarchy` set, the behavior also applies to every message that
    /// lists `name` among its [`kinds`](Message::kinds).
    Type {
        /// The declared type.
        id: TypeId,
        /// Short identifier of the declared type, used as its kind tag.
        name: &'static str,
        /// Whether subtypes match.
        hierarchy: bool,
    },
    /// Every message declaring the given kind tag.
    Kind(&'static str),
}

impl AppliesTo {
    /// Matches exactly `M`.
    pub fn exact<M: Message>() -> Self {
        Self::Type {
            id: TypeId::of::<M>(),
            name: short_type_name::<M>(),
            hierarchy: false,
        }
    }

    /// Matches `M` and every message whose kinds name `M`.
    ///
    /// The tag is the short type name, so same-named types from different
    /// modules share it. Use [`hierarchy_tagged`](Self::hierarchy_tagged)
    /// to pick a distinct tag.
    pub fn hierarchy<M: Message>() -> Self {
        Self::hierarchy_tagged::<M>(short_type_name::<M>())
    }

    /// Matches `M` and every message whose kinds include `tag`.
    pub fn hierarchy_tagged<M: Message>(tag: &'static str) -> Self {
        Self::Type {
            id: TypeId::of::<M>(),
            name: tag,
            hierarchy: true,
        }
    }

    /// Returns `true` if a message of the given type and kinds is covered.
    pub fn matches(&self, message_type: TypeId, kinds: &[&str]) -> bool {
        match self {
            Self::Any => true,
            Self::Type {
                id,
                name,
                hierarchy,
            } => *id == message_type || (*hierarchy && kinds.contains(name)),
            Self::Kind(kind) => kinds.contains(kind),
        }
    }
}

/// Returns the last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ============================================================================
// BehaviorRegistration
// ============================================================================

/// A behavior together with its applicability and priority.
#[derive(Clone)]
pub struct BehaviorRegistration {
    /// The behavior.
    pub behavior: Arc<dyn Behavior>,
    /// Which messages it sees.
    pub applies_to: AppliesTo,
    /// Ordering weight.
    pub priority: Priority,
}

impl BehaviorRegistration {
    /// Registers a behavior for every message at [`Priority::NORMAL`].
    pub fn new(behavior: impl Behavior) -> Self {
        Self::from_arc(Arc::new(behavior))
    }

    /// Registers an already shared behavior.
    pub fn from_arc(behavior: Arc<dyn Behavior>) -> Self {
        Self {
            behavior,
            applies_to: AppliesTo::Any,
            priority: Priority::NORMAL,
        }
    }

    /// Restricts the behavior to exactly `M`.
    pub fn for_message<M: Message>(mut self) -> Self {
        self.applies_to = AppliesTo::exact::<M>();
        self
    }

    /// Restricts the behavior to `M` and its subtypes.
    pub fn for_hierarchy<M: Message>(mut self) -> Self {
        self.applies_to = AppliesTo::hierarchy::<M>();
        self
    }

    /// Restricts the behavior to `M` and the messages declaring `tag`.
    pub fn for_hierarchy_tagged<M: Message>(mut self, tag: &'static str) -> Self {
        self.applies_to = AppliesTo::hierarchy_tagged::<M>(tag);
        self
    }

    /// Restricts the behavior to messages declaring `kind`.
    pub fn for_kind(mut self, kind: &'static str) -> Self {
        self.applies_to = AppliesTo::Kind(kind);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Returns the behavior's name.
    pub fn name(&self) -> &str {
        self.behavior.name()
    }
}

impl fmt::Debug for BehaviorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistration")
            .field("behavior", &self.behavior.name())
            .field("applies_to", &self.applies_to)
            .field("priority", &self.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NonFree;

    impl Message for NonFree {}

    #[derive(Debug)]
    struct Invoice;

    impl Message for Invoice {
        fn kinds(&self) -> &'static [&'static str] {
            &["NonFree"]
        }
    }

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {}

    fn check<M: Message>(applies_to: &AppliesTo, message: M) -> bool {
        applies_to.matches(TypeId::of::<M>(), message.kinds())
    }

    #[test]
    fn test_exact_match() {
        let applies_to = AppliesTo::exact::<NonFree>();
        assert!(check(&applies_to, NonFree));
        assert!(!check(&applies_to, Invoice));
    }

    #[test]
    fn test_hierarchy_match() {
        let applies_to = AppliesTo::hierarchy::<NonFree>();
        assert!(check(&applies_to, NonFree));
        assert!(check(&applies_to, Invoice));
        assert!(!check(&applies_to, Ping));
    }

    mod billing {
        use courier_core::Message;

        #[derive(Debug)]
        pub struct NonFree;

        impl Message for NonFree {}
    }

    #[test]
    fn test_tagged_hierarchy_keeps_same_named_types_apart() {
        let shared = AppliesTo::hierarchy::<billing::NonFree>();
        assert!(check(&shared, Invoice));

        let tagged = AppliesTo::hierarchy_tagged::<billing::NonFree>("billing::NonFree");
        assert!(check(&tagged, billing::NonFree));
        assert!(!check(&tagged, Invoice));
        assert!(!check(&tagged, NonFree));
    }

    #[test]
    fn test_kind_and_any() {
        assert!(check(&AppliesTo::Kind("NonFree"), Invoice));
        assert!(!check(&AppliesTo::Kind("NonFree"), Ping));
        assert!(check(&AppliesTo::Any, Ping));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Invoice>(), "Invoice");
        assert_eq!(short_type_name::<Vec<Invoice>>(), "Vec");
    }

    #[test]
    fn test_priority_order() {
        assert!(Priority::HIGHEST > Priority::HIGH);
        assert!(Priority::HIGH > Priority::NORMAL);
        assert!(Priority::NORMAL > Priority::LOW);
        assert!(Priority::LOW > Priority::LOWEST);
    }
}
