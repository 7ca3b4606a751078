//! Router selection.
//!
//! A [`MessageRouter`] hands envelopes to one transport. Routers are
//! registered with a receiver url pattern, a priority and a fallback flag;
//! the [`RouterTable`] picks, per recipient, the first router in preference
//! order that accepts the envelope.
//!
//! # Example
//!
//! ```rust,ignore
//! let table = RouterTable::new(vec![
//!     RouterRegistration::new(hub.router(), r"^app://[^/]+/.+$")?,
//!     RouterRegistration::new(relay, r".*")?.fallback(),
//! ]);
//! table.dispatch(&envelope).await?;
//! ```

mod table;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::behavior::Priority;
use crate::error::{FrameworkError, FrameworkResult};
use courier_core::{Envelope, RouterResult};

pub use table::RouterTable;

/// A transport-specific sender of envelopes.
///
/// `try_send` declines with [`RouterError::NotSupported`] or
/// [`RouterError::Addressing`] to let selection move on; any other error
/// means the router accepted the envelope and the transport failed.
///
/// [`RouterError::NotSupported`]: courier_core::RouterError::NotSupported
/// [`RouterError::Addressing`]: courier_core::RouterError::Addressing
#[async_trait]
pub trait MessageRouter: Send + Sync + 'static {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Attempts to hand `envelope` to the transport.
    async fn try_send(&self, envelope: &Envelope) -> RouterResult<()>;
}

/// A boxed, shareable router.
pub type BoxedRouter = Arc<dyn MessageRouter>;

// ============================================================================
// RouterRegistration
// ============================================================================

/// A router with its receiver pattern, fallback flag and priority.
#[derive(Clone)]
pub struct RouterRegistration {
    /// The router.
    pub router: BoxedRouter,
    /// Recipient urls this router is a candidate for.
    pub receiver_pattern: Regex,
    /// Fallback routers are tried only after every non-fallback candidate.
    pub is_fallback: bool,
    /// Ordering weight within the fallback or non-fallback group.
    pub priority: Priority,
}

impl RouterRegistration {
    /// Registers a non-fallback router at [`Priority::NORMAL`].
    pub fn new(router: impl MessageRouter, pattern: &str) -> FrameworkResult<Self> {
        Self::from_arc(Arc::new(router), pattern)
    }

    /// Registers an already shared router.
    pub fn from_arc(router: BoxedRouter, pattern: &str) -> FrameworkResult<Self> {
        let receiver_pattern =
            Regex::new(pattern).map_err(|err| FrameworkError::InvalidPattern {
                pattern: pattern.to_owned(),
                reason: err.to_string(),
            })?;

        Ok(Self {
            router,
            receiver_pattern,
            is_fallback: false,
            priority: Priority::NORMAL,
        })
    }

    /// Marks the router as a fallback.
    pub fn fallback(mut self) -> Self {
        self.is_fallback = true;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Returns `true` if the pattern matches `url`.
    pub fn matches(&self, url: &str) -> bool {
        self.receiver_pattern.is_match(url)
    }

    /// Returns the router's name.
    pub fn name(&self) -> &str {
        self.router.name()
    }
}

impl fmt::Debug for RouterRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterRegistration")
            .field("router", &self.router.name())
            .field("receiver_pattern", &self.receiver_pattern.as_str())
            .field("is_fallback", &self.is_fallback)
            .field("priority", &self.priority)
            .finish()
    }
}
