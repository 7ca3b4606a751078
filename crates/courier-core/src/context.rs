//! Per-call dispatch context.
//!
//! A [`DispatchContext`] is created fresh for every pipeline run and passed
//! explicitly to every behavior and to the handler. It is never shared
//! between calls and never persisted.
//!
//! Only [`identity`](DispatchContext::identity) is meant to be written by
//! behaviors; everything else is fixed when the context is built.

use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, MessageId};
use crate::error::{DispatchError, DispatchResult};
use crate::identity::Identity;
use crate::message::{BoxedMessage, Message};

/// The context threaded through one pipeline invocation.
///
/// # Example
///
/// ```rust,ignore
/// let ctx = DispatchContext::new(Arc::new(Ping))
///     .with_bearer_token("secret")
///     .with_cancellation(token.child_token());
/// let result = processor.process(ctx).await;
/// ```
#[derive(Debug)]
pub struct DispatchContext {
    message: BoxedMessage,
    identity: Option<Identity>,
    cancellation: CancellationToken,
    is_reply: bool,
    correlation_id: Option<MessageId>,
    bearer_token: Option<String>,
}

impl DispatchContext {
    /// Creates a context for local processing of `message`.
    pub fn new(message: BoxedMessage) -> Self {
        Self {
            message,
            identity: None,
            cancellation: CancellationToken::new(),
            is_reply: false,
            correlation_id: None,
            bearer_token: None,
        }
    }

    /// Creates a context for an inbound envelope.
    ///
    /// Returns `None` if the envelope does not carry a message.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let message = envelope.message()?.clone();
        Some(Self {
            message,
            identity: None,
            cancellation: CancellationToken::new(),
            is_reply: envelope.is_reply(),
            correlation_id: Some(envelope.id),
            bearer_token: envelope.bearer_token.clone(),
        })
    }

    /// Sets the cancellation token observed by this call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Presets the identity.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Attaches a bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Sets the correlation id.
    pub fn with_correlation_id(mut self, id: MessageId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Marks this invocation as processing a reply.
    pub fn as_reply(mut self) -> Self {
        self.is_reply = true;
        self
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    /// Returns the message being processed.
    pub fn message(&self) -> &BoxedMessage {
        &self.message
    }

    /// Returns the message as a concrete type, if it is one.
    pub fn message_as<T: Message>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    /// Returns the authenticated identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Replaces the identity.
    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Returns the bearer token, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// Returns the correlation id of the envelope being processed.
    pub fn correlation_id(&self) -> Option<MessageId> {
        self.correlation_id
    }

    /// Returns `true` if this invocation processes a reply.
    pub fn is_reply(&self) -> bool {
        self.is_reply
    }

    /// Returns the cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` if the caller cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`DispatchError::Cancelled`] if the caller cancelled.
    pub fn check_cancelled(&self) -> DispatchResult<()> {
        if self.is_cancelled() {
            Err(DispatchError::Cancelled)
        } else {
            Ok(())
        }
    }
}
