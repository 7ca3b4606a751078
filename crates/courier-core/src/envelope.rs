//! Routable envelopes (brokered messages).
//!
//! An [`Envelope`] wraps a [`Message`] with everything the broker needs to
//! deliver it: a correlation id, sender and recipients, one-way flag,
//! timeout, an optional bearer token and, on replies, the id of the request
//! being answered.
//!
//! ```rust,ignore
//! let envelope = Envelope::new(Ping)
//!     .to(Endpoint::instance("worker-1"))
//!     .with_timeout(Duration::from_millis(50));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::DispatchError;
use crate::message::{BoxedMessage, Message};

// ============================================================================
// MessageId
// ============================================================================

/// Process-unique correlation identifier of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// What an envelope carries.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A request or notification message.
    Message(BoxedMessage),
    /// A successful reply value.
    Response(Value),
    /// A failed reply: the error raised while processing the request.
    Fault(DispatchError),
}

impl Payload {
    /// Converts a dispatch outcome into a reply payload.
    pub fn from_outcome(outcome: Result<Value, DispatchError>) -> Self {
        match outcome {
            Ok(value) => Self::Response(value),
            Err(err) => Self::Fault(err),
        }
    }

    /// Converts a reply payload back into a dispatch outcome.
    ///
    /// A message payload on a reply is unexpected; it is reported as a
    /// handler fault.
    pub fn into_outcome(self) -> Result<Value, DispatchError> {
        match self {
            Self::Response(value) => Ok(value),
            Self::Fault(err) => Err(err),
            Self::Message(message) => Err(DispatchError::Handler(format!(
                "reply carried a message ('{}') instead of a response",
                message.message_name()
            ))),
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A message wrapped for distribution.
///
/// Invariant: `reply_to_id` is set iff the envelope is a reply, and replies
/// are always one-way.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Correlation identifier, generated at creation.
    pub id: MessageId,
    /// The carried payload.
    pub content: Payload,
    /// The sending endpoint.
    pub sender: Option<Endpoint>,
    /// The recipients. Empty means broadcast.
    pub recipients: Vec<Endpoint>,
    /// Whether a reply is expected.
    pub is_one_way: bool,
    /// Reply deadline; `None` uses the broker's configured default.
    pub timeout: Option<Duration>,
    /// Id of the envelope this one answers.
    pub reply_to_id: Option<MessageId>,
    /// Credential for downstream authentication.
    pub bearer_token: Option<String>,
    /// Creation time.
    pub timestamp: SystemTime,
}

impl Envelope {
    /// Wraps a message into a new two-way envelope.
    pub fn new<M: Message>(message: M) -> Self {
        Self::from_boxed(Arc::new(message))
    }

    /// Wraps an already shared message into a new two-way envelope.
    pub fn from_boxed(message: BoxedMessage) -> Self {
        Self {
            id: MessageId::new(),
            content: Payload::Message(message),
            sender: None,
            recipients: Vec::new(),
            is_one_way: false,
            timeout: None,
            reply_to_id: None,
            bearer_token: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Builds the reply to `request`, addressed back to its sender.
    pub fn reply_to(request: &Envelope, content: Payload) -> Self {
        Self {
            id: MessageId::new(),
            content,
            sender: None,
            recipients: request.sender.iter().cloned().collect(),
            is_one_way: true,
            timeout: None,
            reply_to_id: Some(request.id),
            bearer_token: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Adds a recipient.
    pub fn to(mut self, recipient: Endpoint) -> Self {
        self.recipients.push(recipient);
        self
    }

    /// Adds several recipients.
    pub fn to_all(mut self, recipients: impl IntoIterator<Item = Endpoint>) -> Self {
        self.recipients.extend(recipients);
        self
    }

    /// Sets the sender.
    pub fn sent_by(mut self, sender: Endpoint) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Marks the envelope as fire-and-forget.
    pub fn one_way(mut self) -> Self {
        self.is_one_way = true;
        self
    }

    /// Sets the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Reuses an existing correlation id.
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Returns `true` if this envelope answers another one.
    pub fn is_reply(&self) -> bool {
        self.reply_to_id.is_some()
    }

    /// Returns the carried message, if this is not a reply.
    pub fn message(&self) -> Option<&BoxedMessage> {
        match &self.content {
            Payload::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Returns a copy of this envelope restricted to the given recipients.
    pub fn with_recipients(&self, recipients: Vec<Endpoint>) -> Self {
        Self {
            recipients,
            ..self.clone()
        }
    }

    /// Short description used in logs.
    pub fn describe(&self) -> &'static str {
        match &self.content {
            Payload::Message(message) => message.message_name(),
            Payload::Response(_) => "response",
            Payload::Fault(_) => "fault",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    impl Message for Ping {
        fn message_name(&self) -> &'static str {
            "ping"
        }
    }

    #[test]
    fn test_new_envelope_defaults() {
        let envelope = Envelope::new(Ping).to(Endpoint::instance("worker-1"));

        assert!(!envelope.is_one_way);
        assert!(!envelope.is_reply());
        assert!(envelope.timeout.is_none());
        assert_eq!(envelope.recipients.len(), 1);
        assert_eq!(envelope.describe(), "ping");
        assert!(envelope.message().is_some());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Envelope::new(Ping);
        let b = Envelope::new(Ping);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_reply_addresses_sender() {
        let request = Envelope::new(Ping)
            .sent_by(Endpoint::instance("client"))
            .to(Endpoint::instance("server"));
        let reply = Envelope::reply_to(&request, Payload::Response(Value::from(42)));

        assert!(reply.is_reply());
        assert!(reply.is_one_way);
        assert_eq!(reply.reply_to_id, Some(request.id));
        assert_eq!(reply.recipients, vec![Endpoint::instance("client")]);
        assert!(reply.message().is_none());
        assert_eq!(reply.content.into_outcome().unwrap(), Value::from(42));
    }

    #[test]
    fn test_fault_payload_round_trips_error() {
        let payload = Payload::from_outcome(Err(DispatchError::Cancelled));
        assert!(matches!(payload.into_outcome(), Err(DispatchError::Cancelled)));
    }
}
