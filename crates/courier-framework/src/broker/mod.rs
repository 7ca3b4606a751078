//! The broker: envelope distribution and request/response correlation.
//!
//! The [`Broker`] sends envelopes through the [`RouterTable`] and, for
//! two-way calls, waits for the matching reply:
//!
//! ```text
//!  send_and_receive ──▶ register(id) ──▶ RouterTable::dispatch ──▶ transport
//!         │                                                          │
//!         ▼                                                          ▼
//!   wait: reply │ deadline │ cancellation          remote Broker::receive
//!         ▲                                                          │
//!         └──────────── complete_reply(reply_to_id) ◀── reply ◀──────┘
//! ```
//!
//! Exactly one of reply, routing failure, timeout, cancellation or sweep
//! completes each call; the others find the call already claimed.
//!
//! # Example
//!
//! ```rust,ignore
//! let broker = Broker::builder()
//!     .routers(table)
//!     .processor(processor)
//!     .config(BrokerConfig::default().with_endpoint(Endpoint::instance("client")))
//!     .build();
//!
//! let envelope = Envelope::new(Ping).to(Endpoint::instance("server"));
//! let value = broker.send_and_receive(envelope, &CancellationToken::new()).await?;
//! ```

mod pending;
mod stats;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, warn};

use self::pending::{PendingGuard, PendingTable, deadline_after};
use self::stats::BrokerCounters;
use crate::processor::MessageProcessor;
use crate::routing::RouterTable;
use courier_core::{
    DispatchContext, DispatchError, DispatchResult, Endpoint, Envelope, MessageId, Payload,
};

pub use stats::BrokerStats;

// ============================================================================
// BrokerConfig
// ============================================================================

/// Broker settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Reply timeout for envelopes that do not set one.
    pub default_timeout: Duration,
    /// Extra time past a call's deadline before the sweeper reclaims it.
    pub reply_grace: Duration,
    /// This instance's endpoint, stamped as sender on outbound envelopes.
    pub endpoint: Option<Endpoint>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            reply_grace: Duration::from_secs(5),
            endpoint: None,
        }
    }
}

impl BrokerConfig {
    /// Sets the default reply timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the sweeper grace period.
    pub fn with_reply_grace(mut self, grace: Duration) -> Self {
        self.reply_grace = grace;
        self
    }

    /// Sets this instance's endpoint.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

// ============================================================================
// Broker
// ============================================================================

/// Distributes envelopes and correlates replies.
///
/// Cloning is cheap; clones share the router table and correlation table.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    routers: RouterTable,
    pending: PendingTable,
    config: BrokerConfig,
    processor: Option<Arc<MessageProcessor>>,
    counters: BrokerCounters,
}

/// How a two-way wait ended.
enum Wake {
    Completed(Result<DispatchResult<Value>, oneshot::error::RecvError>),
    TimedOut,
    Cancelled,
}

impl Broker {
    /// Creates a broker that only sends. Inbound requests are answered with
    /// [`DispatchError::NoHandler`].
    pub fn new(routers: RouterTable, config: BrokerConfig) -> Self {
        Self::builder().routers(routers).config(config).build()
    }

    /// Returns a builder.
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Returns the router table.
    pub fn routers(&self) -> &RouterTable {
        &self.inner.routers
    }

    /// Returns the number of outstanding two-way calls.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns `true` if a two-way call with this id is outstanding.
    pub fn is_pending(&self, id: &MessageId) -> bool {
        self.inner.pending.contains(id)
    }

    /// Returns a snapshot of the broker counters.
    pub fn stats(&self) -> BrokerStats {
        self.inner.counters.snapshot(self.pending_count())
    }

    fn stamp_sender(&self, envelope: &mut Envelope) {
        if envelope.sender.is_none() {
            envelope.sender = self.inner.config.endpoint.clone();
        }
    }

    // ─── One-way ──────────────────────────────────────────────────────────────

    /// Sends `envelope` without expecting a reply.
    ///
    /// Returns once a router accepted the envelope. Failures are logged and
    /// never returned.
    pub async fn send(&self, mut envelope: Envelope) {
        envelope.is_one_way = true;
        self.stamp_sender(&mut envelope);

        let span = debug_span!("send", id = %envelope.id, message = envelope.describe());
        async {
            match self.inner.routers.dispatch(&envelope).await {
                Ok(()) => {
                    BrokerCounters::bump(&self.inner.counters.sent);
                    debug!("One-way envelope handed off");
                }
                Err(err) => {
                    BrokerCounters::bump(&self.inner.counters.send_failures);
                    error!(error = %err, "Failed to send one-way envelope");
                }
            }
        }
        .instrument(span)
        .await
    }

    // ─── Two-way ──────────────────────────────────────────────────────────────

    /// Sends `envelope` and waits for its reply.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Cancelled`] if `cancellation` fires first
    /// - [`DispatchError::Timeout`] if no reply arrives before the deadline
    /// - [`DispatchError::Routing`] or [`DispatchError::Transport`] if the
    ///   envelope could not be sent
    /// - [`DispatchError::DuplicateCorrelation`] if a call with the same id
    ///   is outstanding
    /// - [`DispatchError::ReplyNotAwaitable`] if `envelope` is itself a reply
    /// - any fault carried by the reply
    pub async fn send_and_receive(
        &self,
        mut envelope: Envelope,
        cancellation: &CancellationToken,
    ) -> DispatchResult<Value> {
        if cancellation.is_cancelled() {
            BrokerCounters::bump(&self.inner.counters.cancellations);
            return Err(DispatchError::Cancelled);
        }
        if let Some(reply_to) = envelope.reply_to_id {
            warn!(id = %envelope.id, reply_to = %reply_to, "Replies cannot await a reply");
            return Err(DispatchError::ReplyNotAwaitable {
                id: envelope.id,
                reply_to,
            });
        }

        envelope.is_one_way = false;
        self.stamp_sender(&mut envelope);
        let id = envelope.id;
        let timeout = envelope.timeout.unwrap_or(self.inner.config.default_timeout);

        let span = debug_span!("send_and_receive", id = %id, message = envelope.describe());
        let outcome = self
            .await_reply(envelope, timeout, cancellation)
            .instrument(span)
            .await;

        match &outcome {
            Err(DispatchError::Timeout { .. }) => {
                BrokerCounters::bump(&self.inner.counters.timeouts);
            }
            Err(DispatchError::Cancelled) => {
                BrokerCounters::bump(&self.inner.counters.cancellations);
            }
            _ => {}
        }
        outcome
    }

    async fn await_reply(
        &self,
        envelope: Envelope,
        timeout: Duration,
        cancellation: &CancellationToken,
    ) -> DispatchResult<Value> {
        let id = envelope.id;
        let deadline = deadline_after(Instant::now(), timeout);
        let mut reply = self.inner.pending.register(id, timeout)?;
        let _guard = PendingGuard::new(&self.inner.pending, id);

        match self.inner.routers.dispatch(&envelope).await {
            Ok(()) => {
                BrokerCounters::bump(&self.inner.counters.sent);
                debug!(?timeout, "Awaiting reply");
            }
            Err(err) => {
                BrokerCounters::bump(&self.inner.counters.send_failures);
                debug!(error = %err, "Two-way dispatch failed");
                self.inner.pending.complete(&id, Err(err));
            }
        }

        let wake = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Wake::Cancelled,
            completed = timeout_at(deadline, &mut reply) => match completed {
                Ok(outcome) => Wake::Completed(outcome),
                Err(_) => Wake::TimedOut,
            },
        };

        match wake {
            Wake::Completed(Ok(outcome)) => outcome,
            Wake::Completed(Err(_)) => Err(DispatchError::Timeout { id, timeout }),
            Wake::TimedOut => {
                let failure = DispatchError::Timeout { id, timeout };
                self.claim_or_wait(id, failure, reply).await
            }
            Wake::Cancelled => self.claim_or_wait(id, DispatchError::Cancelled, reply).await,
        }
    }

    /// Claims the call for `failure`, or returns the outcome of the path that
    /// claimed it first.
    async fn claim_or_wait(
        &self,
        id: MessageId,
        failure: DispatchError,
        reply: oneshot::Receiver<DispatchResult<Value>>,
    ) -> DispatchResult<Value> {
        if self.inner.pending.claim(&id).is_some() {
            debug!(reason = %failure, "Abandoning call");
            return Err(failure);
        }
        reply.await.unwrap_or(Err(failure))
    }

    /// Completes the call answered by `reply`.
    ///
    /// Returns `false`, after logging a warning, if no call with the reply's
    /// `reply_to_id` is outstanding. Completing the same call twice is
    /// harmless.
    pub fn complete_reply(&self, reply: Envelope) -> bool {
        let Some(reply_to) = reply.reply_to_id else {
            warn!(id = %reply.id, "Ignoring envelope without reply id");
            return false;
        };

        if self
            .inner
            .pending
            .complete(&reply_to, reply.content.into_outcome())
        {
            BrokerCounters::bump(&self.inner.counters.replies);
            debug!(reply_to = %reply_to, "Completed call with reply");
            true
        } else {
            BrokerCounters::bump(&self.inner.counters.late_replies);
            warn!(reply_to = %reply_to, "Discarding late or unknown reply");
            false
        }
    }

    // ─── Inbound ──────────────────────────────────────────────────────────────

    /// Handles an envelope delivered by a transport.
    ///
    /// Replies complete their call. Requests run through the local pipeline;
    /// for two-way requests the result, or the fault, is routed back to the
    /// sender.
    pub async fn receive(&self, envelope: Envelope) {
        if envelope.is_reply() {
            self.complete_reply(envelope);
            return;
        }

        let span = debug_span!("receive", id = %envelope.id, message = envelope.describe());
        async {
            let Some(ctx) = DispatchContext::from_envelope(&envelope) else {
                warn!("Inbound request carries no message");
                return;
            };
            BrokerCounters::bump(&self.inner.counters.received);

            let outcome = match &self.inner.processor {
                Some(processor) => processor.process(ctx).await,
                None => Err(DispatchError::NoHandler {
                    message: envelope.describe(),
                }),
            };

            if envelope.is_one_way {
                if let Err(err) = &outcome {
                    warn!(error = %err, "One-way message failed");
                }
                return;
            }
            if envelope.sender.is_none() {
                warn!("Two-way request has no sender, dropping reply");
                return;
            }

            let mut reply = Envelope::reply_to(&envelope, Payload::from_outcome(outcome));
            self.stamp_sender(&mut reply);
            match self.inner.routers.dispatch(&reply).await {
                Ok(()) => BrokerCounters::bump(&self.inner.counters.sent),
                Err(err) => {
                    BrokerCounters::bump(&self.inner.counters.send_failures);
                    warn!(error = %err, "Failed to route reply");
                }
            }
        }
        .instrument(span)
        .await
    }

    // ─── Maintenance ──────────────────────────────────────────────────────────

    /// Completes every call past its deadline plus the configured grace with
    /// a timeout. Returns the number of calls reclaimed.
    pub fn sweep_expired(&self) -> usize {
        let swept = self.inner.pending.sweep(self.inner.config.reply_grace);
        if swept > 0 {
            warn!(swept, "Reclaimed expired calls");
        }
        swept
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("endpoint", &self.inner.config.endpoint)
            .field("routers", &self.inner.routers.len())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

// ============================================================================
// BrokerBuilder
// ============================================================================

/// Builder for [`Broker`].
#[derive(Default)]
pub struct BrokerBuilder {
    routers: Option<RouterTable>,
    config: BrokerConfig,
    processor: Option<Arc<MessageProcessor>>,
}

impl BrokerBuilder {
    /// Sets the router table. Defaults to an empty table.
    pub fn routers(mut self, routers: RouterTable) -> Self {
        self.routers = Some(routers);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the pipeline that processes inbound requests.
    pub fn processor(mut self, processor: Arc<MessageProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Builds the broker.
    pub fn build(self) -> Broker {
        Broker {
            inner: Arc::new(BrokerInner {
                routers: self.routers.unwrap_or_else(RouterTable::empty),
                pending: PendingTable::default(),
                config: self.config,
                processor: self.processor,
                counters: BrokerCounters::default(),
            }),
        }
    }
}
