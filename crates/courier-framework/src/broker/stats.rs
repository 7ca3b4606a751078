//! Broker counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// A snapshot of broker activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Two-way calls currently outstanding.
    pub pending: usize,
    /// Envelopes handed to a router, including replies.
    pub sent: u64,
    /// Envelopes no router accepted or whose transport failed.
    pub send_failures: u64,
    /// Two-way calls completed by a reply.
    pub replies: u64,
    /// Replies that matched no outstanding call.
    pub late_replies: u64,
    /// Two-way calls that timed out.
    pub timeouts: u64,
    /// Two-way calls cancelled by the caller.
    pub cancellations: u64,
    /// Inbound requests processed locally.
    pub received: u64,
}

#[derive(Debug, Default)]
pub(crate) struct BrokerCounters {
    pub(crate) sent: AtomicU64,
    pub(crate) send_failures: AtomicU64,
    pub(crate) replies: AtomicU64,
    pub(crate) late_replies: AtomicU64,
    pub(crate) timeouts: AtomicU64,
    pub(crate) cancellations: AtomicU64,
    pub(crate) received: AtomicU64,
}

impl BrokerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, pending: usize) -> BrokerStats {
        BrokerStats {
            pending,
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            late_replies: self.late_replies.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
        }
    }
}
