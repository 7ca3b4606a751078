//! The correlation table of outstanding two-way calls.
//!
//! Every completion path (reply, routing failure, timeout, cancellation,
//! sweep) claims a call by removing it from the table. Removal is atomic, so
//! exactly one path completes each call.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use courier_core::{DispatchError, DispatchResult, MessageId};

/// Stand-in deadline for timeouts too large to add to an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Returns `start + timeout`, saturating to a far-future deadline.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// One outstanding two-way call.
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub(crate) deadline: Instant,
    pub(crate) timeout: Duration,
    completion: oneshot::Sender<DispatchResult<Value>>,
}

impl PendingCall {
    /// Returns `true` once `grace` has passed beyond the call's deadline.
    /// A deadline that cannot be extended by `grace` never expires.
    fn is_expired(&self, now: Instant, grace: Duration) -> bool {
        self.deadline
            .checked_add(grace)
            .is_some_and(|expiry| now >= expiry)
    }

    /// Completes the waiting caller. A caller that already gave up is ignored.
    pub(crate) fn complete(self, outcome: DispatchResult<Value>) {
        let _ = self.completion.send(outcome);
    }
}

/// Concurrent map from correlation id to outstanding call.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    calls: DashMap<MessageId, PendingCall>,
}

impl PendingTable {
    /// Registers a call unless one with the same id is outstanding.
    pub(crate) fn register(
        &self,
        id: MessageId,
        timeout: Duration,
    ) -> DispatchResult<oneshot::Receiver<DispatchResult<Value>>> {
        match self.calls.entry(id) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateCorrelation(id)),
            Entry::Vacant(slot) => {
                let (completion, receiver) = oneshot::channel();
                slot.insert(PendingCall {
                    deadline: deadline_after(Instant::now(), timeout),
                    timeout,
                    completion,
                });
                Ok(receiver)
            }
        }
    }

    /// Removes the call, handing it to the caller that won the race.
    pub(crate) fn claim(&self, id: &MessageId) -> Option<PendingCall> {
        self.calls.remove(id).map(|(_, call)| call)
    }

    /// Claims and completes the call. Returns `false` if it was already claimed.
    pub(crate) fn complete(&self, id: &MessageId, outcome: DispatchResult<Value>) -> bool {
        match self.claim(id) {
            Some(call) => {
                call.complete(outcome);
                true
            }
            None => false,
        }
    }

    /// Completes every call past its deadline plus `grace` with a timeout.
    pub(crate) fn sweep(&self, grace: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<MessageId> = self
            .calls
            .iter()
            .filter(|entry| entry.is_expired(now, grace))
            .map(|entry| *entry.key())
            .collect();

        let mut swept = 0;
        for id in expired {
            if let Some(call) = self.claim(&id) {
                let timeout = call.timeout;
                call.complete(Err(DispatchError::Timeout { id, timeout }));
                swept += 1;
            }
        }
        swept
    }

    pub(crate) fn contains(&self, id: &MessageId) -> bool {
        self.calls.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }
}

/// Removes a call from the table when the waiting future is dropped.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: MessageId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(table: &'a PendingTable, id: MessageId) -> Self {
        Self { table, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.claim(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let table = PendingTable::default();
        let id = MessageId::new();

        let _rx = table.register(id, Duration::from_secs(1)).unwrap();
        assert!(matches!(
            table.register(id, Duration::from_secs(1)),
            Err(DispatchError::DuplicateCorrelation(dup)) if dup == id
        ));
    }

    #[tokio::test]
    async fn test_complete_once() {
        let table = PendingTable::default();
        let id = MessageId::new();
        let rx = table.register(id, Duration::from_secs(1)).unwrap();

        assert!(table.complete(&id, Ok(Value::from(1))));
        assert!(!table.complete(&id, Ok(Value::from(2))));
        assert_eq!(rx.await.unwrap().unwrap(), Value::from(1));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_grace() {
        let table = PendingTable::default();
        let id = MessageId::new();
        let rx = table.register(id, Duration::from_millis(50)).unwrap();

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(table.sweep(Duration::from_millis(100)), 0);
        assert!(table.contains(&id));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(table.sweep(Duration::from_millis(100)), 1);
        assert!(rx.await.unwrap().unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_unbounded_timeout_never_sweeps() {
        let table = PendingTable::default();
        let id = MessageId::new();
        let _rx = table.register(id, Duration::MAX).unwrap();

        assert_eq!(table.sweep(Duration::MAX), 0);
        assert_eq!(table.sweep(Duration::ZERO), 0);
        assert!(table.contains(&id));
    }

    #[test]
    fn test_deadline_saturates() {
        let start = Instant::now();
        assert_eq!(
            deadline_after(start, Duration::from_secs(1)),
            start + Duration::from_secs(1)
        );
        assert!(deadline_after(start, Duration::MAX) > start + Duration::from_secs(86400 * 365));
    }

    #[tokio::test]
    async fn test_guard_removes_on_drop() {
        let table = PendingTable::default();
        let id = MessageId::new();
        let _rx = table.register(id, Duration::from_secs(1)).unwrap();

        drop(PendingGuard::new(&table, id));
        assert!(!table.contains(&id));
    }
}
