//! Delivery queue — ordered, deduplicated, acknowledgable message storage.
//!
//! Messages survive recipient disconnects: a peer that reconnects simply
//! asks for its pending messages again. Ordering within one
//! `(service, client)` queue follows a process-wide sequence counter
//! allocated under the store lock, so observed order equals enqueue order.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// An enqueued, not-yet-acknowledged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    /// Caller-supplied message ID; dedup key while pending.
    pub id: String,
    /// Opaque message body.
    pub body: String,
    /// Monotonic ordering token assigned at enqueue time.
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct QueueInner {
    /// (service_id, client_id) → pending messages in enqueue order.
    queues: HashMap<(String, String), VecDeque<PendingMessage>>,
    /// Process-wide sequence counter.
    sequence: u64,
}

/// Thread-safe store of per-recipient delivery queues.
#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    inner: Arc<RwLock<QueueInner>>,
}

impl QueueStore {
    /// Create a new empty queue store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to a recipient's queue.
    ///
    /// Dedup is by `id` against the *currently pending* contents of that
    /// queue only: a duplicate is a no-op (returns `false`) and keeps the
    /// first body, while re-enqueueing an id that was already acknowledged
    /// creates a brand-new pending message.
    pub fn enqueue(&self, service_id: &str, client_id: &str, body: &str, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let key = (service_id.to_string(), client_id.to_string());

        let already_pending = inner
            .queues
            .get(&key)
            .is_some_and(|q| q.iter().any(|msg| msg.id == id));
        if already_pending {
            debug!(service_id, client_id, id, "Dropped duplicate pending message");
            return false;
        }

        inner.sequence += 1;
        let sequence = inner.sequence;
        inner.queues.entry(key).or_default().push_back(PendingMessage {
            id: id.to_string(),
            body: body.to_string(),
            sequence,
        });
        debug!(service_id, client_id, id, sequence, "Enqueued message");
        true
    }

    /// Remove a pending message by id. Idempotent: acknowledging an
    /// absent or already-acknowledged message returns `false`.
    pub fn acknowledge(&self, service_id: &str, client_id: &str, id: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let key = (service_id.to_string(), client_id.to_string());
        let Some(queue) = inner.queues.get_mut(&key) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|msg| msg.id != id);
        let removed = queue.len() < before;
        if removed {
            debug!(service_id, client_id, id, "Acknowledged message");
        }
        removed
    }

    /// Ordered snapshot of a recipient's pending messages. Read-only:
    /// delivery does not consume.
    pub fn pending(&self, service_id: &str, client_id: &str) -> Vec<PendingMessage> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .queues
            .get(&(service_id.to_string(), client_id.to_string()))
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Hook for a freshly reconnected recipient. The base design holds no
    /// liveness state, so this is a no-op: redelivery happens when the
    /// recipient pulls `pending` again.
    pub fn reconnect_hint(&self, service_id: &str) {
        debug!(service_id, "Reconnect hint received");
    }

    /// Total pending messages across all queues.
    pub fn total_pending(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.queues.values().map(|q| q.len()).sum()
    }

    /// Administrative wipe of all queues and the sequence counter.
    /// Testing/ops tooling only.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.queues.clear();
        inner.sequence = 0;
    }
}
