//! Pending action ledger
//!
//! Shared between the action dispatcher (which owns the lifecycle of each
//! action) and the sync coordinator (which only reads the deferred id set
//! so syncs skip messages with unresolved actions).
//!
//! Actions on the same message queue FIFO; actions on different messages
//! are independent.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::models::{MessageId, PendingAction};

/// Per-message FIFO queues of unresolved actions
#[derive(Default)]
pub struct ActionLedger {
    queues: Mutex<HashMap<String, VecDeque<PendingAction>>>,
}

impl ActionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an action behind any earlier actions on the same message.
    /// Returns true when the queue was empty, meaning the action is
    /// immediately dispatchable.
    pub fn enqueue(&self, action: PendingAction) -> bool {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.entry(action.message_id.0.clone()).or_default();
        queue.push_back(action);
        queue.len() == 1
    }

    /// Snapshot of the action at the head of a message's queue
    pub fn front(&self, id: &MessageId) -> Option<PendingAction> {
        let queues = self.queues.lock().unwrap();
        queues.get(&id.0).and_then(|q| q.front()).cloned()
    }

    /// Mutate the action at the head of a message's queue in place
    pub fn update_front(&self, id: &MessageId, f: impl FnOnce(&mut PendingAction)) {
        let mut queues = self.queues.lock().unwrap();
        if let Some(action) = queues.get_mut(&id.0).and_then(|q| q.front_mut()) {
            f(action);
        }
    }

    /// Pop the head of a message's queue (resolved action). Returns true
    /// when more actions remain queued for that message.
    pub fn resolve_front(&self, id: &MessageId) -> bool {
        let mut queues = self.queues.lock().unwrap();
        if let Some(queue) = queues.get_mut(&id.0) {
            queue.pop_front();
            if queue.is_empty() {
                queues.remove(&id.0);
                return false;
            }
            return true;
        }
        false
    }

    /// Drop a message's entire queue. Used after a rollback: later queued
    /// actions were built on state that no longer exists.
    pub fn abandon(&self, id: &MessageId) -> Vec<PendingAction> {
        let mut queues = self.queues.lock().unwrap();
        queues
            .remove(&id.0)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default()
    }

    /// Whether a message has any unresolved action
    pub fn has_pending(&self, id: &MessageId) -> bool {
        let queues = self.queues.lock().unwrap();
        queues.contains_key(&id.0)
    }

    /// Ids of all messages with unresolved actions; syncs defer these
    pub fn deferred_ids(&self) -> HashSet<MessageId> {
        let queues = self.queues.lock().unwrap();
        queues.keys().map(MessageId::new).collect()
    }

    /// Total unresolved actions across all messages
    pub fn pending_count(&self) -> usize {
        let queues = self.queues.lock().unwrap();
        queues.values().map(|q| q.len()).sum()
    }
}
