//! Action dispatcher for user-initiated mutations
//!
//! The core rule: the cache mutates immediately (optimistically), the
//! server is told on a background worker, and if the server never
//! confirms, the cache change is reverted and the failure surfaces as an
//! event. The UI never waits on the network for an action.

use anyhow::Result;
use crossbeam_channel::{Sender, unbounded};
use log::{info, warn};
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use super::ledger::ActionLedger;
use crate::error::{CacheError, client_error};
use crate::events::MailEvent;
use crate::jmap::MailTransport;
use crate::models::{ActionKind, MessageId, PendingAction, PriorState};
use crate::store::MailStore;

/// Dispatch tuning
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Total attempts per action before rollback
    pub max_retries: u32,
    /// Base delay between attempts, doubled each retry
    pub retry_base: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base: Duration::from_millis(500),
        }
    }
}

enum WorkItem {
    Process(MessageId),
    Shutdown,
}

/// Background dispatcher applying optimistic actions to the server
pub struct ActionDispatcher {
    store: Arc<dyn MailStore>,
    ledger: Arc<ActionLedger>,
    events: Sender<MailEvent>,
    work_tx: Sender<WorkItem>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ActionDispatcher {
    /// Create a dispatcher and spawn its worker thread
    pub fn new(
        transport: Arc<dyn MailTransport>,
        store: Arc<dyn MailStore>,
        ledger: Arc<ActionLedger>,
        events: Sender<MailEvent>,
        config: DispatcherConfig,
    ) -> Self {
        let (work_tx, work_rx) = unbounded::<WorkItem>();

        let worker = Worker {
            transport,
            store: store.clone(),
            ledger: ledger.clone(),
            events: events.clone(),
            config,
        };
        let handle = std::thread::Builder::new()
            .name("action-dispatcher".to_string())
            .spawn(move || {
                while let Ok(WorkItem::Process(id)) = work_rx.recv() {
                    worker.process(&id);
                }
            })
            .expect("failed to spawn action dispatcher thread");

        Self {
            store,
            ledger,
            events,
            work_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Apply an action optimistically and queue it for the server.
    ///
    /// The cache reflects the action's outcome before this returns;
    /// confirmation happens in the background. Fails only when the target
    /// message is unknown to the cache.
    pub fn submit(&self, id: &MessageId, kind: ActionKind) -> Result<()> {
        let message = self
            .store
            .get_message(id)?
            .ok_or_else(|| CacheError::UnknownMessage(id.0.clone()))?;

        let prior = if kind.removes_from_folder() {
            let mailbox_id = self.store.remove_from_folder(id)?;
            PriorState::Placement { mailbox_id }
        } else {
            let prior = PriorState::Flags {
                is_read: message.is_read,
                is_starred: message.is_starred,
            };
            let (is_read, is_starred) = match kind {
                ActionKind::MarkRead => (Some(true), None),
                ActionKind::MarkUnread => (Some(false), None),
                ActionKind::Star => (None, Some(true)),
                ActionKind::Unstar => (None, Some(false)),
                ActionKind::Archive | ActionKind::Delete => unreachable!(),
            };
            self.store.set_flags(id, is_read, is_starred)?;
            prior
        };

        info!("Queued {} for message {}", kind.label(), id.as_str());

        let dispatchable = self.ledger.enqueue(PendingAction::new(id.clone(), kind, prior));
        if dispatchable && self.work_tx.send(WorkItem::Process(id.clone())).is_err() {
            warn!("Action worker gone; {} will not reach the server", kind.label());
        }

        let _ = self.events.send(MailEvent::MessageUpdated {
            message_id: id.clone(),
        });
        Ok(())
    }

    /// Whether a message has unresolved actions
    pub fn has_pending(&self, id: &MessageId) -> bool {
        self.ledger.has_pending(id)
    }

    /// Stop the worker, waiting up to `timeout` for in-flight work
    pub fn shutdown(&self, timeout: Duration) {
        let _ = self.work_tx.send(WorkItem::Shutdown);
        let Some(handle) = self.handle.lock().unwrap().take() else {
            return;
        };

        let deadline = std::time::Instant::now() + timeout;
        while !handle.is_finished() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            warn!("Action dispatcher did not stop within {:?}; detaching", timeout);
        }
    }
}

/// Worker-side state; everything the dispatch thread needs
struct Worker {
    transport: Arc<dyn MailTransport>,
    store: Arc<dyn MailStore>,
    ledger: Arc<ActionLedger>,
    events: Sender<MailEvent>,
    config: DispatcherConfig,
}

impl Worker {
    /// Drain a message's action queue head-first. Stops early on failure:
    /// the rollback invalidates everything queued behind the failed action.
    fn process(&self, id: &MessageId) {
        while let Some(action) = self.ledger.front(id) {
            self.ledger.update_front(id, |a| a.mark_in_flight());

            match self.attempt(id, action.kind) {
                Ok(()) => {
                    info!("Confirmed {} for message {}", action.kind.label(), id.as_str());
                    if !self.ledger.resolve_front(id) {
                        break;
                    }
                }
                Err(err) => {
                    self.fail(id, &action, &err);
                    break;
                }
            }
        }
    }

    /// Try the action up to `max_retries` times. Only transient (network)
    /// failures are retried; auth and protocol failures fail immediately.
    fn attempt(&self, id: &MessageId, kind: ActionKind) -> Result<()> {
        let mut delay = self.config.retry_base;
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 0..max_attempts {
            match self.transport.apply_action(id, kind) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let transient = client_error(&err).is_some_and(|c| c.is_transient());
                    let last = attempt + 1 >= max_attempts;
                    if !transient || last {
                        return Err(err);
                    }
                    warn!(
                        "{} for {} failed (attempt {}), retrying: {}",
                        kind.label(),
                        id.as_str(),
                        attempt + 1,
                        err
                    );
                    self.ledger.update_front(id, |a| a.record_retry());
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }

        unreachable!("attempt loop always returns")
    }

    /// Roll back the optimistic mutation, abandon the message's queue, and
    /// surface exactly one failure event
    fn fail(&self, id: &MessageId, action: &PendingAction, err: &anyhow::Error) {
        warn!(
            "{} for {} failed permanently, rolling back: {}",
            action.kind.label(),
            id.as_str(),
            err
        );
        self.ledger.update_front(id, |a| a.mark_failed());

        if let Err(rollback_err) = self.rollback(id, &action.prior) {
            warn!("Rollback for {} failed: {}", id.as_str(), rollback_err);
        }

        self.ledger.abandon(id);

        let _ = self.events.send(MailEvent::ActionFailed {
            message_id: id.clone(),
            kind: action.kind,
            message: err.to_string(),
        });
        let _ = self.events.send(MailEvent::MessageUpdated {
            message_id: id.clone(),
        });
        if client_error(err).is_some_and(|c| c.is_auth()) {
            let _ = self.events.send(MailEvent::AuthRequired);
        }
    }

    /// Restore the cache state captured before the optimistic mutation.
    /// A message dropped by a later sync has nothing left to restore.
    fn rollback(&self, id: &MessageId, prior: &PriorState) -> Result<()> {
        if !self.store.has_message(id)? {
            return Ok(());
        }
        match prior {
            PriorState::Flags {
                is_read,
                is_starred,
            } => self.store.set_flags(id, Some(*is_read), Some(*is_starred)),
            PriorState::Placement { mailbox_id } => self.store.restore_to_folder(id, mailbox_id),
        }
    }
}
