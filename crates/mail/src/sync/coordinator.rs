//! Background sync coordinator
//!
//! One worker thread owns all folder syncs, so at most one sync per
//! folder (indeed, one sync total) runs at a time and cache writes from
//! the sync path are naturally serialized. Watched folders refresh on an
//! interval; manual refreshes bypass the interval and any failure
//! backoff. An authentication failure halts the coordinator until the
//! process reconnects with fresh credentials.

use chrono::{DateTime, Utc};
use crossbeam_channel::{RecvTimeoutError, Sender, unbounded};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::mailbox::{SyncOptions, sync_mailbox};
use super::timing::{backoff_delay, cooldown_elapsed};
use crate::actions::ActionLedger;
use crate::error::client_error;
use crate::events::MailEvent;
use crate::jmap::MailTransport;
use crate::models::MailboxId;
use crate::store::MailStore;

/// Scheduling parameters for the background worker
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Seconds between automatic refreshes of a watched folder
    pub refresh_interval_secs: u64,
    /// Consecutive failures tolerated before backoff kicks in
    pub backoff_after_failures: u32,
    /// Upper bound on the backoff delay, in seconds
    pub backoff_cap_secs: u64,
    /// Per-sync fetch limits
    pub options: SyncOptions,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            backoff_after_failures: 3,
            backoff_cap_secs: 300,
            options: SyncOptions {
                max_messages: 500,
                page_size: 50,
            },
        }
    }
}

/// Where a folder is in its sync lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderSyncState {
    Idle,
    Syncing,
    Failed,
}

/// Per-folder sync status, readable from any thread
#[derive(Debug, Clone)]
pub struct FolderStatus {
    pub state: FolderSyncState,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl Default for FolderStatus {
    fn default() -> Self {
        Self {
            state: FolderSyncState::Idle,
            last_synced_at: None,
            consecutive_failures: 0,
            last_attempt_at: None,
        }
    }
}

enum Command {
    Refresh(MailboxId),
    Watch(MailboxId),
    Unwatch(MailboxId),
    Shutdown,
}

/// Handle to the background sync worker
pub struct SyncCoordinator {
    control: Sender<Command>,
    status: Arc<Mutex<HashMap<String, FolderStatus>>>,
    halted: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    /// Spawn the worker thread
    pub fn new(
        transport: Arc<dyn MailTransport>,
        store: Arc<dyn MailStore>,
        ledger: Arc<ActionLedger>,
        events: Sender<MailEvent>,
        config: CoordinatorConfig,
    ) -> Self {
        let (control_tx, control_rx) = unbounded::<Command>();
        let status: Arc<Mutex<HashMap<String, FolderStatus>>> = Arc::default();
        let halted = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            transport,
            store,
            ledger,
            events,
            config,
            status: status.clone(),
            halted: halted.clone(),
            watched: Vec::new(),
        };
        let handle = std::thread::Builder::new()
            .name("sync-coordinator".to_string())
            .spawn(move || worker.run(control_rx))
            .expect("failed to spawn sync coordinator thread");

        Self {
            control: control_tx,
            status,
            halted,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Start watching a folder: syncs immediately, then on the refresh
    /// interval
    pub fn watch(&self, mailbox_id: &MailboxId) {
        let _ = self.control.send(Command::Watch(mailbox_id.clone()));
    }

    /// Stop the periodic refresh for a folder; its cache stays intact
    pub fn unwatch(&self, mailbox_id: &MailboxId) {
        let _ = self.control.send(Command::Unwatch(mailbox_id.clone()));
    }

    /// Request an immediate sync, bypassing the refresh interval and any
    /// failure backoff
    pub fn refresh(&self, mailbox_id: &MailboxId) {
        let _ = self.control.send(Command::Refresh(mailbox_id.clone()));
    }

    /// Current status of a folder
    pub fn status(&self, mailbox_id: &MailboxId) -> FolderStatus {
        self.status
            .lock()
            .unwrap()
            .get(mailbox_id.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Whether background sync is halted pending re-authentication
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Stop the worker, waiting up to `timeout` for an in-flight sync
    pub fn shutdown(&self, timeout: Duration) {
        let _ = self.control.send(Command::Shutdown);
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
            warn!("Sync coordinator did not stop within {:?}; detaching", timeout);
        }
    }
}

/// Worker-thread state
struct Worker {
    transport: Arc<dyn MailTransport>,
    store: Arc<dyn MailStore>,
    ledger: Arc<ActionLedger>,
    events: Sender<MailEvent>,
    config: CoordinatorConfig,
    status: Arc<Mutex<HashMap<String, FolderStatus>>>,
    halted: Arc<AtomicBool>,
    watched: Vec<MailboxId>,
}

impl Worker {
    /// Control loop: commands preempt the tick; the tick drives interval
    /// refreshes of watched folders
    fn run(mut self, control: crossbeam_channel::Receiver<Command>) {
        let tick = Duration::from_millis(500);
        loop {
            match control.recv_timeout(tick) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(Command::Watch(id)) => {
                    if !self.watched.contains(&id) {
                        self.watched.push(id.clone());
                    }
                    self.run_sync(&id);
                }
                Ok(Command::Unwatch(id)) => {
                    self.watched.retain(|w| w != &id);
                }
                Ok(Command::Refresh(id)) => self.run_sync(&id),
                Err(RecvTimeoutError::Timeout) => {
                    for id in self.watched.clone() {
                        if self.due(&id) {
                            self.run_sync(&id);
                        }
                    }
                }
            }
        }
        debug!("Sync coordinator stopped");
    }

    /// Whether a watched folder's next automatic sync is due, accounting
    /// for failure backoff
    fn due(&self, mailbox_id: &MailboxId) -> bool {
        let status = self
            .status
            .lock()
            .unwrap()
            .get(mailbox_id.as_str())
            .cloned()
            .unwrap_or_default();

        let extra = backoff_delay(
            status
                .consecutive_failures
                .saturating_sub(self.config.backoff_after_failures.saturating_sub(1)),
            self.config.refresh_interval_secs,
            self.config.backoff_cap_secs,
        );
        let wait_secs = self.config.refresh_interval_secs + extra.as_secs();
        cooldown_elapsed(status.last_attempt_at, wait_secs)
    }

    fn set_status(&self, mailbox_id: &MailboxId, f: impl FnOnce(&mut FolderStatus)) {
        let mut statuses = self.status.lock().unwrap();
        f(statuses.entry(mailbox_id.0.clone()).or_default());
    }

    fn run_sync(&self, mailbox_id: &MailboxId) {
        if self.halted.load(Ordering::SeqCst) {
            debug!("Sync halted pending re-authentication; skipping {}", mailbox_id.as_str());
            return;
        }

        self.set_status(mailbox_id, |s| s.state = FolderSyncState::Syncing);
        let deferred = self.ledger.deferred_ids();

        match sync_mailbox(
            self.transport.as_ref(),
            self.store.as_ref(),
            mailbox_id,
            &deferred,
            &self.config.options,
        ) {
            Ok(stats) => {
                let now = Utc::now();
                self.set_status(mailbox_id, |s| {
                    s.state = FolderSyncState::Idle;
                    s.last_synced_at = Some(now);
                    s.last_attempt_at = Some(now);
                    s.consecutive_failures = 0;
                });
                let _ = self.events.send(MailEvent::FolderSynced {
                    mailbox_id: mailbox_id.clone(),
                    stats,
                });
            }
            Err(err) => {
                let class = client_error(&err);
                let is_auth = class.is_some_and(|c| c.is_auth());
                let transient = class.is_some_and(|c| c.is_transient());

                warn!("Sync of {} failed: {}", mailbox_id.as_str(), err);
                self.set_status(mailbox_id, |s| {
                    s.state = FolderSyncState::Failed;
                    s.last_attempt_at = Some(Utc::now());
                    s.consecutive_failures += 1;
                });

                if is_auth {
                    info!("Authentication rejected; halting background sync");
                    self.halted.store(true, Ordering::SeqCst);
                    let _ = self.events.send(MailEvent::AuthRequired);
                } else {
                    let _ = self.events.send(MailEvent::SyncFailed {
                        mailbox_id: mailbox_id.clone(),
                        transient,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
