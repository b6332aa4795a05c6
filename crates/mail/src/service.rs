//! Mail service facade
//!
//! Wires the transport, cache, sync coordinator, and action dispatcher
//! together behind one handle. The UI layer holds a `MailService`, reads
//! through the query methods, mutates through [`MailService::perform`],
//! and re-renders on events.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::{ActionDispatcher, ActionLedger, DispatcherConfig};
use crate::config::{Credentials, MailConfig};
use crate::error::CacheError;
use crate::events::MailEvent;
use crate::jmap::{JmapClient, MailTransport};
use crate::models::{ActionKind, Mailbox, MailboxId, Message, MessageId};
use crate::query::{self, MessageSummary, SearchScope};
use crate::store::{InMemoryMailStore, MailStore};
use crate::sync::{
    CoordinatorConfig, FolderStatus, SyncCoordinator, SyncOptions, sync_mailboxes,
};

/// Top-level handle over the mail core
pub struct MailService {
    store: Arc<dyn MailStore>,
    transport: Arc<dyn MailTransport>,
    coordinator: SyncCoordinator,
    dispatcher: ActionDispatcher,
    events_rx: Receiver<MailEvent>,
    events_tx: Sender<MailEvent>,
    shutdown_timeout: Duration,
}

impl MailService {
    /// Connect to the server and bring up the background machinery.
    ///
    /// Performs session discovery and an initial mailbox-list sync before
    /// returning, so callers start with a populated folder tree.
    pub fn connect(config: &MailConfig, credentials: &Credentials) -> Result<Self> {
        let transport: Arc<dyn MailTransport> =
            Arc::new(JmapClient::connect(&config.server_url, &credentials.token)?);
        Self::with_transport(config, transport)
    }

    /// Bring up the service over an existing transport. Used by tests and
    /// alternative backends; [`MailService::connect`] is the normal path.
    pub fn with_transport(config: &MailConfig, transport: Arc<dyn MailTransport>) -> Result<Self> {
        let store: Arc<dyn MailStore> = Arc::new(InMemoryMailStore::new(config.max_messages));

        let count = sync_mailboxes(transport.as_ref(), store.as_ref())?;
        info!("Connected; {} mailboxes available", count);

        let ledger = Arc::new(ActionLedger::new());
        let (events_tx, events_rx) = unbounded();

        let dispatcher = ActionDispatcher::new(
            transport.clone(),
            store.clone(),
            ledger.clone(),
            events_tx.clone(),
            DispatcherConfig {
                max_retries: config.max_action_retries,
                ..Default::default()
            },
        );

        let coordinator = SyncCoordinator::new(
            transport.clone(),
            store.clone(),
            ledger,
            events_tx.clone(),
            CoordinatorConfig {
                refresh_interval_secs: config.refresh_interval_secs,
                backoff_after_failures: config.backoff_after_failures,
                backoff_cap_secs: config.backoff_cap_secs,
                options: SyncOptions {
                    max_messages: config.max_messages,
                    page_size: config.page_size,
                },
            },
        );

        Ok(Self {
            store,
            transport,
            coordinator,
            dispatcher,
            events_rx,
            events_tx,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Receiver for background events. Clones share one queue, so each
    /// event is delivered to exactly one of them; hand the receiver to a
    /// single consumer.
    pub fn events(&self) -> Receiver<MailEvent> {
        self.events_rx.clone()
    }

    // === Folders ===

    pub fn mailboxes(&self) -> Result<Vec<Mailbox>> {
        query::list_mailboxes(self.store.as_ref())
    }

    /// Start watching a folder: immediate sync, then periodic refresh
    pub fn watch(&self, mailbox_id: &MailboxId) {
        self.coordinator.watch(mailbox_id);
    }

    pub fn unwatch(&self, mailbox_id: &MailboxId) {
        self.coordinator.unwatch(mailbox_id);
    }

    /// Manual refresh, bypassing the refresh interval and failure backoff
    pub fn refresh(&self, mailbox_id: &MailboxId) {
        self.coordinator.refresh(mailbox_id);
    }

    pub fn sync_status(&self, mailbox_id: &MailboxId) -> FolderStatus {
        self.coordinator.status(mailbox_id)
    }

    /// Whether background sync is halted pending re-authentication
    pub fn is_halted(&self) -> bool {
        self.coordinator.is_halted()
    }

    // === Messages ===

    pub fn list_folder(&self, mailbox_id: &MailboxId) -> Result<Vec<MessageSummary>> {
        query::list_folder(self.store.as_ref(), mailbox_id)
    }

    pub fn message(&self, id: &MessageId) -> Result<Option<Message>> {
        query::get_message(self.store.as_ref(), id)
    }

    pub fn search(&self, scope: &SearchScope, text: &str) -> Result<Vec<MessageSummary>> {
        query::search_messages(self.store.as_ref(), scope, text)
    }

    /// Open a message for reading: returns it with a resident body,
    /// fetching from the server when the cache holds headers only, and
    /// marks it read.
    ///
    /// The body fetch blocks; callers on a UI thread should run this off
    /// it. Opening records a cache access, so recently read messages are
    /// the last to be evicted.
    pub fn open_message(&self, id: &MessageId) -> Result<Message> {
        let message = self
            .store
            .get_message(id)?
            .ok_or_else(|| CacheError::UnknownMessage(id.0.clone()))?;

        if !message.has_body() {
            let body = self.transport.fetch_body(id)?;
            let evicted = self.store.admit_body(id, body)?;
            for evicted_id in evicted {
                let _ = self.events_tx.send(MailEvent::MessageUpdated {
                    message_id: evicted_id,
                });
            }
        } else {
            self.store.touch(id)?;
        }

        if !message.is_read {
            self.dispatcher.submit(id, ActionKind::MarkRead)?;
        }

        self.store
            .get_message(id)?
            .ok_or_else(|| CacheError::UnknownMessage(id.0.clone()).into())
    }

    /// Body text for the summarization collaborator: served from the
    /// cache when resident, fetched otherwise. Unlike
    /// [`MailService::open_message`] this does not mark the message read.
    pub fn message_body(&self, id: &MessageId) -> Result<String> {
        let message = self
            .store
            .get_message(id)?
            .ok_or_else(|| CacheError::UnknownMessage(id.0.clone()))?;

        if let Some(body) = message.body {
            self.store.touch(id)?;
            return Ok(body);
        }

        let body = self.transport.fetch_body(id)?;
        let evicted = self.store.admit_body(id, body.clone())?;
        for evicted_id in evicted {
            let _ = self.events_tx.send(MailEvent::MessageUpdated {
                message_id: evicted_id,
            });
        }
        Ok(body)
    }

    /// Apply a user action optimistically; confirmation happens in the
    /// background and a failure arrives as [`MailEvent::ActionFailed`]
    pub fn perform(&self, id: &MessageId, kind: ActionKind) -> Result<()> {
        self.dispatcher.submit(id, kind)
    }

    /// Whether a message has actions awaiting server confirmation
    pub fn has_pending(&self, id: &MessageId) -> bool {
        self.dispatcher.has_pending(id)
    }

    /// Attach a display summary to a cached message. Local-only state;
    /// never synced to the server.
    pub fn attach_summary(&self, id: &MessageId, summary: String) -> Result<()> {
        self.store.set_summary(id, summary)?;
        let _ = self.events_tx.send(MailEvent::MessageUpdated {
            message_id: id.clone(),
        });
        Ok(())
    }

    /// Stop the background threads, waiting up to the configured timeout
    /// for in-flight work
    pub fn shutdown(&self) {
        info!("Shutting down mail service");
        self.coordinator.shutdown(self.shutdown_timeout);
        self.dispatcher.shutdown(self.shutdown_timeout);
    }
}
