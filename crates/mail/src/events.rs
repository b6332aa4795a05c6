//! Events emitted by the background sync and action layers
//!
//! Consumers (the UI layer) receive these over a crossbeam channel and
//! re-render from the cache. Events carry identifiers, not message data;
//! the cache is the single source for display state.

use crate::models::{ActionKind, MailboxId, MessageId};
use crate::sync::SyncStats;

/// Notification from the background layers
#[derive(Debug, Clone)]
pub enum MailEvent {
    /// A folder sync completed; the cache reflects the new server state
    FolderSynced {
        mailbox_id: MailboxId,
        stats: SyncStats,
    },

    /// A folder sync failed. Transient failures are retried automatically
    /// with backoff; the cache keeps serving its last good state.
    SyncFailed {
        mailbox_id: MailboxId,
        transient: bool,
        message: String,
    },

    /// The server rejected our credentials. Background sync is halted
    /// until a reconnect with fresh credentials.
    AuthRequired,

    /// An optimistic action exhausted its retries and was rolled back
    ActionFailed {
        message_id: MessageId,
        kind: ActionKind,
        message: String,
    },

    /// A message's cached state changed (flags, placement, body, summary)
    MessageUpdated { message_id: MessageId },
}
