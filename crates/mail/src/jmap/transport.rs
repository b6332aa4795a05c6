//! Transport trait between the sync/action layers and the wire protocol
//!
//! The coordinator and dispatcher never see JMAP types; they see domain
//! models coming out of an opaque transport. Tests substitute a scripted
//! implementation.

use anyhow::Result;

use crate::models::{ActionKind, Mailbox, MailboxId, Message, MessageId};

/// Complete folder listing from a full fetch
#[derive(Debug)]
pub struct FolderSnapshot {
    /// Messages in server order (received-time descending)
    pub messages: Vec<Message>,
    /// Cursor to resume incremental sync from
    pub cursor: String,
}

/// Changes to a folder since a cursor
#[derive(Debug)]
pub struct FolderDelta {
    /// New or modified messages, with fresh metadata
    pub changed: Vec<Message>,
    /// Identifiers that left the folder (deleted or moved)
    pub removed: Vec<MessageId>,
    /// Cursor to store after applying this delta
    pub new_cursor: String,
    /// More changes remain; call again with `new_cursor`
    pub has_more: bool,
}

/// Remote mail server operations
///
/// Implementations are blocking; callers run them off the UI path. A
/// failed call must leave no partial state behind the trait.
pub trait MailTransport: Send + Sync {
    /// Fetch the full mailbox (folder) list
    fn fetch_mailboxes(&self) -> Result<Vec<Mailbox>>;

    /// Full fetch of a folder's most recent messages, up to `max_messages`,
    /// paged internally
    fn fetch_folder(
        &self,
        mailbox_id: &MailboxId,
        max_messages: usize,
        page_size: usize,
    ) -> Result<FolderSnapshot>;

    /// Incremental fetch of changes since `cursor`.
    ///
    /// Fails with [`CursorExpiredError`](super::CursorExpiredError) when the
    /// server can no longer compute changes from that cursor; the caller
    /// falls back to a full fetch.
    fn fetch_changes(&self, mailbox_id: &MailboxId, cursor: &str, page_size: usize)
    -> Result<FolderDelta>;

    /// Fetch a message's plain-text body
    fn fetch_body(&self, id: &MessageId) -> Result<String>;

    /// Apply a user action to a message on the server.
    ///
    /// Success when the server confirms the change, and also when the
    /// message no longer exists remotely (already moved or deleted);
    /// replaying a confirmed action is a no-op.
    fn apply_action(&self, id: &MessageId, kind: ActionKind) -> Result<()>;
}
