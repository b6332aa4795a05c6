//! Cache store trait definition

use crate::models::{Mailbox, MailboxId, MailboxRole, Message, MessageId};
use anyhow::Result;

/// Trait for the bounded local mail cache
///
/// Abstracts over cache backends and provides the operations the sync
/// coordinator, action dispatcher, and query layer need. All operations
/// are synchronous and in-memory; the store performs no I/O. Mutations
/// from the sync and action paths are serialized by the implementation's
/// internal write lock.
pub trait MailStore: Send + Sync {
    // === Mailboxes ===

    /// Insert or update mailboxes (merged by id)
    fn upsert_mailboxes(&self, mailboxes: Vec<Mailbox>) -> Result<()>;

    /// List all known mailboxes, system folders first
    fn list_mailboxes(&self) -> Result<Vec<Mailbox>>;

    /// Get a mailbox by id
    fn get_mailbox(&self, id: &MailboxId) -> Result<Option<Mailbox>>;

    /// Find a mailbox by system role
    fn find_mailbox_by_role(&self, role: MailboxRole) -> Result<Option<Mailbox>>;

    // === Messages ===

    /// Merge messages into a folder (overwrites on identifier match,
    /// preserving any cached body and summary of the existing entry).
    /// The folder's ordered index is kept in received-time-descending
    /// order, matching the server's sort.
    fn upsert_messages(&self, mailbox_id: &MailboxId, messages: Vec<Message>) -> Result<()>;

    /// Replace a folder's entire ordered index with the server-provided
    /// order (full resync), preserving cached bodies for identifiers that
    /// still exist. Messages previously in the folder but absent from the
    /// new listing are dropped from the cache.
    fn replace_folder(&self, mailbox_id: &MailboxId, messages: Vec<Message>) -> Result<()>;

    /// Remove messages entirely (metadata and body); used when the server
    /// reports true deletion
    fn remove_messages(&self, ids: &[MessageId]) -> Result<()>;

    /// Get a message by id
    fn get_message(&self, id: &MessageId) -> Result<Option<Message>>;

    /// Check if a message exists
    fn has_message(&self, id: &MessageId) -> Result<bool>;

    /// Ordered message identifiers for a folder
    fn list_folder(&self, mailbox_id: &MailboxId) -> Result<Vec<MessageId>>;

    /// Ordered messages for a folder.
    ///
    /// Fails with `CacheError::InvariantViolation` if the index references
    /// a message missing from storage; that is a programming error, never
    /// silently repaired.
    fn folder_messages(&self, mailbox_id: &MailboxId) -> Result<Vec<Message>>;

    /// All cached messages across folders (for global search)
    fn all_messages(&self) -> Result<Vec<Message>>;

    // === Sync cursors ===

    /// Advance a folder's sync cursor. Monotonic per successful sync;
    /// never rolled back except via `clear_cursor` on full resync.
    fn set_cursor(&self, mailbox_id: &MailboxId, cursor: &str) -> Result<()>;

    /// Current sync cursor for a folder, if any
    fn get_cursor(&self, mailbox_id: &MailboxId) -> Result<Option<String>>;

    /// Drop a folder's cursor, forcing the next sync to be a full fetch
    fn clear_cursor(&self, mailbox_id: &MailboxId) -> Result<()>;

    // === Bodies and cache budget ===

    /// Cache a fetched body for a message, marking it `Cached` and
    /// recording an access. Enforces the body budget: if the number of
    /// `Cached` messages exceeds it, least-recently-accessed bodies are
    /// degraded to `HeaderOnly`. Returns the evicted identifiers.
    fn admit_body(&self, id: &MessageId, body: String) -> Result<Vec<MessageId>>;

    /// Record a view/open access for eviction ordering
    fn touch(&self, id: &MessageId) -> Result<()>;

    /// Number of messages currently in `Cached` body state
    fn cached_body_count(&self) -> Result<usize>;

    // === Flags and display metadata ===

    /// Update read/starred flags (None leaves a flag untouched)
    fn set_flags(&self, id: &MessageId, is_read: Option<bool>, is_starred: Option<bool>)
    -> Result<()>;

    /// Attach an AI-generated summary to a message
    fn set_summary(&self, id: &MessageId, summary: String) -> Result<()>;

    // === Optimistic placement (archive/delete) ===

    /// Detach a message from its folder index without dropping it from
    /// storage, so the mutation can be rolled back. Returns the folder it
    /// was removed from.
    fn remove_from_folder(&self, id: &MessageId) -> Result<MailboxId>;

    /// Re-attach a previously detached message to a folder (rollback path)
    fn restore_to_folder(&self, id: &MessageId, mailbox_id: &MailboxId) -> Result<()>;

    // === Misc ===

    /// Total cached messages (any body state)
    fn message_count(&self) -> Result<usize>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
