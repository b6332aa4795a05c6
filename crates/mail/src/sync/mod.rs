//! Folder synchronization: full and incremental fetches, scheduling

mod coordinator;
mod mailbox;
mod timing;

pub use coordinator::{CoordinatorConfig, FolderStatus, FolderSyncState, SyncCoordinator};
pub use mailbox::{SyncOptions, SyncStats, sync_mailbox, sync_mailboxes};
pub use timing::{backoff_delay, cooldown_elapsed};
