//! Pending action tracking for optimistic mutations

use super::{MailboxId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-initiated mutation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Archive,
    Delete,
    Star,
    Unstar,
    MarkRead,
    MarkUnread,
}

impl ActionKind {
    /// Human-readable name, used in failure notifications and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Delete => "delete",
            Self::Star => "star",
            Self::Unstar => "unstar",
            Self::MarkRead => "mark read",
            Self::MarkUnread => "mark unread",
        }
    }

    /// Whether the action removes the message from its current folder
    pub fn removes_from_folder(&self) -> bool {
        matches!(self, Self::Archive | Self::Delete)
    }
}

/// Lifecycle of a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Queued, waiting for dispatch (possibly behind an earlier action
    /// on the same message)
    Pending,
    /// Sent to the server, awaiting confirmation
    InFlight,
    /// Retries exhausted; about to be rolled back and reported
    Failed,
}

/// Cache state captured before an optimistic mutation, so the mutation can
/// be reverted if the server never confirms it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriorState {
    /// Flag values before a star/unstar/read/unread flip
    Flags { is_read: bool, is_starred: bool },
    /// Folder the message was removed from by an archive/delete
    Placement { mailbox_id: MailboxId },
}

/// An in-flight user mutation awaiting remote confirmation
///
/// Owned exclusively by the action dispatcher; removed on confirmed success
/// or after exhausting retries (at which point the optimistic mutation is
/// rolled back and the failure surfaces to the user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub message_id: MessageId,
    pub kind: ActionKind,
    pub created_at: DateTime<Utc>,
    pub retries: u32,
    pub status: ActionStatus,
    pub prior: PriorState,
}

impl PendingAction {
    pub fn new(message_id: MessageId, kind: ActionKind, prior: PriorState) -> Self {
        Self {
            message_id,
            kind,
            created_at: Utc::now(),
            retries: 0,
            status: ActionStatus::Pending,
            prior,
        }
    }

    /// Transition to in-flight before dispatching to the server
    pub fn mark_in_flight(&mut self) {
        self.status = ActionStatus::InFlight;
    }

    /// Record a failed attempt
    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Transition to failed after retry exhaustion
    pub fn mark_failed(&mut self) {
        self.status = ActionStatus::Failed;
    }
}
