//! Domain models for mail entities

mod mailbox;
mod message;
mod pending;

pub use mailbox::{Mailbox, MailboxId, MailboxRole, sort_mailboxes};
pub use message::{BodyState, EmailAddress, Message, MessageBuilder, MessageId};
pub use pending::{ActionKind, ActionStatus, PendingAction, PriorState};
