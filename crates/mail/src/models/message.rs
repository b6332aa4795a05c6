//! Message model representing a cached email

use super::MailboxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (server-assigned JMAP Email id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an email address from a string like "John Doe <john@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        Self {
            name: None,
            email: s.to_string(),
        }
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }

    /// Short display form: the name, or the local part of the address
    pub fn short_display(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .email
                .split('@')
                .next()
                .unwrap_or(&self.email)
                .to_string(),
        }
    }
}

/// How much of a message's content the cache currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyState {
    /// Body has never been fetched
    NotFetched,
    /// Body was fetched once but has been evicted; metadata retained
    HeaderOnly,
    /// Full body is resident and counts against the cache budget
    Cached,
}

/// A cached email message
///
/// Identity is stable for the lifetime of the process: once evicted, a
/// message may be re-admitted under the same identifier with freshly
/// fetched data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned message id
    pub id: MessageId,
    /// Mailbox (folder) this message currently lives in
    pub mailbox_id: MailboxId,
    /// JMAP thread id
    pub thread_id: String,
    /// Sender's email address
    pub from: EmailAddress,
    /// Recipients (To field)
    pub to: Vec<EmailAddress>,
    /// CC recipients
    pub cc: Vec<EmailAddress>,
    /// Subject line
    pub subject: String,
    /// Plain text preview of the body (capped during normalization)
    pub preview: String,
    /// When the message was received
    pub received_at: DateTime<Utc>,
    /// Message size in bytes, as reported by the server
    pub size: u64,
    /// `$seen` keyword
    pub is_read: bool,
    /// `$flagged` keyword
    pub is_starred: bool,
    /// Body residency state
    pub body_state: BodyState,
    /// Full plain-text body, present only when `body_state == Cached`
    pub body: Option<String>,
    /// AI-generated summary attached by the summarization collaborator.
    /// Display metadata only; never synced back to the server.
    pub summary: Option<String>,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: MessageId, mailbox_id: MailboxId) -> MessageBuilder {
        MessageBuilder::new(id, mailbox_id)
    }

    /// Whether the full body is resident in the cache
    pub fn has_body(&self) -> bool {
        self.body_state == BodyState::Cached
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    mailbox_id: MailboxId,
    thread_id: String,
    from: Option<EmailAddress>,
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    subject: String,
    preview: String,
    received_at: Option<DateTime<Utc>>,
    size: u64,
    is_read: bool,
    is_starred: bool,
}

impl MessageBuilder {
    fn new(id: MessageId, mailbox_id: MailboxId) -> Self {
        Self {
            id,
            mailbox_id,
            thread_id: String::new(),
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            subject: String::new(),
            preview: String::new(),
            received_at: None,
            size: 0,
            is_read: false,
            is_starred: false,
        }
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    pub fn from(mut self, from: EmailAddress) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.to = to;
        self
    }

    pub fn cc(mut self, cc: Vec<EmailAddress>) -> Self {
        self.cc = cc;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = preview.into();
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn read(mut self, is_read: bool) -> Self {
        self.is_read = is_read;
        self
    }

    pub fn starred(mut self, is_starred: bool) -> Self {
        self.is_starred = is_starred;
        self
    }

    pub fn build(self) -> Message {
        Message {
            thread_id: if self.thread_id.is_empty() {
                self.id.0.clone()
            } else {
                self.thread_id
            },
            id: self.id,
            mailbox_id: self.mailbox_id,
            from: self
                .from
                .unwrap_or_else(|| EmailAddress::new("unknown@unknown.invalid")),
            to: self.to,
            cc: self.cc,
            subject: self.subject,
            preview: self.preview,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            size: self.size,
            is_read: self.is_read,
            is_starred: self.is_starred,
            body_state: BodyState::NotFetched,
            body: None,
            summary: None,
        }
    }
}
