//! Mailbox (folder) model

use serde::{Deserialize, Serialize};

/// Unique identifier for a mailbox (JMAP Mailbox id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxId(pub String);

impl MailboxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MailboxId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MailboxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Well-known system mailbox roles (RFC 8621 Mailbox `role`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxRole {
    Inbox,
    Drafts,
    Sent,
    Archive,
    Spam,
    Trash,
}

impl MailboxRole {
    /// Parse a JMAP role string; "junk" is an alias Fastmail uses for spam
    pub fn parse(role: &str) -> Option<Self> {
        match role.to_ascii_lowercase().as_str() {
            "inbox" => Some(Self::Inbox),
            "drafts" => Some(Self::Drafts),
            "sent" => Some(Self::Sent),
            "archive" => Some(Self::Archive),
            "spam" | "junk" => Some(Self::Spam),
            "trash" => Some(Self::Trash),
            _ => None,
        }
    }

    /// Canonical display name for the role
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::Drafts => "Drafts",
            Self::Sent => "Sent",
            Self::Archive => "Archive",
            Self::Spam => "Spam",
            Self::Trash => "Trash",
        }
    }

    /// Display order for system mailboxes (lower = higher in the list)
    pub fn sort_order(&self) -> u32 {
        match self {
            Self::Inbox => 0,
            Self::Drafts => 1,
            Self::Sent => 2,
            Self::Archive => 3,
            Self::Spam => 4,
            Self::Trash => 5,
        }
    }
}

/// A mail folder
///
/// Created on first sync, updated on every subsequent sync, never deleted
/// while the process runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    /// Server-assigned mailbox id
    pub id: MailboxId,
    /// Raw display name from the server
    pub name: String,
    /// System role, if any
    pub role: Option<MailboxRole>,
    /// Server-provided sort order for non-system mailboxes
    pub sort_order: u32,
    /// Total message count as reported by the server
    pub total: u32,
    /// Unread message count as reported by the server
    pub unread: u32,
}

impl Mailbox {
    pub fn new(id: impl Into<MailboxId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
            sort_order: 0,
            total: 0,
            unread: 0,
        }
    }

    /// Builder method to set the role
    pub fn with_role(mut self, role: MailboxRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Builder method to set message counts
    pub fn with_counts(mut self, total: u32, unread: u32) -> Self {
        self.total = total;
        self.unread = unread;
        self
    }

    /// Whether this is a system mailbox
    pub fn is_system(&self) -> bool {
        self.role.is_some()
    }

    /// Display name: role-based canonical name, or the raw server name
    pub fn display_name(&self) -> &str {
        match self.role {
            Some(role) => role.display_name(),
            None => &self.name,
        }
    }
}

/// Sort mailboxes with system folders first in standard order,
/// then user folders by server sort order and name.
pub fn sort_mailboxes(mut mailboxes: Vec<Mailbox>) -> Vec<Mailbox> {
    mailboxes.sort_by(|a, b| {
        let key = |m: &Mailbox| match m.role {
            Some(role) => (0u8, role.sort_order(), m.name.to_lowercase()),
            None => (1u8, m.sort_order, m.name.to_lowercase()),
        };
        key(a).cmp(&key(b))
    });
    mailboxes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_junk_alias() {
        assert_eq!(MailboxRole::parse("junk"), Some(MailboxRole::Spam));
        assert_eq!(MailboxRole::parse("Spam"), Some(MailboxRole::Spam));
        assert_eq!(MailboxRole::parse("custom"), None);
    }

    #[test]
    fn test_display_name_prefers_role() {
        let mb = Mailbox::new("mb1", "INBOX.Posteingang").with_role(MailboxRole::Inbox);
        assert_eq!(mb.display_name(), "Inbox");

        let mb = Mailbox::new("mb2", "Receipts");
        assert_eq!(mb.display_name(), "Receipts");
    }

    #[test]
    fn test_sort_mailboxes_system_first() {
        let mailboxes = vec![
            Mailbox::new("u1", "Archive 2019"),
            Mailbox::new("t", "Deleted").with_role(MailboxRole::Trash),
            Mailbox::new("i", "Mail").with_role(MailboxRole::Inbox),
            Mailbox::new("u2", "Alerts"),
            Mailbox::new("s", "Outbound").with_role(MailboxRole::Sent),
        ];

        let sorted = sort_mailboxes(mailboxes);
        let names: Vec<&str> = sorted.iter().map(|m| m.display_name()).collect();
        assert_eq!(names, vec!["Inbox", "Sent", "Trash", "Alerts", "Archive 2019"]);
    }
}
