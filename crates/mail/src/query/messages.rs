//! Read-side queries over the cache
//!
//! Queries never touch the network and never mutate; they read whatever
//! consistent state the store currently holds. List results are shaped
//! for direct display.

use anyhow::Result;

use crate::models::{BodyState, Mailbox, MailboxId, Message, MessageId};
use crate::store::MailStore;

/// A message row shaped for list display
#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub id: MessageId,
    pub mailbox_id: MailboxId,
    pub subject: String,
    /// Sender display name, falling back to the address's local part
    pub from: String,
    pub preview: String,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    /// Whether the full body is resident (opens without a fetch)
    pub has_body: bool,
    pub summary: Option<String>,
}

impl MessageSummary {
    fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            mailbox_id: message.mailbox_id.clone(),
            subject: message.subject.clone(),
            from: message.from.short_display(),
            preview: message.preview.clone(),
            received_at: message.received_at,
            is_read: message.is_read,
            is_starred: message.is_starred,
            has_body: message.body_state == BodyState::Cached,
            summary: message.summary.clone(),
        }
    }
}

/// What a search runs over
#[derive(Debug, Clone)]
pub enum SearchScope {
    /// One folder's listing, in folder order
    Folder(MailboxId),
    /// Every cached message, newest first
    AllCached,
}

/// List all folders, system folders first
pub fn list_mailboxes(store: &dyn MailStore) -> Result<Vec<Mailbox>> {
    store.list_mailboxes()
}

/// List a folder's messages in received-time-descending order
pub fn list_folder(store: &dyn MailStore, mailbox_id: &MailboxId) -> Result<Vec<MessageSummary>> {
    let messages = store.folder_messages(mailbox_id)?;
    Ok(messages.iter().map(MessageSummary::from_message).collect())
}

/// Fetch a single message with whatever body state the cache holds
pub fn get_message(store: &dyn MailStore, id: &MessageId) -> Result<Option<Message>> {
    store.get_message(id)
}

/// Case-insensitive substring search over subject, sender, preview, and
/// the body when one is cached
///
/// Searches only the cache; matches are returned in the scope's order. An
/// empty query matches nothing.
pub fn search_messages(
    store: &dyn MailStore,
    scope: &SearchScope,
    query: &str,
) -> Result<Vec<MessageSummary>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = match scope {
        SearchScope::Folder(mailbox_id) => store.folder_messages(mailbox_id)?,
        SearchScope::AllCached => store.all_messages()?,
    };

    Ok(candidates
        .iter()
        .filter(|m| matches_query(m, &needle))
        .map(MessageSummary::from_message)
        .collect())
}

fn matches_query(message: &Message, needle: &str) -> bool {
    message.subject.to_lowercase().contains(needle)
        || message.from.display().to_lowercase().contains(needle)
        || message.preview.to_lowercase().contains(needle)
        || message
            .body
            .as_deref()
            .is_some_and(|body| body.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailAddress;
    use crate::store::InMemoryMailStore;
    use chrono::{Duration, Utc};

    fn make_message(id: &str, mailbox: &str, subject: &str, from: &str, age_hours: i64) -> Message {
        Message::builder(MessageId::new(id), MailboxId::new(mailbox))
            .from(EmailAddress::parse(from))
            .subject(subject)
            .preview(format!("Preview of {}", subject))
            .received_at(Utc::now() - Duration::hours(age_hours))
            .build()
    }

    fn seeded_store() -> InMemoryMailStore {
        let store = InMemoryMailStore::new(10);
        store
            .upsert_messages(
                &MailboxId::new("mb-inbox"),
                vec![
                    make_message("m1", "mb-inbox", "Quarterly report", "Alice <alice@example.com>", 1),
                    make_message("m2", "mb-inbox", "Lunch tomorrow?", "bob@example.com", 2),
                ],
            )
            .unwrap();
        store
            .upsert_messages(
                &MailboxId::new("mb-archive"),
                vec![make_message(
                    "m3",
                    "mb-archive",
                    "Old report",
                    "Carol <carol@example.com>",
                    72,
                )],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_list_folder_summaries_in_order() {
        let store = seeded_store();
        let rows = list_folder(&store, &MailboxId::new("mb-inbox")).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id.as_str(), "m1");
        assert_eq!(rows[0].from, "Alice");
        assert_eq!(rows[1].from, "bob");
        assert!(!rows[0].has_body);
    }

    #[test]
    fn test_search_folder_scope() {
        let store = seeded_store();
        let rows = search_messages(
            &store,
            &SearchScope::Folder(MailboxId::new("mb-inbox")),
            "report",
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_str(), "m1");
    }

    #[test]
    fn test_search_all_cached_scope() {
        let store = seeded_store();
        let rows = search_messages(&store, &SearchScope::AllCached, "REPORT").unwrap();

        assert_eq!(rows.len(), 2);
        // Newest first across folders
        assert_eq!(rows[0].id.as_str(), "m1");
        assert_eq!(rows[1].id.as_str(), "m3");
    }

    #[test]
    fn test_search_matches_sender() {
        let store = seeded_store();
        let rows = search_messages(&store, &SearchScope::AllCached, "carol").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_str(), "m3");
    }

    #[test]
    fn test_search_matches_cached_body_only() {
        let store = seeded_store();
        // "deadline" appears only inside m2's body text
        store
            .admit_body(&MessageId::new("m2"), "The deadline moved to Friday.".to_string())
            .unwrap();

        let rows = search_messages(&store, &SearchScope::AllCached, "deadline").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id.as_str(), "m2");
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let store = seeded_store();
        let rows = search_messages(&store, &SearchScope::AllCached, "   ").unwrap();
        assert!(rows.is_empty());
    }
}
