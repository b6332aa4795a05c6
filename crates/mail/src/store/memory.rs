//! In-memory cache store implementation
//!
//! All state lives behind a single `RwLock`, which is the serialization
//! point required of cache mutations: the sync coordinator and action
//! dispatcher both go through it, and readers get a consistent snapshot
//! of the folder index and message storage together. The cache is
//! rebuilt from the server on startup; nothing here touches disk.
//!
//! Budget accounting: only messages in `BodyState::Cached` count against
//! `max_bodies`. Header metadata is lightweight and uncounted. Eviction
//! degrades the least-recently-accessed body to `HeaderOnly` rather than
//! dropping the message, so list navigation stays responsive.

use anyhow::Result;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::RwLock;

use super::MailStore;
use crate::error::CacheError;
use crate::models::{
    BodyState, Mailbox, MailboxId, MailboxRole, Message, MessageId, sort_mailboxes,
};

struct CacheInner {
    mailboxes: HashMap<String, Mailbox>,
    messages: HashMap<String, Message>,
    /// Per-folder ordered id index, received-time descending
    folders: HashMap<String, Vec<String>>,
    /// Opaque per-folder sync cursors
    cursors: HashMap<String, String>,
    /// Last-access stamps for body eviction (view/open time, not insertion)
    access: HashMap<String, u64>,
    clock: u64,
}

impl CacheInner {
    fn new() -> Self {
        Self {
            mailboxes: HashMap::new(),
            messages: HashMap::new(),
            folders: HashMap::new(),
            cursors: HashMap::new(),
            access: HashMap::new(),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Re-sort a folder index to received-time descending (ties broken by
    /// id for determinism). Matches the server's `receivedAt desc` sort.
    fn resort_folder(&mut self, mailbox_id: &str) {
        if let Some(mut ids) = self.folders.remove(mailbox_id) {
            ids.sort_by(|a, b| {
                let key = |id: &String| {
                    let received = self
                        .messages
                        .get(id)
                        .map(|m| m.received_at)
                        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
                    (Reverse(received), id.clone())
                };
                key(a).cmp(&key(b))
            });
            self.folders.insert(mailbox_id.to_string(), ids);
        }
    }

    /// Merge an incoming message, preserving locally cached content the
    /// server response doesn't carry (body, body state, summary).
    fn merge_message(&mut self, mut incoming: Message) {
        if let Some(existing) = self.messages.get(&incoming.id.0) {
            incoming.body = existing.body.clone();
            incoming.body_state = existing.body_state;
            incoming.summary = existing.summary.clone();
        }
        self.messages.insert(incoming.id.0.clone(), incoming);
    }

    /// Degrade least-recently-accessed bodies until the budget holds.
    /// Returns the evicted ids.
    fn enforce_budget(&mut self, max_bodies: usize) -> Vec<MessageId> {
        let mut evicted = Vec::new();
        loop {
            let cached: Vec<&String> = self
                .messages
                .values()
                .filter(|m| m.body_state == BodyState::Cached)
                .map(|m| &m.id.0)
                .collect();
            if cached.len() <= max_bodies {
                break;
            }

            let victim = cached
                .into_iter()
                .min_by_key(|id| self.access.get(*id).copied().unwrap_or(0))
                .cloned();
            let Some(victim) = victim else { break };

            if let Some(msg) = self.messages.get_mut(&victim) {
                msg.body = None;
                msg.body_state = BodyState::HeaderOnly;
            }
            evicted.push(MessageId::new(victim));
        }
        evicted
    }

    /// Drop message records entirely (metadata, body, access stamp, and
    /// any folder index entries).
    fn drop_messages(&mut self, ids: &[MessageId]) {
        for id in ids {
            self.messages.remove(&id.0);
            self.access.remove(&id.0);
            for index in self.folders.values_mut() {
                index.retain(|entry| entry != &id.0);
            }
        }
    }
}

/// In-memory implementation of [`MailStore`]
pub struct InMemoryMailStore {
    inner: RwLock<CacheInner>,
    max_bodies: usize,
}

impl InMemoryMailStore {
    /// Create a new empty store with the given body budget
    /// (`cache.max_messages` in configuration)
    pub fn new(max_bodies: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::new()),
            max_bodies,
        }
    }
}

impl MailStore for InMemoryMailStore {
    fn upsert_mailboxes(&self, mailboxes: Vec<Mailbox>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        for mailbox in mailboxes {
            inner.mailboxes.insert(mailbox.id.0.clone(), mailbox);
        }
        Ok(())
    }

    fn list_mailboxes(&self) -> Result<Vec<Mailbox>> {
        let inner = self.inner.read().unwrap();
        Ok(sort_mailboxes(inner.mailboxes.values().cloned().collect()))
    }

    fn get_mailbox(&self, id: &MailboxId) -> Result<Option<Mailbox>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.mailboxes.get(&id.0).cloned())
    }

    fn find_mailbox_by_role(&self, role: MailboxRole) -> Result<Option<Mailbox>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .mailboxes
            .values()
            .find(|m| m.role == Some(role))
            .cloned())
    }

    fn upsert_messages(&self, mailbox_id: &MailboxId, messages: Vec<Message>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        for mut message in messages {
            message.mailbox_id = mailbox_id.clone();
            let id = message.id.0.clone();

            // If the message moved folders, detach it from the old index
            if let Some(existing) = inner.messages.get(&id)
                && existing.mailbox_id != *mailbox_id
            {
                let old = existing.mailbox_id.0.clone();
                if let Some(index) = inner.folders.get_mut(&old) {
                    index.retain(|entry| entry != &id);
                }
            }

            inner.merge_message(message);

            let index = inner.folders.entry(mailbox_id.0.clone()).or_default();
            if !index.contains(&id) {
                index.push(id);
            }
        }
        inner.resort_folder(&mailbox_id.0);
        Ok(())
    }

    fn replace_folder(&self, mailbox_id: &MailboxId, messages: Vec<Message>) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        let new_ids: Vec<String> = messages.iter().map(|m| m.id.0.clone()).collect();

        // Messages that fell out of the listing are gone from the cache
        let stale: Vec<MessageId> = inner
            .folders
            .get(&mailbox_id.0)
            .map(|index| {
                index
                    .iter()
                    .filter(|id| !new_ids.contains(id))
                    .map(|id| MessageId::new(id))
                    .collect()
            })
            .unwrap_or_default();
        inner.drop_messages(&stale);

        for mut message in messages {
            message.mailbox_id = mailbox_id.clone();
            inner.merge_message(message);
        }

        // Server-provided order, verbatim
        inner.folders.insert(mailbox_id.0.clone(), new_ids);
        Ok(())
    }

    fn remove_messages(&self, ids: &[MessageId]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.drop_messages(ids);
        Ok(())
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.messages.get(&id.0).cloned())
    }

    fn has_message(&self, id: &MessageId) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.messages.contains_key(&id.0))
    }

    fn list_folder(&self, mailbox_id: &MailboxId) -> Result<Vec<MessageId>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .folders
            .get(&mailbox_id.0)
            .map(|index| index.iter().map(MessageId::new).collect())
            .unwrap_or_default())
    }

    fn folder_messages(&self, mailbox_id: &MailboxId) -> Result<Vec<Message>> {
        let inner = self.inner.read().unwrap();
        let Some(index) = inner.folders.get(&mailbox_id.0) else {
            return Ok(Vec::new());
        };

        let mut result = Vec::with_capacity(index.len());
        for id in index {
            match inner.messages.get(id) {
                Some(msg) => result.push(msg.clone()),
                None => {
                    return Err(CacheError::InvariantViolation {
                        folder: mailbox_id.0.clone(),
                        message: id.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(result)
    }

    fn all_messages(&self) -> Result<Vec<Message>> {
        let inner = self.inner.read().unwrap();
        let mut messages: Vec<Message> = inner.messages.values().cloned().collect();
        messages.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(messages)
    }

    fn set_cursor(&self, mailbox_id: &MailboxId, cursor: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.cursors.insert(mailbox_id.0.clone(), cursor.to_string());
        Ok(())
    }

    fn get_cursor(&self, mailbox_id: &MailboxId) -> Result<Option<String>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.cursors.get(&mailbox_id.0).cloned())
    }

    fn clear_cursor(&self, mailbox_id: &MailboxId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.cursors.remove(&mailbox_id.0);
        Ok(())
    }

    fn admit_body(&self, id: &MessageId, body: String) -> Result<Vec<MessageId>> {
        let mut inner = self.inner.write().unwrap();

        if !inner.messages.contains_key(&id.0) {
            return Err(CacheError::UnknownMessage(id.0.clone()).into());
        }

        let stamp = inner.tick();
        inner.access.insert(id.0.clone(), stamp);
        if let Some(msg) = inner.messages.get_mut(&id.0) {
            msg.body = Some(body);
            msg.body_state = BodyState::Cached;
        }

        Ok(inner.enforce_budget(self.max_bodies))
    }

    fn touch(&self, id: &MessageId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.messages.contains_key(&id.0) {
            let stamp = inner.tick();
            inner.access.insert(id.0.clone(), stamp);
        }
        Ok(())
    }

    fn cached_body_count(&self) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .messages
            .values()
            .filter(|m| m.body_state == BodyState::Cached)
            .count())
    }

    fn set_flags(
        &self,
        id: &MessageId,
        is_read: Option<bool>,
        is_starred: Option<bool>,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let msg = inner
            .messages
            .get_mut(&id.0)
            .ok_or_else(|| CacheError::UnknownMessage(id.0.clone()))?;
        if let Some(read) = is_read {
            msg.is_read = read;
        }
        if let Some(starred) = is_starred {
            msg.is_starred = starred;
        }
        Ok(())
    }

    fn set_summary(&self, id: &MessageId, summary: String) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let msg = inner
            .messages
            .get_mut(&id.0)
            .ok_or_else(|| CacheError::UnknownMessage(id.0.clone()))?;
        msg.summary = Some(summary);
        Ok(())
    }

    fn remove_from_folder(&self, id: &MessageId) -> Result<MailboxId> {
        let mut inner = self.inner.write().unwrap();
        let mailbox_id = inner
            .messages
            .get(&id.0)
            .map(|m| m.mailbox_id.clone())
            .ok_or_else(|| CacheError::UnknownMessage(id.0.clone()))?;

        if let Some(index) = inner.folders.get_mut(&mailbox_id.0) {
            index.retain(|entry| entry != &id.0);
        }
        Ok(mailbox_id)
    }

    fn restore_to_folder(&self, id: &MessageId, mailbox_id: &MailboxId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.messages.contains_key(&id.0) {
            return Err(CacheError::UnknownMessage(id.0.clone()).into());
        }

        if let Some(msg) = inner.messages.get_mut(&id.0) {
            msg.mailbox_id = mailbox_id.clone();
        }
        let index = inner.folders.entry(mailbox_id.0.clone()).or_default();
        if !index.contains(&id.0) {
            index.push(id.0.clone());
        }
        inner.resort_folder(&mailbox_id.0);
        Ok(())
    }

    fn message_count(&self) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner.messages.len())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        *inner = CacheInner::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn make_message(id: &str, mailbox: &str, age_hours: i64) -> Message {
        Message::builder(MessageId::new(id), MailboxId::new(mailbox))
            .from(crate::models::EmailAddress::with_name(
                "Test User",
                "test@example.com",
            ))
            .subject(format!("Subject {}", id))
            .preview(format!("Preview for {}", id))
            .received_at(Utc::now() - Duration::hours(age_hours))
            .build()
    }

    fn inbox() -> MailboxId {
        MailboxId::new("mb-inbox")
    }

    #[test]
    fn test_upsert_orders_by_received_desc() {
        let store = InMemoryMailStore::new(10);
        store
            .upsert_messages(
                &inbox(),
                vec![
                    make_message("m2", "mb-inbox", 2),
                    make_message("m1", "mb-inbox", 1),
                    make_message("m3", "mb-inbox", 3),
                ],
            )
            .unwrap();

        let ids = store.list_folder(&inbox()).unwrap();
        let ids: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn test_upsert_overwrites_flags_but_keeps_body() {
        let store = InMemoryMailStore::new(10);
        store
            .upsert_messages(&inbox(), vec![make_message("m1", "mb-inbox", 1)])
            .unwrap();
        store
            .admit_body(&MessageId::new("m1"), "hello world".to_string())
            .unwrap();

        let mut updated = make_message("m1", "mb-inbox", 1);
        updated.is_read = true;
        store.upsert_messages(&inbox(), vec![updated]).unwrap();

        let msg = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert!(msg.is_read);
        assert_eq!(msg.body_state, BodyState::Cached);
        assert_eq!(msg.body.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_index_and_storage_stay_consistent() {
        let store = InMemoryMailStore::new(10);
        store
            .upsert_messages(
                &inbox(),
                vec![make_message("m1", "mb-inbox", 1), make_message("m2", "mb-inbox", 2)],
            )
            .unwrap();
        store.remove_messages(&[MessageId::new("m1")]).unwrap();

        let ids = store.list_folder(&inbox()).unwrap();
        assert_eq!(ids.len(), 1);
        let messages = store.folder_messages(&inbox()).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.as_str(), "m2");
        assert!(!store.has_message(&MessageId::new("m1")).unwrap());
    }

    #[test]
    fn test_body_budget_evicts_least_recently_accessed() {
        let store = InMemoryMailStore::new(2);
        store
            .upsert_messages(
                &inbox(),
                vec![
                    make_message("m1", "mb-inbox", 1),
                    make_message("m2", "mb-inbox", 2),
                    make_message("m3", "mb-inbox", 3),
                ],
            )
            .unwrap();

        store.admit_body(&MessageId::new("m1"), "b1".into()).unwrap();
        store.admit_body(&MessageId::new("m2"), "b2".into()).unwrap();
        let evicted = store.admit_body(&MessageId::new("m3"), "b3".into()).unwrap();

        assert_eq!(evicted, vec![MessageId::new("m1")]);
        assert_eq!(store.cached_body_count().unwrap(), 2);

        let m1 = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(m1.body_state, BodyState::HeaderOnly);
        assert!(m1.body.is_none());

        let m2 = store.get_message(&MessageId::new("m2")).unwrap().unwrap();
        assert_eq!(m2.body_state, BodyState::Cached);
    }

    #[test]
    fn test_touch_changes_eviction_order() {
        let store = InMemoryMailStore::new(2);
        store
            .upsert_messages(
                &inbox(),
                vec![
                    make_message("m1", "mb-inbox", 1),
                    make_message("m2", "mb-inbox", 2),
                    make_message("m3", "mb-inbox", 3),
                ],
            )
            .unwrap();

        store.admit_body(&MessageId::new("m1"), "b1".into()).unwrap();
        store.admit_body(&MessageId::new("m2"), "b2".into()).unwrap();
        // Re-view m1, making m2 the LRU victim
        store.touch(&MessageId::new("m1")).unwrap();
        let evicted = store.admit_body(&MessageId::new("m3"), "b3".into()).unwrap();

        assert_eq!(evicted, vec![MessageId::new("m2")]);
    }

    #[test]
    fn test_evicted_message_readmitted_fresh() {
        let store = InMemoryMailStore::new(1);
        store
            .upsert_messages(
                &inbox(),
                vec![make_message("m1", "mb-inbox", 1), make_message("m2", "mb-inbox", 2)],
            )
            .unwrap();

        store.admit_body(&MessageId::new("m1"), "old".into()).unwrap();
        store.admit_body(&MessageId::new("m2"), "b2".into()).unwrap();
        assert_eq!(
            store
                .get_message(&MessageId::new("m1"))
                .unwrap()
                .unwrap()
                .body_state,
            BodyState::HeaderOnly
        );

        // Same identifier, freshly fetched data
        store.admit_body(&MessageId::new("m1"), "new".into()).unwrap();
        let m1 = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(m1.body.as_deref(), Some("new"));
    }

    #[test]
    fn test_replace_folder_keeps_surviving_bodies() {
        let store = InMemoryMailStore::new(10);
        store
            .upsert_messages(
                &inbox(),
                vec![make_message("m1", "mb-inbox", 1), make_message("m2", "mb-inbox", 2)],
            )
            .unwrap();
        store.admit_body(&MessageId::new("m1"), "kept".into()).unwrap();

        // Full resync: m2 fell out of the listing, m3 is new
        store
            .replace_folder(
                &inbox(),
                vec![make_message("m1", "mb-inbox", 1), make_message("m3", "mb-inbox", 3)],
            )
            .unwrap();

        let ids = store.list_folder(&inbox()).unwrap();
        let ids: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
        assert!(!store.has_message(&MessageId::new("m2")).unwrap());

        let m1 = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(m1.body.as_deref(), Some("kept"));
    }

    #[test]
    fn test_remove_and_restore_folder_placement() {
        let store = InMemoryMailStore::new(10);
        store
            .upsert_messages(
                &inbox(),
                vec![make_message("m1", "mb-inbox", 1), make_message("m2", "mb-inbox", 2)],
            )
            .unwrap();

        let from = store.remove_from_folder(&MessageId::new("m2")).unwrap();
        assert_eq!(from, inbox());
        assert_eq!(store.list_folder(&inbox()).unwrap().len(), 1);
        // Still in storage for rollback
        assert!(store.has_message(&MessageId::new("m2")).unwrap());

        store.restore_to_folder(&MessageId::new("m2"), &from).unwrap();
        let ids = store.list_folder(&inbox()).unwrap();
        let ids: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn test_cursor_round_trip() {
        let store = InMemoryMailStore::new(10);
        assert!(store.get_cursor(&inbox()).unwrap().is_none());

        store.set_cursor(&inbox(), "state-1").unwrap();
        assert_eq!(store.get_cursor(&inbox()).unwrap().as_deref(), Some("state-1"));

        store.set_cursor(&inbox(), "state-2").unwrap();
        assert_eq!(store.get_cursor(&inbox()).unwrap().as_deref(), Some("state-2"));

        store.clear_cursor(&inbox()).unwrap();
        assert!(store.get_cursor(&inbox()).unwrap().is_none());
    }

    #[test]
    fn test_mailbox_listing_sorted() {
        let store = InMemoryMailStore::new(10);
        store
            .upsert_mailboxes(vec![
                Mailbox::new("u1", "Receipts"),
                Mailbox::new("i", "Inbox").with_role(MailboxRole::Inbox),
                Mailbox::new("t", "Trash").with_role(MailboxRole::Trash),
            ])
            .unwrap();

        let mailboxes = store.list_mailboxes().unwrap();
        assert_eq!(mailboxes[0].display_name(), "Inbox");
        assert_eq!(mailboxes[1].display_name(), "Trash");
        assert_eq!(mailboxes[2].display_name(), "Receipts");

        let found = store.find_mailbox_by_role(MailboxRole::Inbox).unwrap();
        assert_eq!(found.unwrap().id.as_str(), "i");
    }
}
