//! Folder sync implementation
//!
//! A sync is incremental when the folder has a stored cursor and the
//! server can still compute changes from it; otherwise it is a full fetch
//! of the folder's most recent messages. Either way the sync is
//! idempotent: replaying the same server state leaves the cache unchanged.
//!
//! Messages with unresolved pending actions are excluded from the merge
//! wholesale. The action dispatcher owns their state until the action is
//! confirmed or rolled back; the next sync reconciles them.

use anyhow::Result;
use std::cmp::Reverse;
use std::collections::HashSet;

use crate::jmap::{CursorExpiredError, MailTransport};
use crate::models::{MailboxId, Message, MessageId};
use crate::store::MailStore;

/// Limits applied to a folder sync
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Most recent messages retained on a full fetch
    pub max_messages: usize,
    /// Page size for both full and incremental fetches
    pub page_size: usize,
}

/// Statistics from a folder sync
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Whether this was a full fetch rather than an incremental delta
    pub full_fetch: bool,
    /// Messages fetched from the server
    pub fetched: usize,
    /// Messages merged into the cache
    pub merged: usize,
    /// Messages removed from the cache
    pub removed: usize,
    /// Messages skipped because an action on them is still pending
    pub deferred: usize,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Fetch the mailbox (folder) list and merge it into the cache
///
/// Folders are created on first sight and updated in place; a folder is
/// never dropped while the process runs.
pub fn sync_mailboxes(transport: &dyn MailTransport, store: &dyn MailStore) -> Result<usize> {
    let mailboxes = transport.fetch_mailboxes()?;
    let count = mailboxes.len();
    store.upsert_mailboxes(mailboxes)?;
    log::debug!("Synced {} mailboxes", count);
    Ok(count)
}

/// Sync one folder from the server into the cache
///
/// `deferred` holds the ids of messages with unresolved pending actions;
/// server state for those ids is ignored this round.
pub fn sync_mailbox(
    transport: &dyn MailTransport,
    store: &dyn MailStore,
    mailbox_id: &MailboxId,
    deferred: &HashSet<MessageId>,
    options: &SyncOptions,
) -> Result<SyncStats> {
    let start = std::time::Instant::now();

    let mut stats = match store.get_cursor(mailbox_id)? {
        Some(cursor) => match sync_incremental(transport, store, mailbox_id, &cursor, deferred, options) {
            Ok(stats) => stats,
            Err(err) if err.downcast_ref::<CursorExpiredError>().is_some() => {
                log::info!(
                    "Cursor for folder {} expired, falling back to full fetch",
                    mailbox_id.as_str()
                );
                store.clear_cursor(mailbox_id)?;
                sync_full(transport, store, mailbox_id, deferred, options)?
            }
            Err(err) => return Err(err),
        },
        None => sync_full(transport, store, mailbox_id, deferred, options)?,
    };

    stats.duration_ms = start.elapsed().as_millis() as u64;
    log::debug!(
        "Synced folder {}: {:?}",
        mailbox_id.as_str(),
        stats
    );
    Ok(stats)
}

/// Full fetch: replace the folder's listing with the server's most recent
/// messages, preserving cached bodies for ids that survive
fn sync_full(
    transport: &dyn MailTransport,
    store: &dyn MailStore,
    mailbox_id: &MailboxId,
    deferred: &HashSet<MessageId>,
    options: &SyncOptions,
) -> Result<SyncStats> {
    let snapshot = transport.fetch_folder(mailbox_id, options.max_messages, options.page_size)?;

    let mut stats = SyncStats {
        full_fetch: true,
        fetched: snapshot.messages.len(),
        ..Default::default()
    };

    // Deferred messages keep their local (optimistically mutated) state:
    // the incoming copy is dropped, and if the message was detached from
    // the folder by a pending archive/delete it stays detached.
    let index = store.list_folder(mailbox_id)?;
    let mut messages: Vec<Message> = Vec::with_capacity(snapshot.messages.len());
    for incoming in snapshot.messages {
        if deferred.contains(&incoming.id) {
            stats.deferred += 1;
            if let Some(local) = store.get_message(&incoming.id)?
                && local.mailbox_id == *mailbox_id
                && index.contains(&incoming.id)
            {
                messages.push(local);
            }
        } else {
            messages.push(incoming);
        }
    }

    // A deferred message the new listing no longer carries is still the
    // dispatcher's to resolve; re-inject it at its ordered position so
    // the replacement doesn't drop it out from under the pending action.
    for id in deferred {
        if messages.iter().any(|m| m.id == *id) || !index.contains(id) {
            continue;
        }
        if let Some(local) = store.get_message(id)?
            && local.mailbox_id == *mailbox_id
        {
            stats.deferred += 1;
            let local_key = (Reverse(local.received_at), local.id.0.clone());
            let pos = messages
                .partition_point(|m| (Reverse(m.received_at), m.id.0.clone()) < local_key);
            messages.insert(pos, local);
        }
    }

    stats.merged = messages.len();
    store.replace_folder(mailbox_id, messages)?;
    store.set_cursor(mailbox_id, &snapshot.cursor)?;
    Ok(stats)
}

/// Incremental fetch: apply change deltas since the stored cursor,
/// draining follow-up pages until the server reports no more
fn sync_incremental(
    transport: &dyn MailTransport,
    store: &dyn MailStore,
    mailbox_id: &MailboxId,
    cursor: &str,
    deferred: &HashSet<MessageId>,
    options: &SyncOptions,
) -> Result<SyncStats> {
    let mut stats = SyncStats::default();
    let mut cursor = cursor.to_string();

    loop {
        let delta = transport.fetch_changes(mailbox_id, &cursor, options.page_size)?;
        stats.fetched += delta.changed.len();

        let removed: Vec<MessageId> = delta
            .removed
            .into_iter()
            .filter(|id| {
                let keep = !deferred.contains(id);
                if !keep {
                    stats.deferred += 1;
                }
                keep
            })
            // A changed message also appears in `removed` when it merely
            // moved position; only drop ids that truly left the listing
            .filter(|id| !delta.changed.iter().any(|m| m.id == *id))
            .collect();
        stats.removed += removed.len();
        store.remove_messages(&removed)?;

        let changed: Vec<Message> = delta
            .changed
            .into_iter()
            .filter(|m| {
                let keep = !deferred.contains(&m.id);
                if !keep {
                    stats.deferred += 1;
                }
                keep
            })
            .collect();
        stats.merged += changed.len();
        store.upsert_messages(mailbox_id, changed)?;

        // Cursor advances only after the delta is fully applied, so an
        // interrupted sync replays rather than skips
        store.set_cursor(mailbox_id, &delta.new_cursor)?;

        if !delta.has_more {
            break;
        }
        cursor = delta.new_cursor;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jmap::{FolderDelta, FolderSnapshot};
    use crate::models::{ActionKind, EmailAddress, Mailbox, MailboxRole};
    use crate::store::InMemoryMailStore;
    use anyhow::anyhow;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    fn make_message(id: &str, mailbox: &str, age_hours: i64) -> Message {
        Message::builder(MessageId::new(id), MailboxId::new(mailbox))
            .from(EmailAddress::new("sender@example.com"))
            .subject(format!("Subject {}", id))
            .received_at(Utc::now() - Duration::hours(age_hours))
            .build()
    }

    fn options() -> SyncOptions {
        SyncOptions {
            max_messages: 500,
            page_size: 50,
        }
    }

    /// Transport that replays scripted snapshots and deltas
    struct ScriptedTransport {
        snapshot: Mutex<Option<FolderSnapshot>>,
        deltas: Mutex<Vec<FolderDelta>>,
        expire_cursor: bool,
    }

    impl ScriptedTransport {
        fn full(snapshot: FolderSnapshot) -> Self {
            Self {
                snapshot: Mutex::new(Some(snapshot)),
                deltas: Mutex::new(Vec::new()),
                expire_cursor: false,
            }
        }

        fn incremental(deltas: Vec<FolderDelta>) -> Self {
            Self {
                snapshot: Mutex::new(None),
                deltas: Mutex::new(deltas),
                expire_cursor: false,
            }
        }
    }

    impl MailTransport for ScriptedTransport {
        fn fetch_mailboxes(&self) -> Result<Vec<Mailbox>> {
            Ok(vec![Mailbox::new("mb-inbox", "Inbox").with_role(MailboxRole::Inbox)])
        }

        fn fetch_folder(
            &self,
            _mailbox_id: &MailboxId,
            _max_messages: usize,
            _page_size: usize,
        ) -> Result<FolderSnapshot> {
            self.snapshot
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow!("no snapshot scripted"))
        }

        fn fetch_changes(
            &self,
            _mailbox_id: &MailboxId,
            _cursor: &str,
            _page_size: usize,
        ) -> Result<FolderDelta> {
            if self.expire_cursor {
                return Err(CursorExpiredError.into());
            }
            let mut deltas = self.deltas.lock().unwrap();
            if deltas.is_empty() {
                return Err(anyhow!("no delta scripted"));
            }
            Ok(deltas.remove(0))
        }

        fn fetch_body(&self, _id: &MessageId) -> Result<String> {
            Err(anyhow!("not scripted"))
        }

        fn apply_action(&self, _id: &MessageId, _kind: ActionKind) -> Result<()> {
            Err(anyhow!("not scripted"))
        }
    }

    fn inbox() -> MailboxId {
        MailboxId::new("mb-inbox")
    }

    #[test]
    fn test_full_sync_populates_folder_and_cursor() {
        let store = InMemoryMailStore::new(10);
        let transport = ScriptedTransport::full(FolderSnapshot {
            messages: vec![
                make_message("m1", "mb-inbox", 1),
                make_message("m2", "mb-inbox", 2),
            ],
            cursor: "state-1".to_string(),
        });

        let stats =
            sync_mailbox(&transport, &store, &inbox(), &HashSet::new(), &options()).unwrap();

        assert!(stats.full_fetch);
        assert_eq!(stats.merged, 2);
        assert_eq!(store.list_folder(&inbox()).unwrap().len(), 2);
        assert_eq!(store.get_cursor(&inbox()).unwrap().as_deref(), Some("state-1"));
    }

    #[test]
    fn test_incremental_merge_applies_changes_and_removals() {
        let store = InMemoryMailStore::new(10);

        // Seed [m1, m2, m3] via a full sync
        let seed = ScriptedTransport::full(FolderSnapshot {
            messages: vec![
                make_message("m1", "mb-inbox", 1),
                make_message("m2", "mb-inbox", 2),
                make_message("m3", "mb-inbox", 3),
            ],
            cursor: "state-1".to_string(),
        });
        sync_mailbox(&seed, &store, &inbox(), &HashSet::new(), &options()).unwrap();

        // Delta: m1 flags changed, m3 left the folder
        let mut m1_read = make_message("m1", "mb-inbox", 1);
        m1_read.is_read = true;
        let transport = ScriptedTransport::incremental(vec![FolderDelta {
            changed: vec![m1_read],
            removed: vec![MessageId::new("m1"), MessageId::new("m3")],
            new_cursor: "state-2".to_string(),
            has_more: false,
        }]);

        let stats =
            sync_mailbox(&transport, &store, &inbox(), &HashSet::new(), &options()).unwrap();

        assert!(!stats.full_fetch);
        let ids = store.list_folder(&inbox()).unwrap();
        let ids: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(store.get_message(&MessageId::new("m1")).unwrap().unwrap().is_read);
        assert!(!store.has_message(&MessageId::new("m3")).unwrap());
        assert_eq!(store.get_cursor(&inbox()).unwrap().as_deref(), Some("state-2"));
    }

    #[test]
    fn test_incremental_drains_follow_up_pages() {
        let store = InMemoryMailStore::new(10);
        store.set_cursor(&inbox(), "state-0").unwrap();

        let transport = ScriptedTransport::incremental(vec![
            FolderDelta {
                changed: vec![make_message("m1", "mb-inbox", 1)],
                removed: vec![],
                new_cursor: "state-1".to_string(),
                has_more: true,
            },
            FolderDelta {
                changed: vec![make_message("m2", "mb-inbox", 2)],
                removed: vec![],
                new_cursor: "state-2".to_string(),
                has_more: false,
            },
        ]);

        let stats =
            sync_mailbox(&transport, &store, &inbox(), &HashSet::new(), &options()).unwrap();

        assert_eq!(stats.merged, 2);
        assert_eq!(store.get_cursor(&inbox()).unwrap().as_deref(), Some("state-2"));
    }

    #[test]
    fn test_expired_cursor_falls_back_to_full_fetch() {
        let store = InMemoryMailStore::new(10);
        store.set_cursor(&inbox(), "stale").unwrap();
        store
            .upsert_messages(&inbox(), vec![make_message("old", "mb-inbox", 48)])
            .unwrap();

        let mut transport = ScriptedTransport::full(FolderSnapshot {
            messages: vec![make_message("m1", "mb-inbox", 1)],
            cursor: "fresh".to_string(),
        });
        transport.expire_cursor = true;

        let stats =
            sync_mailbox(&transport, &store, &inbox(), &HashSet::new(), &options()).unwrap();

        assert!(stats.full_fetch);
        let ids = store.list_folder(&inbox()).unwrap();
        assert_eq!(ids, vec![MessageId::new("m1")]);
        assert_eq!(store.get_cursor(&inbox()).unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_deferred_message_keeps_local_state() {
        let store = InMemoryMailStore::new(10);

        // m1 is locally starred with a pending action; the server copy
        // still says unstarred
        let mut m1_local = make_message("m1", "mb-inbox", 1);
        m1_local.is_starred = true;
        store.upsert_messages(&inbox(), vec![m1_local]).unwrap();

        let transport = ScriptedTransport::full(FolderSnapshot {
            messages: vec![
                make_message("m1", "mb-inbox", 1),
                make_message("m2", "mb-inbox", 2),
            ],
            cursor: "state-1".to_string(),
        });

        let deferred: HashSet<MessageId> = [MessageId::new("m1")].into();
        let stats = sync_mailbox(&transport, &store, &inbox(), &deferred, &options()).unwrap();

        assert_eq!(stats.deferred, 1);
        let m1 = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert!(m1.is_starred);
        assert_eq!(store.list_folder(&inbox()).unwrap().len(), 2);
    }

    #[test]
    fn test_deferred_detached_message_stays_detached() {
        let store = InMemoryMailStore::new(10);

        // m1 was optimistically archived: detached from inbox, action pending
        store
            .upsert_messages(&inbox(), vec![make_message("m1", "mb-inbox", 1)])
            .unwrap();
        store.remove_from_folder(&MessageId::new("m1")).unwrap();

        // Server hasn't processed the archive yet and still lists m1
        let transport = ScriptedTransport::full(FolderSnapshot {
            messages: vec![
                make_message("m1", "mb-inbox", 1),
                make_message("m2", "mb-inbox", 2),
            ],
            cursor: "state-1".to_string(),
        });

        let deferred: HashSet<MessageId> = [MessageId::new("m1")].into();
        sync_mailbox(&transport, &store, &inbox(), &deferred, &options()).unwrap();

        let ids = store.list_folder(&inbox()).unwrap();
        assert_eq!(ids, vec![MessageId::new("m2")]);
        // Still in storage for the dispatcher to confirm or roll back
        assert!(store.has_message(&MessageId::new("m1")).unwrap());
    }

    #[test]
    fn test_full_resync_retains_deferred_message_missing_from_listing() {
        let store = InMemoryMailStore::new(10);

        // m1 is locally starred with the action still pending; the server
        // listing no longer includes it
        let mut m1_local = make_message("m1", "mb-inbox", 2);
        m1_local.is_starred = true;
        store.upsert_messages(&inbox(), vec![m1_local]).unwrap();

        let transport = ScriptedTransport::full(FolderSnapshot {
            messages: vec![
                make_message("m2", "mb-inbox", 1),
                make_message("m3", "mb-inbox", 3),
            ],
            cursor: "state-1".to_string(),
        });

        let deferred: HashSet<MessageId> = [MessageId::new("m1")].into();
        let stats = sync_mailbox(&transport, &store, &inbox(), &deferred, &options()).unwrap();

        assert_eq!(stats.deferred, 1);
        let m1 = store.get_message(&MessageId::new("m1")).unwrap().unwrap();
        assert!(m1.is_starred);

        // Re-injected at its ordered position between m2 and m3
        let ids = store.list_folder(&inbox()).unwrap();
        let ids: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m1", "m3"]);
    }

    #[test]
    fn test_sync_mailboxes_merges_folder_list() {
        let store = InMemoryMailStore::new(10);
        let transport = ScriptedTransport::incremental(vec![]);

        let count = sync_mailboxes(&transport, &store).unwrap();
        assert_eq!(count, 1);
        let mailboxes = store.list_mailboxes().unwrap();
        assert_eq!(mailboxes[0].display_name(), "Inbox");
    }
}
