//! JMAP HTTP client for Fastmail
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Session discovery
//! happens once at connect; every API call after that is a single POST to
//! the session's apiUrl carrying one or more method calls.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use url::Url;

use super::api::{
    EmailChangesResponse, EmailGetResponse, EmailQueryChangesResponse, EmailQueryResponse,
    EmailSetResponse, MailboxGetResponse, MethodCall, MethodError, Request, Response, Session,
};
use super::transport::{FolderDelta, FolderSnapshot, MailTransport};
use super::{CAPABILITY_CORE, CAPABILITY_MAIL, extract_text_body, normalize_email,
    normalize_mailbox};
use crate::error::ClientError;
use crate::models::{ActionKind, Mailbox, MailboxId, MailboxRole, Message, MessageId};

/// Error indicating the server can no longer compute changes from a stored
/// sync cursor; the caller falls back to a full fetch
#[derive(Debug, thiserror::Error)]
#[error("Sync cursor expired or invalid")]
pub struct CursorExpiredError;

/// Separator between the query state and the email object state inside a
/// stored folder cursor. Listing membership moves with the former; in-place
/// flag changes move only the latter, so both must be tracked to resume.
const CURSOR_SEPARATOR: char = '\u{1f}';

fn join_cursor(query_state: &str, email_state: &str) -> String {
    format!("{}{}{}", query_state, CURSOR_SEPARATOR, email_state)
}

/// Split a stored cursor into its two states. A cursor without the
/// separator predates this format and cannot be resumed from.
fn split_cursor(cursor: &str) -> Result<(&str, &str)> {
    cursor
        .split_once(CURSOR_SEPARATOR)
        .ok_or_else(|| CursorExpiredError.into())
}

/// Email properties requested for header (metadata) fetches
const HEADER_PROPERTIES: &[&str] = &[
    "id",
    "threadId",
    "mailboxIds",
    "keywords",
    "from",
    "to",
    "cc",
    "subject",
    "preview",
    "receivedAt",
    "size",
];

/// JMAP API client
pub struct JmapClient {
    api_url: String,
    account_id: String,
    token: String,
    /// System-role mailbox ids, refreshed on every mailbox fetch; archive
    /// and trash moves resolve their target through this
    roles: RwLock<HashMap<MailboxRole, MailboxId>>,
}

impl JmapClient {
    /// Discover the JMAP session and build a client
    ///
    /// `base_url` is the server origin (e.g. `https://api.fastmail.com`);
    /// discovery follows `/.well-known/jmap` from there.
    pub fn connect(base_url: &str, token: &str) -> Result<Self> {
        let session_url = Url::parse(base_url)
            .context("Invalid server URL")?
            .join("/.well-known/jmap")
            .context("Invalid server URL")?;

        let mut response = ureq::get(session_url.as_str())
            .header("Authorization", &format!("Bearer {}", token))
            .call()
            .map_err(|e| classify_http(e, "session discovery"))?;

        let session: Session = response
            .body_mut()
            .read_json()
            .context("Failed to parse JMAP session")?;

        let account_id = session
            .primary_accounts
            .get(CAPABILITY_MAIL)
            .cloned()
            .ok_or_else(|| {
                ClientError::Protocol("session has no primary mail account".to_string())
            })?;

        log::info!("JMAP session established for account {}", account_id);

        Ok(Self {
            api_url: session.api_url,
            account_id,
            token: token.to_string(),
            roles: RwLock::new(HashMap::new()),
        })
    }

    /// Send a batch of method calls and return the method responses
    fn call(&self, method_calls: Vec<MethodCall>) -> Result<Vec<MethodCall>> {
        let request = Request {
            using: vec![CAPABILITY_CORE.to_string(), CAPABILITY_MAIL.to_string()],
            method_calls,
        };

        let mut response = ureq::post(&self.api_url)
            .header("Authorization", &format!("Bearer {}", self.token))
            .send_json(&request)
            .map_err(|e| classify_http(e, "API request"))?;

        let envelope: Response = response
            .body_mut()
            .read_json()
            .context("Failed to parse JMAP response")?;

        Ok(envelope.method_responses)
    }

    /// Pull the response for a given call id out of a batch, checking for
    /// method-level errors
    fn take_response<T: serde::de::DeserializeOwned>(
        responses: &[MethodCall],
        call_id: &str,
    ) -> Result<T> {
        let (name, args, _) = responses
            .iter()
            .find(|(_, _, id)| id == call_id)
            .ok_or_else(|| {
                ClientError::Protocol(format!("missing response for call {}", call_id))
            })?;

        if name == "error" {
            let err: MethodError = serde_json::from_value(args.clone())
                .context("Failed to parse method error")?;
            if err.error_type == "cannotCalculateChanges" || err.error_type == "tooManyChanges" {
                return Err(CursorExpiredError.into());
            }
            return Err(ClientError::Protocol(format!(
                "method error {}: {}",
                err.error_type,
                err.description.unwrap_or_default()
            ))
            .into());
        }

        serde_json::from_value(args.clone())
            .with_context(|| format!("Failed to parse {} response", name))
    }

    fn folder_filter(&self, mailbox_id: &MailboxId) -> Value {
        json!({ "inMailbox": mailbox_id.as_str() })
    }

    fn received_desc_sort() -> Value {
        json!([{ "property": "receivedAt", "isAscending": false }])
    }

    /// Resolve the mailbox id for a system role, fetching the mailbox list
    /// if the role cache is cold
    fn role_target(&self, role: MailboxRole) -> Result<MailboxId> {
        if let Some(id) = self.roles.read().unwrap().get(&role) {
            return Ok(id.clone());
        }

        self.fetch_mailboxes()?;

        self.roles
            .read()
            .unwrap()
            .get(&role)
            .cloned()
            .ok_or_else(|| {
                ClientError::Protocol(format!("server has no {} mailbox", role.display_name()))
                    .into()
            })
    }

    /// Build the keyword/mailbox patch for an action
    fn action_patch(&self, kind: ActionKind) -> Result<Value> {
        let patch = match kind {
            ActionKind::MarkRead => json!({ "keywords/$seen": true }),
            ActionKind::MarkUnread => json!({ "keywords/$seen": null }),
            ActionKind::Star => json!({ "keywords/$flagged": true }),
            ActionKind::Unstar => json!({ "keywords/$flagged": null }),
            ActionKind::Archive => {
                let target = self.role_target(MailboxRole::Archive)?;
                json!({ "mailboxIds": { target.as_str(): true } })
            }
            ActionKind::Delete => {
                let target = self.role_target(MailboxRole::Trash)?;
                json!({ "mailboxIds": { target.as_str(): true } })
            }
        };
        Ok(patch)
    }
}

impl MailTransport for JmapClient {
    fn fetch_mailboxes(&self) -> Result<Vec<Mailbox>> {
        let responses = self.call(vec![(
            "Mailbox/get".to_string(),
            json!({ "accountId": self.account_id, "ids": null }),
            "0".to_string(),
        )])?;

        let parsed: MailboxGetResponse = Self::take_response(&responses, "0")?;
        let mailboxes: Vec<Mailbox> = parsed.list.into_iter().map(normalize_mailbox).collect();

        let mut roles = self.roles.write().unwrap();
        roles.clear();
        for mailbox in &mailboxes {
            if let Some(role) = mailbox.role {
                roles.insert(role, mailbox.id.clone());
            }
        }

        Ok(mailboxes)
    }

    fn fetch_folder(
        &self,
        mailbox_id: &MailboxId,
        max_messages: usize,
        page_size: usize,
    ) -> Result<FolderSnapshot> {
        let mut messages: Vec<Message> = Vec::new();
        let mut query_state = String::new();
        let mut email_state = String::new();

        loop {
            let remaining = max_messages.saturating_sub(messages.len());
            if remaining == 0 {
                break;
            }
            let limit = remaining.min(page_size);

            let responses = self.call(vec![
                (
                    "Email/query".to_string(),
                    json!({
                        "accountId": self.account_id,
                        "filter": self.folder_filter(mailbox_id),
                        "sort": Self::received_desc_sort(),
                        "position": messages.len(),
                        "limit": limit,
                    }),
                    "q".to_string(),
                ),
                (
                    "Email/get".to_string(),
                    json!({
                        "accountId": self.account_id,
                        "#ids": {
                            "resultOf": "q",
                            "name": "Email/query",
                            "path": "/ids",
                        },
                        "properties": HEADER_PROPERTIES,
                    }),
                    "g".to_string(),
                ),
            ])?;

            let query: EmailQueryResponse = Self::take_response(&responses, "q")?;
            let page: EmailGetResponse = Self::take_response(&responses, "g")?;

            // Each page carries the states at that instant; the last one
            // wins as the folder's resume cursor
            query_state = query.query_state;
            if let Some(state) = page.state {
                email_state = state;
            }

            let page_len = query.ids.len();
            messages.extend(
                page.list
                    .into_iter()
                    .map(|raw| normalize_email(raw, mailbox_id)),
            );

            if page_len < limit {
                break;
            }
        }

        messages.truncate(max_messages);
        log::debug!(
            "Fetched {} messages for folder {}",
            messages.len(),
            mailbox_id.as_str()
        );

        Ok(FolderSnapshot {
            messages,
            cursor: join_cursor(&query_state, &email_state),
        })
    }

    fn fetch_changes(
        &self,
        mailbox_id: &MailboxId,
        cursor: &str,
        page_size: usize,
    ) -> Result<FolderDelta> {
        let (query_state, email_state) = split_cursor(cursor)?;

        // Query changes cover listing membership and position only; a
        // message whose keywords flipped in place appears in neither list.
        // Email/changes catches those, so both run in one batch.
        let responses = self.call(vec![
            (
                "Email/queryChanges".to_string(),
                json!({
                    "accountId": self.account_id,
                    "filter": self.folder_filter(mailbox_id),
                    "sort": Self::received_desc_sort(),
                    "sinceQueryState": query_state,
                    "maxChanges": page_size,
                }),
                "qc".to_string(),
            ),
            (
                "Email/get".to_string(),
                json!({
                    "accountId": self.account_id,
                    "#ids": {
                        "resultOf": "qc",
                        "name": "Email/queryChanges",
                        "path": "/added/*/id",
                    },
                    "properties": HEADER_PROPERTIES,
                }),
                "qg".to_string(),
            ),
            (
                "Email/changes".to_string(),
                json!({
                    "accountId": self.account_id,
                    "sinceState": email_state,
                    "maxChanges": page_size,
                }),
                "ec".to_string(),
            ),
            (
                "Email/get".to_string(),
                json!({
                    "accountId": self.account_id,
                    "#ids": {
                        "resultOf": "ec",
                        "name": "Email/changes",
                        "path": "/updated",
                    },
                    "properties": HEADER_PROPERTIES,
                }),
                "eg".to_string(),
            ),
        ])?;

        let query_changes: EmailQueryChangesResponse = Self::take_response(&responses, "qc")?;
        let added_page: EmailGetResponse = Self::take_response(&responses, "qg")?;
        let email_changes: EmailChangesResponse = Self::take_response(&responses, "ec")?;
        let updated_page: EmailGetResponse = Self::take_response(&responses, "eg")?;

        Ok(assemble_delta(
            mailbox_id,
            query_changes,
            added_page,
            email_changes,
            updated_page,
            page_size,
        ))
    }

    fn fetch_body(&self, id: &MessageId) -> Result<String> {
        let responses = self.call(vec![(
            "Email/get".to_string(),
            json!({
                "accountId": self.account_id,
                "ids": [id.as_str()],
                "properties": ["textBody", "bodyValues"],
                "fetchTextBodyValues": true,
            }),
            "0".to_string(),
        )])?;

        let parsed: EmailGetResponse = Self::take_response(&responses, "0")?;
        let email = parsed.list.into_iter().next().ok_or_else(|| {
            ClientError::Protocol(format!("message {} not found on server", id.as_str()))
        })?;

        extract_text_body(&email)
            .ok_or_else(|| {
                ClientError::Protocol(format!("message {} has no text body", id.as_str())).into()
            })
    }

    fn apply_action(&self, id: &MessageId, kind: ActionKind) -> Result<()> {
        let patch = self.action_patch(kind)?;

        let responses = self.call(vec![(
            "Email/set".to_string(),
            json!({
                "accountId": self.account_id,
                "update": { id.as_str(): patch },
            }),
            "0".to_string(),
        )])?;

        let parsed: EmailSetResponse = Self::take_response(&responses, "0")?;

        if parsed
            .updated
            .as_ref()
            .is_some_and(|updated| updated.contains_key(id.as_str()))
        {
            return Ok(());
        }

        if let Some(not_updated) = &parsed.not_updated
            && let Some(err) = not_updated.get(id.as_str())
        {
            // Already moved or deleted remotely: the action's outcome
            // holds, so treat it as confirmed
            if err.error_type == "notFound" {
                log::debug!(
                    "{} on {}: already gone remotely, treating as success",
                    kind.label(),
                    id.as_str()
                );
                return Ok(());
            }
            return Err(ClientError::Protocol(format!(
                "{} rejected for {}: {}",
                kind.label(),
                id.as_str(),
                err.error_type
            ))
            .into());
        }

        Err(ClientError::Protocol(format!(
            "{} for {} neither confirmed nor rejected",
            kind.label(),
            id.as_str()
        ))
        .into())
    }
}

/// Combine the membership delta and the in-place object changes into one
/// folder delta
fn assemble_delta(
    mailbox_id: &MailboxId,
    query_changes: EmailQueryChangesResponse,
    added_page: EmailGetResponse,
    email_changes: EmailChangesResponse,
    updated_page: EmailGetResponse,
    page_size: usize,
) -> FolderDelta {
    let mut changed: Vec<Message> = added_page
        .list
        .into_iter()
        .map(|raw| normalize_email(raw, mailbox_id))
        .collect();

    // Updated ids are account-wide: keep the ones in this folder that the
    // membership delta didn't already deliver
    let seen: HashSet<&str> = changed.iter().map(|m| m.id.as_str()).collect();
    let updated: Vec<Message> = updated_page
        .list
        .into_iter()
        .filter(|raw| {
            raw.mailbox_ids.contains_key(mailbox_id.as_str()) && !seen.contains(raw.id.as_str())
        })
        .map(|raw| normalize_email(raw, mailbox_id))
        .collect();
    changed.extend(updated);

    let removed: Vec<MessageId> = query_changes.removed.into_iter().map(MessageId::new).collect();

    // A full page means the server truncated the delta; resume from the
    // new states to drain the rest
    let has_more = (changed.len() + removed.len() >= page_size
        && query_changes.new_query_state != query_changes.old_query_state)
        || email_changes.has_more_changes;

    FolderDelta {
        changed,
        removed,
        new_cursor: join_cursor(&query_changes.new_query_state, &email_changes.new_state),
        has_more,
    }
}

/// Map an HTTP-level failure to a client error class
fn classify_http(err: ureq::Error, what: &str) -> anyhow::Error {
    match err {
        ureq::Error::StatusCode(401) | ureq::Error::StatusCode(403) => {
            ClientError::Auth(format!("{} rejected with status", what)).into()
        }
        ureq::Error::StatusCode(429) => {
            ClientError::Network(format!("{} rate limited", what)).into()
        }
        ureq::Error::StatusCode(code) if code >= 500 => {
            ClientError::Network(format!("{} failed with server status {}", what, code)).into()
        }
        ureq::Error::StatusCode(code) => {
            ClientError::Protocol(format!("{} failed with status {}", what, code)).into()
        }
        other => ClientError::Network(format!("{} failed: {}", what, other)).into(),
    }
}
