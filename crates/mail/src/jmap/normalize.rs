//! JMAP response normalization
//!
//! Converts JMAP wire objects to domain models.

use chrono::{DateTime, Utc};

use super::api::{JmapAddress, JmapEmail, JmapMailbox};
use crate::models::{EmailAddress, Mailbox, MailboxId, MailboxRole, Message, MessageId};

/// Maximum preview length retained after normalization
const PREVIEW_MAX_CHARS: usize = 200;

/// Subject shown for messages with no subject header
const NO_SUBJECT: &str = "(no subject)";

/// Normalize a JMAP mailbox to a domain Mailbox
pub fn normalize_mailbox(raw: JmapMailbox) -> Mailbox {
    let role = raw.role.as_deref().and_then(MailboxRole::parse);
    let mut mailbox = Mailbox::new(raw.id, raw.name)
        .with_counts(raw.total_emails.unwrap_or(0), raw.unread_emails.unwrap_or(0));
    mailbox.sort_order = raw.sort_order.unwrap_or(0);
    if let Some(role) = role {
        mailbox = mailbox.with_role(role);
    }
    mailbox
}

/// Normalize a JMAP email to a domain Message placed in `mailbox_id`
///
/// Bodies are not populated here; a fresh message always starts in
/// `NotFetched` state and the store preserves any cached body on merge.
pub fn normalize_email(raw: JmapEmail, mailbox_id: &MailboxId) -> Message {
    let from = raw
        .from
        .as_ref()
        .and_then(|list| list.first())
        .map(convert_address)
        .unwrap_or_else(|| EmailAddress::new("unknown@unknown.invalid"));

    let subject = match raw.subject.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => NO_SUBJECT.to_string(),
    };

    let preview = truncate_chars(raw.preview.as_deref().unwrap_or(""), PREVIEW_MAX_CHARS);

    let received_at = raw
        .received_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    Message::builder(MessageId::new(&raw.id), mailbox_id.clone())
        .thread_id(raw.thread_id.unwrap_or_else(|| raw.id.clone()))
        .from(from)
        .to(convert_address_list(raw.to.as_deref()))
        .cc(convert_address_list(raw.cc.as_deref()))
        .subject(subject)
        .preview(preview)
        .received_at(received_at)
        .size(raw.size.unwrap_or(0))
        .read(raw.keywords.get("$seen").copied().unwrap_or(false))
        .starred(raw.keywords.get("$flagged").copied().unwrap_or(false))
        .build()
}

/// Extract the plain-text body from a body-fetched email
///
/// Joins the `textBody` parts' decoded values in part order. Returns None
/// when the response carried no usable text part.
pub fn extract_text_body(raw: &JmapEmail) -> Option<String> {
    let parts = raw.text_body.as_ref()?;
    let values = raw.body_values.as_ref()?;

    let mut chunks = Vec::new();
    for part in parts {
        if let Some(mime) = &part.mime_type
            && !mime.starts_with("text/plain")
        {
            continue;
        }
        if let Some(part_id) = &part.part_id
            && let Some(value) = values.get(part_id)
        {
            chunks.push(value.value.as_str());
        }
    }

    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn convert_address(addr: &JmapAddress) -> EmailAddress {
    match &addr.name {
        Some(name) if !name.trim().is_empty() => EmailAddress::with_name(name.trim(), &addr.email),
        _ => EmailAddress::new(&addr.email),
    }
}

fn convert_address_list(list: Option<&[JmapAddress]>) -> Vec<EmailAddress> {
    list.map(|addrs| addrs.iter().map(convert_address).collect())
        .unwrap_or_default()
}

/// Parse a JMAP UTCDate (RFC 3339)
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Truncate on a character boundary
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
