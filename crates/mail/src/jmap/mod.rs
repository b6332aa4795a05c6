//! JMAP (RFC 8620/8621) integration for Fastmail
//!
//! This module provides:
//! - Session discovery and authenticated API client
//! - The transport trait the sync and action layers talk through
//! - Response normalization to domain models

mod client;
mod normalize;
mod transport;

pub use client::{CursorExpiredError, JmapClient};
pub use normalize::{extract_text_body, normalize_email, normalize_mailbox};
pub use transport::{FolderDelta, FolderSnapshot, MailTransport};

/// JMAP capability URNs sent in every request
pub const CAPABILITY_CORE: &str = "urn:ietf:params:jmap:core";
pub const CAPABILITY_MAIL: &str = "urn:ietf:params:jmap:mail";

/// JMAP wire types
pub mod api {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::collections::HashMap;

    /// Session resource from `/.well-known/jmap`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Session {
        pub api_url: String,
        pub primary_accounts: HashMap<String, String>,
    }

    /// A method call: `[name, arguments, call-id]`
    pub type MethodCall = (String, Value, String);

    /// Request envelope for the API endpoint
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Request {
        pub using: Vec<String>,
        pub method_calls: Vec<MethodCall>,
    }

    /// Response envelope
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Response {
        pub method_responses: Vec<MethodCall>,
    }

    /// Method-level error arguments (response name `"error"`)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MethodError {
        #[serde(rename = "type")]
        pub error_type: String,
        pub description: Option<String>,
    }

    /// A mailbox from `Mailbox/get`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JmapMailbox {
        pub id: String,
        pub name: String,
        pub role: Option<String>,
        pub sort_order: Option<u32>,
        pub total_emails: Option<u32>,
        pub unread_emails: Option<u32>,
    }

    /// `Mailbox/get` response arguments
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MailboxGetResponse {
        pub list: Vec<JmapMailbox>,
    }

    /// `Email/query` response arguments
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EmailQueryResponse {
        pub ids: Vec<String>,
        pub query_state: String,
        pub total: Option<u64>,
    }

    /// An added entry in `Email/queryChanges`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddedItem {
        pub index: u64,
        pub id: String,
    }

    /// `Email/queryChanges` response arguments
    ///
    /// `removed` covers everything that left the query result, whether
    /// deleted, moved, or reordered; ids may appear in both lists.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EmailQueryChangesResponse {
        pub old_query_state: String,
        pub new_query_state: String,
        #[serde(default)]
        pub added: Vec<AddedItem>,
        #[serde(default)]
        pub removed: Vec<String>,
    }

    /// `Email/changes` response arguments
    ///
    /// Complements `Email/queryChanges`: query changes cover listing
    /// membership and position, while object changes carry the ids whose
    /// properties (keywords) changed in place.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EmailChangesResponse {
        pub old_state: String,
        pub new_state: String,
        #[serde(default)]
        pub has_more_changes: bool,
        #[serde(default)]
        pub created: Vec<String>,
        #[serde(default)]
        pub updated: Vec<String>,
        #[serde(default)]
        pub destroyed: Vec<String>,
    }

    /// An address in Email from/to/cc fields
    #[derive(Debug, Clone, Deserialize)]
    pub struct JmapAddress {
        pub name: Option<String>,
        pub email: String,
    }

    /// A body part reference from `textBody`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BodyPart {
        pub part_id: Option<String>,
        #[serde(rename = "type")]
        pub mime_type: Option<String>,
    }

    /// Decoded part content from `bodyValues`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BodyValue {
        pub value: String,
        #[serde(default)]
        pub is_truncated: bool,
    }

    /// An email from `Email/get`
    ///
    /// Header fetches request only the metadata properties; body fetches
    /// additionally populate `text_body` and `body_values`.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JmapEmail {
        pub id: String,
        pub thread_id: Option<String>,
        #[serde(default)]
        pub mailbox_ids: HashMap<String, bool>,
        #[serde(default)]
        pub keywords: HashMap<String, bool>,
        pub from: Option<Vec<JmapAddress>>,
        pub to: Option<Vec<JmapAddress>>,
        pub cc: Option<Vec<JmapAddress>>,
        pub subject: Option<String>,
        pub preview: Option<String>,
        pub received_at: Option<String>,
        pub size: Option<u64>,
        pub text_body: Option<Vec<BodyPart>>,
        pub body_values: Option<HashMap<String, BodyValue>>,
    }

    /// `Email/get` response arguments
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EmailGetResponse {
        /// Email object state, the `Email/changes` anchor
        pub state: Option<String>,
        pub list: Vec<JmapEmail>,
        #[serde(default)]
        pub not_found: Vec<String>,
    }

    /// A per-record error in `Email/set`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SetError {
        #[serde(rename = "type")]
        pub error_type: String,
        pub description: Option<String>,
    }

    /// `Email/set` response arguments
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EmailSetResponse {
        pub updated: Option<HashMap<String, Option<Value>>>,
        pub not_updated: Option<HashMap<String, SetError>>,
    }
}
