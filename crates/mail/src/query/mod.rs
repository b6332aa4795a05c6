//! Read-side query interface over the cache

mod messages;

pub use messages::{
    MessageSummary, SearchScope, get_message, list_folder, list_mailboxes, search_messages,
};
