//! Mail core for fastmail-tui: sync engine and local cache
//!
//! Keeps a bounded in-memory cache of mailboxes and messages in step with
//! a JMAP server, applies user actions optimistically with background
//! confirmation, and answers display queries without touching the
//! network.
//!
//! Layering, top to bottom:
//! - [`service`] — the facade the UI holds
//! - [`query`] — read-side views over the cache
//! - [`sync`] / [`actions`] — background writers
//! - [`store`] — the cache itself, the single serialization point
//! - [`jmap`] — wire protocol and the transport seam

pub mod actions;
pub mod config;
pub mod error;
pub mod events;
pub mod jmap;
pub mod models;
pub mod query;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{Credentials, MailConfig};
pub use error::{CacheError, ClientError};
pub use events::MailEvent;
pub use service::MailService;
