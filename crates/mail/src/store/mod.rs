//! Cache store: bounded, consistent storage of mailbox and message state
//!
//! The trait-based design keeps the sync, action, and query layers
//! independent of the backing structure. The only implementation is
//! in-memory; the cache is rebuilt from the server on startup.

mod memory;
mod traits;

pub use memory::InMemoryMailStore;
pub use traits::MailStore;
