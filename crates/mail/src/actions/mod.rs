//! User actions: optimistic mutations with background confirmation

mod dispatcher;
mod ledger;

pub use dispatcher::{ActionDispatcher, DispatcherConfig};
pub use ledger::ActionLedger;
