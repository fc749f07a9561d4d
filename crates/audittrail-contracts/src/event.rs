//! Ledger change notifications.

use serde::{Deserialize, Serialize};

use crate::entry::StoredEntry;

/// A change to the ledger, delivered to subscribers and emitted by pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A new entry was committed.
    Appended(StoredEntry),

    /// The whole ledger was wiped by the administrative clear operation.
    Cleared {
        /// Entries removed, when known. Pollers cannot observe the count.
        removed: Option<u64>,
    },
}
