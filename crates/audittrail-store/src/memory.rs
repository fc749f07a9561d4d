//! In-memory implementation of `LedgerStore`.
//!
//! `InMemoryLedgerStore` keeps all entries in a `Vec` protected by a
//! `Mutex`. It has no durability and exists for tests and for embedding the
//! chain engine where persistence is handled elsewhere.

use std::sync::{Mutex, MutexGuard};

use audittrail_contracts::{AuditResult, AuditTrailError, Entry, StoredEntry};
use audittrail_core::LedgerStore;

/// The mutable interior of an `InMemoryLedgerStore`.
#[derive(Debug)]
struct InMemoryState {
    /// All entries written so far, in append order.
    entries: Vec<StoredEntry>,

    /// The row id the next append receives. Starts at 1 and, like an SQLite
    /// rowid table, restarts after the ledger is cleared.
    next_row: i64,
}

/// A volatile, append-only ledger store.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    state: Mutex<InMemoryState>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                entries: Vec::new(),
                next_row: 1,
            }),
        }
    }

    /// Edit stored entries directly, bypassing the chain engine.
    ///
    /// This is how tests simulate an attacker with write access to storage.
    pub fn tamper<R>(&self, edit: impl FnOnce(&mut Vec<StoredEntry>) -> R) -> AuditResult<R> {
        let mut state = self.state()?;
        Ok(edit(&mut state.entries))
    }

    fn state(&self) -> AuditResult<MutexGuard<'_, InMemoryState>> {
        self.state
            .lock()
            .map_err(|e| AuditTrailError::storage(format!("ledger state lock poisoned: {}", e)))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn create_if_absent(&self) -> AuditResult<()> {
        Ok(())
    }

    fn append(&self, entry: &Entry) -> AuditResult<StoredEntry> {
        let mut state = self.state()?;
        let stored = StoredEntry {
            row_id: state.next_row,
            entry: entry.clone(),
        };
        state.next_row += 1;
        state.entries.push(stored.clone());
        Ok(stored)
    }

    fn last_entry(&self) -> AuditResult<Option<StoredEntry>> {
        Ok(self.state()?.entries.last().cloned())
    }

    fn read_page(&self, after_row: i64, limit: usize) -> AuditResult<Vec<StoredEntry>> {
        let state = self.state()?;
        Ok(state
            .entries
            .iter()
            .filter(|stored| stored.row_id > after_row)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self) -> AuditResult<u64> {
        Ok(self.state()?.entries.len() as u64)
    }

    fn clear(&self) -> AuditResult<u64> {
        let mut state = self.state()?;
        let removed = state.entries.len() as u64;
        state.entries.clear();
        state.next_row = 1;
        Ok(removed)
    }

    /// Holds the state lock across the read and the write.
    fn append_linked(
        &self,
        link: &mut dyn FnMut(Option<&Entry>) -> AuditResult<Entry>,
    ) -> AuditResult<StoredEntry> {
        let mut state = self.state()?;
        let entry = link(state.entries.last().map(|stored| &stored.entry))?;
        let stored = StoredEntry {
            row_id: state.next_row,
            entry,
        };
        state.next_row += 1;
        state.entries.push(stored.clone());
        Ok(stored)
    }
}
