//! The storage boundary of the ledger.
//!
//! `LedgerStore` knows nothing about hashing: it persists and returns
//! fully formed entries in insertion order. The chain engine owns every
//! hash-chain rule.

use std::collections::VecDeque;
use std::sync::Arc;

use audittrail_contracts::{AuditResult, Entry, StoredEntry};

/// Page size used by [`EntryCursor`] when walking a store.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Durable, ordered, append-only entry storage.
///
/// Implementations must make each `append` atomic with respect to readers:
/// a reader sees a committed entry in full or not at all.
pub trait LedgerStore: Send + Sync {
    /// Ensure the backing storage and its entry table exist.
    ///
    /// Idempotent. Implementations with versioned layouts migrate older
    /// layouts here.
    fn create_if_absent(&self) -> AuditResult<()>;

    /// Persist one complete entry at the end of the sequence.
    fn append(&self, entry: &Entry) -> AuditResult<StoredEntry>;

    /// The most recently committed entry, if any.
    fn last_entry(&self) -> AuditResult<Option<StoredEntry>>;

    /// Up to `limit` entries with a row id greater than `after_row`, in
    /// insertion order.
    fn read_page(&self, after_row: i64, limit: usize) -> AuditResult<Vec<StoredEntry>>;

    /// Number of stored entries.
    fn count(&self) -> AuditResult<u64>;

    /// Remove every entry. Returns how many were removed.
    fn clear(&self) -> AuditResult<u64>;

    /// The `hash` of the most recently committed entry, or `""` when empty.
    fn last_hash(&self) -> AuditResult<String> {
        Ok(self
            .last_entry()?
            .map(|stored| stored.entry.hash)
            .unwrap_or_default())
    }

    /// Read the last entry, build the next one from it, and persist it.
    ///
    /// The default composes `last_entry` and `append` and relies on the
    /// caller for mutual exclusion. Stores shared between processes override
    /// this so the read and the write happen in one exclusive transaction.
    fn append_linked(
        &self,
        link: &mut dyn FnMut(Option<&Entry>) -> AuditResult<Entry>,
    ) -> AuditResult<StoredEntry> {
        let previous = self.last_entry()?;
        let entry = link(previous.as_ref().map(|stored| &stored.entry))?;
        self.append(&entry)
    }

    /// A fresh, lazy pass over every entry in insertion order.
    fn read_all_ordered(&self) -> EntryCursor<'_>
    where
        Self: Sized,
    {
        EntryCursor::new(self)
    }
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn create_if_absent(&self) -> AuditResult<()> {
        (**self).create_if_absent()
    }

    fn append(&self, entry: &Entry) -> AuditResult<StoredEntry> {
        (**self).append(entry)
    }

    fn last_entry(&self) -> AuditResult<Option<StoredEntry>> {
        (**self).last_entry()
    }

    fn read_page(&self, after_row: i64, limit: usize) -> AuditResult<Vec<StoredEntry>> {
        (**self).read_page(after_row, limit)
    }

    fn count(&self) -> AuditResult<u64> {
        (**self).count()
    }

    fn clear(&self) -> AuditResult<u64> {
        (**self).clear()
    }

    fn last_hash(&self) -> AuditResult<String> {
        (**self).last_hash()
    }

    fn append_linked(
        &self,
        link: &mut dyn FnMut(Option<&Entry>) -> AuditResult<Entry>,
    ) -> AuditResult<StoredEntry> {
        (**self).append_linked(link)
    }
}

/// A lazy, finite walk over a store in insertion order.
///
/// Pages through the store with keyset pagination on row id, so memory use
/// is bounded by the page size. After the first error the cursor yields
/// nothing further.
///
/// Pages are separate reads, so a pass is not a snapshot: if the ledger is
/// cleared and refilled mid-pass, later pages come from the new chain.
/// `ChainEngine::verify` detects this and reruns the pass.
pub struct EntryCursor<'a> {
    store: &'a dyn LedgerStore,
    after_row: i64,
    page_size: usize,
    buffer: VecDeque<StoredEntry>,
    exhausted: bool,
}

impl<'a> EntryCursor<'a> {
    /// Start a pass from the beginning of `store`.
    pub fn new(store: &'a dyn LedgerStore) -> Self {
        Self::after(store, 0)
    }

    /// Start a pass over entries with a row id greater than `after_row`.
    pub fn after(store: &'a dyn LedgerStore, after_row: i64) -> Self {
        Self {
            store,
            after_row,
            page_size: DEFAULT_PAGE_SIZE,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl Iterator for EntryCursor<'_> {
    type Item = AuditResult<StoredEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(stored) = self.buffer.pop_front() {
            return Some(Ok(stored));
        }
        if self.exhausted {
            return None;
        }

        match self.store.read_page(self.after_row, self.page_size) {
            Ok(page) => {
                if page.len() < self.page_size {
                    self.exhausted = true;
                }
                if let Some(last) = page.last() {
                    self.after_row = last.row_id;
                }
                self.buffer.extend(page);
                self.buffer.pop_front().map(Ok)
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}
