//! Polling consumer of ledger changes.
//!
//! `ChainEngine::subscribe` serves readers in the writer's process. Readers
//! in another process (the CLI `watch` command) poll instead: each
//! `LedgerWatcher::poll` is an independent read pass that returns the same
//! `LedgerEvent`s a subscriber would have received.

use audittrail_contracts::{AuditResult, Finding, LedgerEvent};
use tracing::debug;

use crate::chain::ChainVerifier;
use crate::traits::{EntryCursor, LedgerStore};

/// A row-id cursor over a store that reports what changed since the last poll.
pub struct LedgerWatcher<S: LedgerStore> {
    store: S,
    last_row: i64,
    /// Stored hash of the row at `last_row`, `""` before the first row.
    last_hash: String,
    verifier: Option<ChainVerifier>,
}

impl<S: LedgerStore> LedgerWatcher<S> {
    /// Start watching after the entries currently in the store.
    pub fn from_tail(store: S) -> AuditResult<Self> {
        let (last_row, last_hash) = store
            .last_entry()?
            .map(|s| (s.row_id, s.entry.hash))
            .unwrap_or_default();
        Ok(Self {
            store,
            last_row,
            last_hash,
            verifier: None,
        })
    }

    /// Start watching from the beginning, so the first poll replays every
    /// existing entry.
    pub fn from_start(store: S) -> Self {
        Self {
            store,
            last_row: 0,
            last_hash: String::new(),
            verifier: None,
        }
    }

    /// Also check chain linkage of every entry the watcher sees.
    ///
    /// The watcher must have seen the whole chain for this to be meaningful,
    /// so it walks the existing entries once to prime its verifier.
    pub fn with_verification(mut self) -> AuditResult<Self> {
        let mut verifier = ChainVerifier::new();
        for stored in EntryCursor::new(&self.store) {
            let stored = stored?;
            if stored.row_id > self.last_row {
                break;
            }
            verifier.observe(&stored);
        }
        self.verifier = Some(verifier);
        Ok(self)
    }

    /// Row id of the newest entry already reported.
    pub fn cursor(&self) -> i64 {
        self.last_row
    }

    /// Read everything appended since the previous poll.
    ///
    /// The row at the cursor is read back first. If it is gone or now holds
    /// a different hash, the ledger was cleared (and possibly refilled past
    /// the cursor): that is reported as `LedgerEvent::Cleared` and the pass
    /// restarts from the first row.
    pub fn poll(&mut self) -> AuditResult<Vec<LedgerEvent>> {
        let mut events = Vec::new();

        if self.cursor_row_replaced()? {
            debug!(cursor = self.last_row, "ledger cleared since last poll");
            events.push(LedgerEvent::Cleared { removed: None });
            self.last_row = 0;
            self.last_hash.clear();
            if self.verifier.is_some() {
                self.verifier = Some(ChainVerifier::new());
            }
        }

        for stored in EntryCursor::after(&self.store, self.last_row) {
            let stored = stored?;
            self.last_row = stored.row_id;
            self.last_hash.clone_from(&stored.entry.hash);
            events.push(LedgerEvent::Appended(stored));
        }
        Ok(events)
    }

    fn cursor_row_replaced(&self) -> AuditResult<bool> {
        if self.last_row == 0 {
            return Ok(false);
        }
        let page = self.store.read_page(self.last_row - 1, 1)?;
        Ok(match page.first() {
            Some(stored) => stored.row_id != self.last_row || stored.entry.hash != self.last_hash,
            None => true,
        })
    }

    /// Check a freshly polled entry against the running chain.
    ///
    /// Returns no findings when verification was not enabled.
    pub fn check(&mut self, event: &LedgerEvent) -> Vec<Finding> {
        match (self.verifier.as_mut(), event) {
            (Some(verifier), LedgerEvent::Appended(stored)) => verifier.observe(stored).to_vec(),
            _ => Vec::new(),
        }
    }
}
