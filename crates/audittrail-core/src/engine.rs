//! The chain engine: the single writer of the ledger.
//!
//! Append path:
//!
//!   writer lock → last entry → timestamp → hash → persist → notify
//!
//! The invariant is that no two appends ever link to the same predecessor.
//! Inside one process the writer `Mutex` serializes appends; across
//! processes the store's `append_linked` supplies the exclusion (SQLite runs
//! it as one immediate transaction).

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use audittrail_contracts::{
    entry::format_timestamp, AuditResult, AuditTrailError, Entry, EntryFields, LedgerEvent,
    StoredEntry, VerificationReport, ANONYMOUS_USER, GENESIS_PREV_HASH,
};

use crate::chain::{hash_entry, verify_stream};
use crate::traits::{EntryCursor, LedgerStore};

/// Passes `verify` starts before giving up on a ledger that keeps being
/// replaced underneath it.
const VERIFY_ATTEMPTS: u32 = 3;

/// Forward clamps larger than this are logged at `warn`.
const CLAMP_WARN_SECS: i64 = 300;

/// Enforces the hash-chain invariants on write and detects their violation
/// on read.
///
/// Construct one engine per ledger and share it (`Arc<ChainEngine>`) between
/// every producer in the process.
pub struct ChainEngine {
    store: Arc<dyn LedgerStore>,
    writer: Mutex<()>,
    subscribers: Mutex<Vec<Sender<LedgerEvent>>>,
}

impl ChainEngine {
    /// Wrap a store whose entry table already exists.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Wrap a store, creating its entry table first if needed.
    pub fn create(store: Arc<dyn LedgerStore>) -> AuditResult<Self> {
        store.create_if_absent()?;
        let engine = Self::new(store);
        info!(
            entries = engine.store.count()?,
            head = %engine.store.last_hash()?,
            "ledger opened"
        );
        Ok(engine)
    }

    /// The underlying store, for read-only inspection.
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Append one event to the chain.
    ///
    /// # Protocol
    ///
    /// 1. Acquire the writer lock.
    /// 2. Read the previous entry; its hash becomes `prev_hash` (`""` when
    ///    the ledger is empty).
    /// 3. Use the caller's timestamp or the current time, clamped so it never
    ///    precedes the previous entry's timestamp.
    /// 4. Hash the canonical content together with `prev_hash`.
    /// 5. Persist, then notify subscribers.
    ///
    /// # Errors
    ///
    /// Returns `AuditTrailError::Storage` if the store fails or the writer
    /// lock is poisoned. Nothing is retried.
    pub fn append_entry(&self, fields: EntryFields) -> AuditResult<StoredEntry> {
        let _writer = self.writer.lock().map_err(|e| {
            AuditTrailError::storage(format!("ledger writer lock poisoned: {}", e))
        })?;

        let stored = self
            .store
            .append_linked(&mut |previous| Ok(link_entry(&fields, previous)))?;

        debug!(
            row_id = stored.row_id,
            method = %stored.entry.method,
            path = %stored.entry.path,
            status = stored.entry.status,
            hash = %stored.entry.hash,
            "ledger entry appended"
        );

        self.broadcast(LedgerEvent::Appended(stored.clone()));
        Ok(stored)
    }

    /// Walk the whole ledger and re-derive every hash.
    ///
    /// Always completes with a report when storage is readable; tampering is
    /// reported as findings, never as an error.
    ///
    /// A paged pass is not a snapshot: another process may clear and refill
    /// the ledger between two pages. The first row is read back after each
    /// pass, and a pass whose first row was replaced is discarded and rerun.
    /// `AuditTrailError::Storage` is returned if that keeps happening.
    pub fn verify(&self) -> AuditResult<VerificationReport> {
        let report = self.verify_consistent_pass()?;
        if report.verified {
            info!(
                entries = report.entries_checked,
                head = %report.head_hash,
                "ledger verified"
            );
        } else {
            warn!(
                entries = report.entries_checked,
                findings = report.findings.len(),
                "ledger verification found tampering"
            );
        }
        Ok(report)
    }

    fn verify_consistent_pass(&self) -> AuditResult<VerificationReport> {
        for attempt in 1..=VERIFY_ATTEMPTS {
            let mut first: Option<(i64, String)> = None;
            let report = verify_stream(self.read_all_ordered().inspect(|stored| {
                if first.is_none() {
                    if let Ok(stored) = stored {
                        first = Some((stored.row_id, stored.entry.hash.clone()));
                    }
                }
            }))?;

            let Some(first) = first else {
                return Ok(report);
            };
            let current = self
                .store
                .read_page(0, 1)?
                .into_iter()
                .next()
                .map(|stored| (stored.row_id, stored.entry.hash));
            if current.as_ref() == Some(&first) {
                return Ok(report);
            }
            warn!(attempt, "ledger replaced during verification; restarting pass");
        }
        Err(AuditTrailError::storage(format!(
            "ledger was replaced during each of {} verification passes",
            VERIFY_ATTEMPTS
        )))
    }

    /// A fresh, lazy pass over every entry in insertion order.
    pub fn read_all_ordered(&self) -> EntryCursor<'_> {
        EntryCursor::new(self.store.as_ref())
    }

    /// The hash the next appended entry will link to.
    pub fn last_hash(&self) -> AuditResult<String> {
        self.store.last_hash()
    }

    /// Wipe the entire ledger.
    ///
    /// The chain restarts from a new genesis entry. Callers must obtain
    /// explicit operator confirmation before calling it.
    pub fn clear(&self) -> AuditResult<u64> {
        let _writer = self.writer.lock().map_err(|e| {
            AuditTrailError::storage(format!("ledger writer lock poisoned: {}", e))
        })?;

        let removed = self.store.clear()?;
        warn!(removed, "ledger cleared; hash chain restarted from genesis");

        self.broadcast(LedgerEvent::Cleared {
            removed: Some(removed),
        });
        Ok(removed)
    }

    /// Receive every `LedgerEvent` this engine produces from now on.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<LedgerEvent> {
        let (tx, rx) = mpsc::channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    fn broadcast(&self, event: LedgerEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Build the entry that follows `previous` in the chain.
pub fn link_entry(fields: &EntryFields, previous: Option<&Entry>) -> Entry {
    let requested = fields.timestamp.unwrap_or_else(Utc::now);
    let (timestamp, shift) = clamp_timestamp(requested, previous.and_then(Entry::recorded_at));
    if let Some(shift) = shift {
        if shift > Duration::seconds(CLAMP_WARN_SECS) {
            warn!(
                requested = %format_timestamp(&requested),
                clamped_to = %format_timestamp(&timestamp),
                shift_secs = shift.num_seconds(),
                "previous entry is far in the future; timestamp clamped forward"
            );
        } else {
            debug!(shift_ms = shift.num_milliseconds(), "timestamp clamped forward");
        }
    }

    let prev_hash = previous
        .map(|p| p.hash.clone())
        .unwrap_or_else(|| GENESIS_PREV_HASH.to_string());

    let mut entry = Entry {
        timestamp: format_timestamp(&timestamp),
        method: fields.method.clone(),
        path: fields.path.clone(),
        user: fields
            .user
            .clone()
            .unwrap_or_else(|| ANONYMOUS_USER.to_string()),
        status: fields.status,
        body: fields.body.clone().unwrap_or_default(),
        response: fields.response.clone().unwrap_or_default(),
        hash: String::new(),
        prev_hash,
    };
    entry.hash = hash_entry(&entry, &entry.prev_hash);
    entry
}

/// Never let `requested` precede the previous entry's timestamp.
///
/// Returns the timestamp to record and, when it was moved, how far forward.
pub fn clamp_timestamp(
    requested: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, Option<Duration>) {
    match previous {
        Some(prev) if requested < prev => (prev, Some(prev - requested)),
        _ => (requested, None),
    }
}
