//! # audittrail-store
//!
//! Storage backends for the AuditTrail hash chain.
//!
//! - [`SqliteLedgerStore`]: the durable ledger, one SQLite file per ledger,
//!   with a versioned table layout and an explicit legacy migration.
//! - [`InMemoryLedgerStore`]: a volatile store for tests and embedding.
//!
//! Both implement [`audittrail_core::LedgerStore`] and know nothing about
//! hashing; pair them with [`audittrail_core::ChainEngine`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use audittrail_core::ChainEngine;
//! use audittrail_store::SqliteLedgerStore;
//!
//! let store = SqliteLedgerStore::open_or_create(Path::new("audit_log.db"))?;
//! let engine = ChainEngine::create(Arc::new(store))?;
//! ```

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLedgerStore;
pub use sqlite::{SqliteLedgerStore, LEDGER_TABLE_SQL, SCHEMA_VERSION};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use chrono::{Duration, TimeZone, Utc};
    use rusqlite::Connection;

    use audittrail_contracts::{
        AuditResult, AuditTrailError, Entry, EntryFields, FindingKind, LedgerEvent, StoredEntry,
    };
    use audittrail_core::{ChainEngine, EntryCursor, LedgerStore, LedgerWatcher};

    use super::{InMemoryLedgerStore, SqliteLedgerStore, SCHEMA_VERSION};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn sqlite_engine() -> (Arc<SqliteLedgerStore>, ChainEngine) {
        let store = Arc::new(SqliteLedgerStore::open_in_memory().unwrap());
        let engine = ChainEngine::create(store.clone()).unwrap();
        (store, engine)
    }

    fn memory_engine() -> (Arc<InMemoryLedgerStore>, ChainEngine) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let engine = ChainEngine::create(store.clone()).unwrap();
        (store, engine)
    }

    /// Run raw SQL against the store, bypassing the chain engine.
    fn sql(store: &SqliteLedgerStore, statement: &str) {
        store.conn().unwrap().execute_batch(statement).unwrap();
    }

    fn request(i: usize) -> EntryFields {
        EntryFields::new("GET", format!("/item/{i}"), 200).user("alice")
    }

    fn append_n(engine: &ChainEngine, n: usize) -> Vec<StoredEntry> {
        (0..n)
            .map(|i| engine.append_entry(request(i)).unwrap())
            .collect()
    }

    fn all(engine: &ChainEngine) -> Vec<StoredEntry> {
        engine
            .read_all_ordered()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    /// Replaces the whole ledger with another chain the first time a pass
    /// asks for its second page, as a concurrent clear and refill would.
    struct ReplacedMidPass {
        inner: InMemoryLedgerStore,
        replacement: Mutex<Option<Vec<Entry>>>,
    }

    impl LedgerStore for ReplacedMidPass {
        fn create_if_absent(&self) -> AuditResult<()> {
            self.inner.create_if_absent()
        }

        fn append(&self, entry: &Entry) -> AuditResult<StoredEntry> {
            self.inner.append(entry)
        }

        fn last_entry(&self) -> AuditResult<Option<StoredEntry>> {
            self.inner.last_entry()
        }

        fn read_page(&self, after_row: i64, limit: usize) -> AuditResult<Vec<StoredEntry>> {
            if after_row > 0 {
                if let Some(entries) = self.replacement.lock().unwrap().take() {
                    self.inner.clear()?;
                    for entry in &entries {
                        self.inner.append(entry)?;
                    }
                }
            }
            self.inner.read_page(after_row, limit)
        }

        fn count(&self) -> AuditResult<u64> {
            self.inner.count()
        }

        fn clear(&self) -> AuditResult<u64> {
            self.inner.clear()
        }
    }

    // ── Genesis and linkage ───────────────────────────────────────────────────

    #[test]
    fn test_genesis_entry_verifies() {
        for (engine, label) in [(sqlite_engine().1, "sqlite"), (memory_engine().1, "memory")] {
            let first = engine.append_entry(request(0)).unwrap();
            assert_eq!(first.entry.prev_hash, "", "{label}");
            let report = engine.verify().unwrap();
            assert!(report.verified, "{label}: {:?}", report.findings);
            assert_eq!(report.entries_checked, 1);
        }
    }

    #[test]
    fn test_sequential_appends_link() {
        for (engine, label) in [(sqlite_engine().1, "sqlite"), (memory_engine().1, "memory")] {
            append_n(&engine, 10);
            let entries = all(&engine);
            assert_eq!(entries.len(), 10, "{label}");
            for pair in entries.windows(2) {
                assert_eq!(pair[1].entry.prev_hash, pair[0].entry.hash, "{label}");
                assert!(pair[1].row_id > pair[0].row_id, "{label}");
            }
            assert!(engine.verify().unwrap().verified, "{label}");
        }
    }

    #[test]
    fn test_unknown_user_defaults_to_anonymous() {
        let (_, engine) = sqlite_engine();
        let stored = engine
            .append_entry(EntryFields::new("DELETE", "/z", 204))
            .unwrap();
        assert_eq!(stored.entry.user, "anonymous");
        assert_eq!(stored.entry.body, "");
        assert_eq!(stored.entry.response, "");
        assert_eq!(all(&engine)[0], stored);
    }

    #[test]
    fn test_payloads_are_stored_and_hashed_verbatim() {
        let (_, engine) = sqlite_engine();
        engine
            .append_entry(
                EntryFields::new("POST", "/y", 201)
                    .body("v1:c2VhbGVk")
                    .response("v1:b3BhcXVl"),
            )
            .unwrap();
        let stored = &all(&engine)[0];
        assert_eq!(stored.entry.body, "v1:c2VhbGVk");
        assert_eq!(stored.entry.response, "v1:b3BhcXVl");
        assert!(engine.verify().unwrap().verified);
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let (_, engine) = sqlite_engine();
        let later = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let first = engine.append_entry(request(0).at(later)).unwrap();
        let second = engine
            .append_entry(request(1).at(later - Duration::hours(1)))
            .unwrap();
        let third = engine.append_entry(request(2)).unwrap();
        assert_eq!(first.entry.timestamp, "2030-01-01T00:00:00.000000Z");
        assert_eq!(second.entry.timestamp, first.entry.timestamp);
        assert_eq!(third.entry.timestamp, first.entry.timestamp);
        assert!(engine.verify().unwrap().verified);
    }

    // ── Tamper detection ──────────────────────────────────────────────────────

    /// GET /x by alice, POST /y by bob, then the second row's status is edited.
    #[test]
    fn test_status_edit_reported_at_row_two() {
        let (store, engine) = sqlite_engine();
        engine
            .append_entry(EntryFields::new("GET", "/x", 200).user("alice"))
            .unwrap();
        engine
            .append_entry(EntryFields::new("POST", "/y", 201).user("bob"))
            .unwrap();
        assert!(engine.verify().unwrap().verified);

        sql(&store, "UPDATE ledger SET status = 500 WHERE rowid = 2");

        let report = engine.verify().unwrap();
        assert!(!report.verified);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].position, 2);
        assert_eq!(report.findings[0].kind, FindingKind::HashMismatch);
        assert_eq!(report.findings[0].path, "/y");
    }

    #[test]
    fn test_content_edit_does_not_cascade() {
        let (store, engine) = sqlite_engine();
        append_n(&engine, 8);
        sql(&store, "UPDATE ledger SET user = 'mallory' WHERE rowid = 4");

        let report = engine.verify().unwrap();
        assert_eq!(report.findings.len(), 1, "{:?}", report.findings);
        assert_eq!(report.findings[0].position, 4);
        assert_eq!(report.entries_checked, 8);
    }

    #[test]
    fn test_deleted_row_reported_at_successor() {
        let (store, engine) = sqlite_engine();
        append_n(&engine, 5);
        sql(&store, "DELETE FROM ledger WHERE rowid = 3");

        let report = engine.verify().unwrap();
        assert!(!report.verified);
        let found: Vec<(u64, i64, FindingKind)> = report
            .findings
            .iter()
            .map(|f| (f.position, f.row_id, f.kind))
            .collect();
        assert_eq!(
            found,
            vec![
                (3, 4, FindingKind::PrevHashMismatch),
                (3, 4, FindingKind::HashMismatch)
            ]
        );
    }

    #[test]
    fn test_memory_store_tamper_detected() {
        let (store, engine) = memory_engine();
        append_n(&engine, 4);
        store
            .tamper(|entries| entries[0].entry.path = "/forged".to_string())
            .unwrap();

        let report = engine.verify().unwrap();
        assert_eq!(report.tampered_positions(), vec![1]);
        assert_eq!(report.findings[0].path, "/forged");
    }

    #[test]
    fn test_null_column_is_reported_not_fatal() {
        let (store, engine) = sqlite_engine();
        append_n(&engine, 2);
        sql(&store, "UPDATE ledger SET body = NULL WHERE rowid = 1");
        assert!(engine.verify().unwrap().verified, "NULL body reads as empty");

        // NOT NULL columns reject NULL, so forge through a text edit instead.
        sql(&store, "UPDATE ledger SET method = '' WHERE rowid = 1");
        assert_eq!(engine.verify().unwrap().tampered_positions(), vec![1]);
    }

    // ── Verification properties ───────────────────────────────────────────────

    #[test]
    fn test_empty_ledger_verifies() {
        let (_, engine) = sqlite_engine();
        let report = engine.verify().unwrap();
        assert!(report.verified);
        assert_eq!(report.entries_checked, 0);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_verify_reruns_pass_when_ledger_replaced() {
        let rows = audittrail_core::DEFAULT_PAGE_SIZE + 40;
        let (_, other) = memory_engine();
        for i in 0..rows {
            other
                .append_entry(EntryFields::new("POST", format!("/other/{i}"), 201))
                .unwrap();
        }
        let replacement: Vec<Entry> = all(&other).into_iter().map(|s| s.entry).collect();

        let store = Arc::new(ReplacedMidPass {
            inner: InMemoryLedgerStore::new(),
            replacement: Mutex::new(Some(replacement)),
        });
        let engine = ChainEngine::create(store.clone()).unwrap();
        append_n(&engine, rows);

        let report = engine.verify().unwrap();
        assert!(report.verified, "{:?}", report.findings);
        assert_eq!(report.entries_checked, rows as u64);
        assert_eq!(report.head_hash, other.last_hash().unwrap());
    }

    #[test]
    fn test_verify_is_idempotent() {
        let (store, engine) = sqlite_engine();
        append_n(&engine, 3);
        assert_eq!(engine.verify().unwrap(), engine.verify().unwrap());

        sql(&store, "UPDATE ledger SET path = '/other' WHERE rowid = 2");
        assert_eq!(engine.verify().unwrap(), engine.verify().unwrap());
    }

    // ── Store operations ──────────────────────────────────────────────────────

    #[test]
    fn test_last_hash_tracks_tail() {
        let (store, engine) = sqlite_engine();
        assert_eq!(engine.last_hash().unwrap(), "");
        let entries = append_n(&engine, 3);
        assert_eq!(engine.last_hash().unwrap(), entries[2].entry.hash);
        assert_eq!(store.last_entry().unwrap().unwrap(), entries[2]);
    }

    #[test]
    fn test_read_all_ordered_is_paged_and_restartable() {
        let (store, engine) = sqlite_engine();
        let written = append_n(&engine, 5);

        let paged: Vec<StoredEntry> = EntryCursor::new(&*store)
            .with_page_size(2)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(paged, written);

        // A second pass starts again from the beginning.
        assert_eq!(all(&engine), written);
        assert_eq!(store.read_all_ordered().count(), 5);
    }

    #[test]
    fn test_create_if_absent_is_idempotent() {
        let store = SqliteLedgerStore::open_in_memory().unwrap();
        store.create_if_absent().unwrap();
        store.create_if_absent().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_clear_restarts_chain() {
        let (_, engine) = sqlite_engine();
        append_n(&engine, 4);
        let events = engine.subscribe();

        assert_eq!(engine.clear().unwrap(), 4);
        assert_eq!(engine.store().count().unwrap(), 0);
        assert_eq!(
            events.try_recv().unwrap(),
            LedgerEvent::Cleared { removed: Some(4) }
        );

        let first = engine.append_entry(request(9)).unwrap();
        assert_eq!(first.entry.prev_hash, "");
        assert!(engine.verify().unwrap().verified);
    }

    // ── Subscriptions ─────────────────────────────────────────────────────────

    #[test]
    fn test_subscribers_receive_appends() {
        let (_, engine) = memory_engine();
        let first_rx = engine.subscribe();
        let second_rx = engine.subscribe();

        let stored = engine.append_entry(request(0)).unwrap();
        assert_eq!(first_rx.try_recv().unwrap(), LedgerEvent::Appended(stored.clone()));
        assert_eq!(second_rx.try_recv().unwrap(), LedgerEvent::Appended(stored));

        drop(second_rx);
        let next = engine.append_entry(request(1)).unwrap();
        assert_eq!(first_rx.try_recv().unwrap(), LedgerEvent::Appended(next));
    }

    // ── Concurrency ───────────────────────────────────────────────────────────

    #[test]
    fn test_concurrent_producers_never_fork() {
        let (_, engine) = sqlite_engine();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..10 {
                        engine.append_entry(request(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = all(&engine);
        assert_eq!(entries.len(), 80);
        let prevs: HashSet<&str> = entries.iter().map(|s| s.entry.prev_hash.as_str()).collect();
        assert_eq!(prevs.len(), 80, "two entries share a predecessor");
        assert!(engine.verify().unwrap().verified);
    }

    /// Two engines on one file behave like two processes: the immediate
    /// transaction in `append_linked` keeps them on one chain.
    #[test]
    fn test_two_writers_on_one_file_share_a_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_log.db");
        let a = ChainEngine::create(Arc::new(SqliteLedgerStore::open_or_create(&path).unwrap()))
            .unwrap();
        let b = ChainEngine::new(Arc::new(SqliteLedgerStore::open(&path).unwrap()));

        for i in 0..6 {
            let engine = if i % 2 == 0 { &a } else { &b };
            engine.append_entry(request(i)).unwrap();
        }

        let report = a.verify().unwrap();
        assert!(report.verified, "{:?}", report.findings);
        assert_eq!(report.entries_checked, 6);
        assert_eq!(b.verify().unwrap(), report);
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    #[test]
    fn test_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit_log.db");

        {
            let engine =
                ChainEngine::create(Arc::new(SqliteLedgerStore::open_or_create(&path).unwrap()))
                    .unwrap();
            append_n(&engine, 3);
        }

        let store = SqliteLedgerStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let engine = ChainEngine::new(Arc::new(store));
        assert_eq!(engine.store().count().unwrap(), 3);
        engine.append_entry(request(3)).unwrap();
        assert!(engine.verify().unwrap().verified);
    }

    #[test]
    fn test_open_missing_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteLedgerStore::open(&dir.path().join("absent.db")).unwrap_err();
        assert!(matches!(err, AuditTrailError::Storage { .. }), "{err}");
    }

    #[test]
    fn test_open_without_table_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (x INTEGER);")
            .unwrap();

        let err = SqliteLedgerStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("no ledger table"), "{err}");
    }

    // ── Schema migration ──────────────────────────────────────────────────────

    fn write_legacy(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE ledger (ts TEXT, method TEXT, path TEXT, user TEXT, status INT, hash TEXT, prev_hash TEXT);
             INSERT INTO ledger VALUES ('2025-01-01T00:00:00+00:00', 'GET', '/a', 'alice', 200, 'h1', '');
             INSERT INTO ledger VALUES ('2025-01-01T00:00:01+00:00', 'POST', '/b', 'bob', 201, 'h2', 'h1');",
        )
        .unwrap();
    }

    #[test]
    fn test_legacy_layout_requires_migration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        write_legacy(&path);

        let err = SqliteLedgerStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("migrate"), "{err}");
    }

    #[test]
    fn test_legacy_layout_migrates_in_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        write_legacy(&path);

        let store = SqliteLedgerStore::open_or_create(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);

        let columns: Vec<String> = {
            let conn = store.conn().unwrap();
            let mut stmt = conn.prepare("PRAGMA table_info(ledger)").unwrap();
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))
                .unwrap()
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            names
        };
        assert_eq!(
            columns,
            vec![
                "timestamp", "method", "path", "user", "status", "body", "response", "hash",
                "prev_hash"
            ]
        );

        let entries: Vec<StoredEntry> = store
            .read_all_ordered()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry.timestamp, "2025-01-01T00:00:00+00:00");
        assert_eq!(entries[0].entry.body, "");
        assert_eq!(entries[1].entry.path, "/b");
        assert_eq!(entries[1].entry.prev_hash, "h1");
        assert_eq!(entries[1].entry.hash, "h2");

        // Migration never re-signs history: legacy hashes stay unverifiable.
        let engine = ChainEngine::new(Arc::new(store));
        let report = engine.verify().unwrap();
        assert_eq!(report.findings.len(), 2);
        assert!(report
            .findings
            .iter()
            .all(|f| f.kind == FindingKind::HashMismatch));
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            SqliteLedgerStore::open_or_create(&path).unwrap();
        }
        Connection::open(&path)
            .unwrap()
            .execute_batch("PRAGMA user_version = 7;")
            .unwrap();

        let err = SqliteLedgerStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("newer than supported"), "{err}");
        assert!(SqliteLedgerStore::open_or_create(&path).is_err());
    }

    // ── Watcher ───────────────────────────────────────────────────────────────

    #[test]
    fn test_watcher_reports_only_new_entries() {
        let (store, engine) = sqlite_engine();
        append_n(&engine, 3);

        let mut watcher = LedgerWatcher::from_tail(store.clone()).unwrap();
        assert!(watcher.poll().unwrap().is_empty());

        let fresh = engine.append_entry(request(3)).unwrap();
        assert_eq!(watcher.poll().unwrap(), vec![LedgerEvent::Appended(fresh.clone())]);
        assert!(watcher.poll().unwrap().is_empty());
        assert_eq!(watcher.cursor(), fresh.row_id);
    }

    #[test]
    fn test_watcher_from_start_replays_history() {
        let (store, engine) = memory_engine();
        append_n(&engine, 2);
        let mut watcher = LedgerWatcher::from_start(store);
        assert_eq!(watcher.poll().unwrap().len(), 2);
    }

    #[test]
    fn test_watcher_detects_clear() {
        let (store, engine) = sqlite_engine();
        append_n(&engine, 3);
        let mut watcher = LedgerWatcher::from_tail(store.clone()).unwrap();

        engine.clear().unwrap();
        let first = engine.append_entry(request(0)).unwrap();

        let events = watcher.poll().unwrap();
        assert_eq!(
            events,
            vec![
                LedgerEvent::Cleared { removed: None },
                LedgerEvent::Appended(first)
            ]
        );
    }

    #[test]
    fn test_watcher_detects_clear_refilled_past_cursor() {
        let (store, engine) = sqlite_engine();
        append_n(&engine, 2);
        let mut watcher = LedgerWatcher::from_tail(store.clone()).unwrap();

        engine.clear().unwrap();
        let refill = append_n(&engine, 3);

        let mut expected = vec![LedgerEvent::Cleared { removed: None }];
        expected.extend(refill.iter().cloned().map(LedgerEvent::Appended));
        assert_eq!(watcher.poll().unwrap(), expected);
        assert_eq!(watcher.cursor(), refill[2].row_id);
        assert!(watcher.poll().unwrap().is_empty());
    }

    #[test]
    fn test_watcher_detects_clear_refilled_to_cursor() {
        let (store, engine) = memory_engine();
        append_n(&engine, 2);
        let mut watcher = LedgerWatcher::from_tail(store.clone())
            .unwrap()
            .with_verification()
            .unwrap();

        engine.clear().unwrap();
        let refill: Vec<StoredEntry> = (10..12)
            .map(|i| engine.append_entry(request(i)).unwrap())
            .collect();
        assert_eq!(refill[1].row_id, watcher.cursor());

        let events = watcher.poll().unwrap();
        assert_eq!(events.len(), 3, "{events:?}");
        assert_eq!(events[0], LedgerEvent::Cleared { removed: None });
        for event in &events {
            assert!(watcher.check(event).is_empty(), "new chain verifies from genesis");
        }
    }

    #[test]
    fn test_watcher_verification_flags_forged_entry() {
        let (store, engine) = sqlite_engine();
        let existing = append_n(&engine, 2);
        let mut watcher = LedgerWatcher::from_tail(store.clone())
            .unwrap()
            .with_verification()
            .unwrap();

        let good = engine.append_entry(request(2)).unwrap();
        let mut forged = good.entry.clone();
        forged.prev_hash = existing[1].entry.hash.clone();
        store.append(&forged).unwrap();

        let events = watcher.poll().unwrap();
        assert_eq!(events.len(), 2);
        assert!(watcher.check(&events[0]).is_empty());
        let findings = watcher.check(&events[1]);
        let kinds: Vec<FindingKind> = findings.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![FindingKind::PrevHashMismatch, FindingKind::HashMismatch]
        );
        assert!(findings.iter().all(|f| f.position == 4));
    }
}
