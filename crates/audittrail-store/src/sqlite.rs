//! SQLite-backed ledger storage.
//!
//! One ledger is one database file with one `ledger` table. The table layout
//! is versioned through `PRAGMA user_version`:
//!
//! - version 0 (unversioned): legacy tables, either 7 columns
//!   (`ts, method, path, user, status, hash, prev_hash`) or 9 columns with
//!   `body`/`response`. `create_if_absent` migrates these.
//! - version 1: the canonical layout in [`LEDGER_TABLE_SQL`].
//!
//! Insertion order is SQLite's implicit `rowid`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior};
use tracing::info;

use audittrail_contracts::{AuditResult, AuditTrailError, Entry, StoredEntry};
use audittrail_core::LedgerStore;

/// Current ledger table layout version.
pub const SCHEMA_VERSION: i64 = 1;

/// Canonical ledger table, schema version 1. Column order is fixed.
pub const LEDGER_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS ledger (
    timestamp TEXT NOT NULL,
    method TEXT NOT NULL,
    path TEXT NOT NULL,
    user TEXT NOT NULL,
    status INTEGER NOT NULL,
    body TEXT,
    response TEXT,
    hash TEXT NOT NULL,
    prev_hash TEXT NOT NULL
)";

const SELECT_COLUMNS: &str =
    "rowid, timestamp, method, path, user, status, body, response, hash, prev_hash";

/// Attach a description to rusqlite failures, turning them into
/// `AuditTrailError::Storage`.
trait StorageContext<T> {
    fn ctx(self, context: &str) -> AuditResult<T>;
}

impl<T> StorageContext<T> for rusqlite::Result<T> {
    fn ctx(self, context: &str) -> AuditResult<T> {
        self.map_err(|e| AuditTrailError::storage(format!("{}: {}", context, e)))
    }
}

/// What an opened database holds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SchemaState {
    Missing,
    Legacy(Vec<String>),
    Current,
    Newer(i64),
}

/// A ledger stored in a single SQLite database.
///
/// The connection is guarded by a `Mutex`; every write is a single
/// transaction, so readers never observe a partially written entry.
#[derive(Debug)]
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteLedgerStore {
    /// Open an existing ledger.
    ///
    /// Fails with `AuditTrailError::Storage` when the file does not exist,
    /// holds no ledger table, or holds a layout that must be migrated first.
    pub fn open(path: &Path) -> AuditResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .ctx(&format!("open ledger {}", path.display()))?;
        configure(&conn)?;

        match schema_state(&conn)? {
            SchemaState::Current => {}
            SchemaState::Missing => {
                return Err(AuditTrailError::storage(format!(
                    "no ledger table in {}; run `audittrail init` first",
                    path.display()
                )))
            }
            SchemaState::Legacy(_) => {
                return Err(AuditTrailError::storage(format!(
                    "ledger {} uses the unversioned legacy layout; run `audittrail migrate` first",
                    path.display()
                )))
            }
            SchemaState::Newer(version) => return Err(unsupported_version(version)),
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a ledger, creating the file and table (or migrating a legacy
    /// table) as needed.
    pub fn open_or_create(path: &Path) -> AuditResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuditTrailError::storage(format!(
                    "create ledger directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path).ctx(&format!("open ledger {}", path.display()))?;
        configure(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.create_if_absent()?;
        Ok(store)
    }

    /// A private, empty ledger that lives only as long as the store.
    pub fn open_in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory().ctx("open in-memory ledger")?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.create_if_absent()?;
        Ok(store)
    }

    /// The database file, or `None` for an in-memory ledger.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The layout version recorded in the database.
    pub fn schema_version(&self) -> AuditResult<i64> {
        let conn = self.conn()?;
        user_version(&conn)
    }

    pub(crate) fn conn(&self) -> AuditResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AuditTrailError::storage(format!("ledger connection lock poisoned: {}", e)))
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn create_if_absent(&self) -> AuditResult<()> {
        let mut conn = self.conn()?;
        match schema_state(&conn)? {
            SchemaState::Current => Ok(()),
            SchemaState::Missing => {
                conn.execute_batch(&format!(
                    "BEGIN;\n{};\nPRAGMA user_version = {};\nCOMMIT;",
                    LEDGER_TABLE_SQL, SCHEMA_VERSION
                ))
                .ctx("create ledger table")?;
                info!(version = SCHEMA_VERSION, "ledger table created");
                Ok(())
            }
            SchemaState::Legacy(columns) => {
                let migrated = migrate_legacy(&mut conn, &columns)?;
                info!(
                    rows = migrated,
                    version = SCHEMA_VERSION,
                    "legacy ledger table migrated"
                );
                Ok(())
            }
            SchemaState::Newer(version) => Err(unsupported_version(version)),
        }
    }

    fn append(&self, entry: &Entry) -> AuditResult<StoredEntry> {
        let conn = self.conn()?;
        insert_entry(&conn, entry.clone())
    }

    fn last_entry(&self) -> AuditResult<Option<StoredEntry>> {
        let conn = self.conn()?;
        query_last(&conn)
    }

    fn read_page(&self, after_row: i64, limit: usize) -> AuditResult<Vec<StoredEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM ledger WHERE rowid > ?1 ORDER BY rowid ASC LIMIT ?2",
                SELECT_COLUMNS
            ))
            .ctx("prepare ledger page")?;
        let rows = stmt
            .query_map(params![after_row, limit as i64], row_to_stored)
            .ctx("query ledger page")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .ctx("read ledger row")
    }

    fn count(&self) -> AuditResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))
            .ctx("count ledger entries")?;
        Ok(count as u64)
    }

    fn clear(&self) -> AuditResult<u64> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM ledger", [])
            .ctx("clear ledger")?;
        Ok(removed as u64)
    }

    fn last_hash(&self) -> AuditResult<String> {
        let conn = self.conn()?;
        let hash: Option<Option<String>> = conn
            .query_row(
                "SELECT hash FROM ledger ORDER BY rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .ctx("read last hash")?;
        Ok(hash.flatten().unwrap_or_default())
    }

    /// Read the tail and insert its successor inside one `BEGIN IMMEDIATE`
    /// transaction, so concurrent writers in other processes cannot link to
    /// the same predecessor.
    fn append_linked(
        &self,
        link: &mut dyn FnMut(Option<&Entry>) -> AuditResult<Entry>,
    ) -> AuditResult<StoredEntry> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .ctx("begin append")?;

        let previous = query_last(&tx)?;
        let entry = link(previous.as_ref().map(|stored| &stored.entry))?;
        let stored = insert_entry(&tx, entry)?;

        tx.commit().ctx("commit append")?;
        Ok(stored)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn configure(conn: &Connection) -> AuditResult<()> {
    conn.busy_timeout(Duration::from_secs(5))
        .ctx("set busy timeout")?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .ctx("enable WAL journal")?;
    conn.execute_batch("PRAGMA synchronous=FULL;")
        .ctx("set synchronous mode")?;
    Ok(())
}

fn user_version(conn: &Connection) -> AuditResult<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .ctx("read schema version")
}

fn schema_state(conn: &Connection) -> AuditResult<SchemaState> {
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'ledger'",
            [],
            |row| row.get(0),
        )
        .ctx("inspect ledger table")?;
    if tables == 0 {
        return Ok(SchemaState::Missing);
    }

    let version = user_version(conn)?;
    if version == SCHEMA_VERSION {
        return Ok(SchemaState::Current);
    }
    if version > SCHEMA_VERSION {
        return Ok(SchemaState::Newer(version));
    }

    let mut stmt = conn
        .prepare("PRAGMA table_info(ledger)")
        .ctx("inspect ledger columns")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .ctx("inspect ledger columns")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .ctx("inspect ledger columns")?;
    Ok(SchemaState::Legacy(columns))
}

fn unsupported_version(version: i64) -> AuditTrailError {
    AuditTrailError::storage(format!(
        "ledger schema version {} is newer than supported version {}",
        version, SCHEMA_VERSION
    ))
}

/// Rebuild an unversioned table in the canonical column order.
///
/// Rows are copied verbatim in rowid order; `ts` becomes `timestamp` and
/// missing payload columns become empty strings. Hashes are never
/// recomputed, so entries written under another hashing scheme still fail
/// verification afterwards.
fn migrate_legacy(conn: &mut Connection, columns: &[String]) -> AuditResult<u64> {
    let has = |name: &str| columns.iter().any(|c| c == name);

    let timestamp = if has("timestamp") {
        "timestamp"
    } else if has("ts") {
        "ts"
    } else {
        return Err(AuditTrailError::storage(
            "legacy ledger table has no timestamp column",
        ));
    };
    for required in ["method", "path", "user", "status", "hash", "prev_hash"] {
        if !has(required) {
            return Err(AuditTrailError::storage(format!(
                "legacy ledger table has no '{}' column",
                required
            )));
        }
    }
    let body = if has("body") { "COALESCE(body, '')" } else { "''" };
    let response = if has("response") {
        "COALESCE(response, '')"
    } else {
        "''"
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .ctx("begin migration")?;
    tx.execute_batch(&format!(
        "{create};
         INSERT INTO ledger_v1 (timestamp, method, path, user, status, body, response, hash, prev_hash)
         SELECT COALESCE({timestamp}, ''), COALESCE(method, ''), COALESCE(path, ''),
                COALESCE(user, ''), COALESCE(status, 0), {body}, {response},
                COALESCE(hash, ''), COALESCE(prev_hash, '')
         FROM ledger ORDER BY rowid ASC;
         DROP TABLE ledger;
         ALTER TABLE ledger_v1 RENAME TO ledger;
         PRAGMA user_version = {version};",
        create = LEDGER_TABLE_SQL.replacen("ledger", "ledger_v1", 1),
        version = SCHEMA_VERSION,
    ))
    .ctx("migrate legacy ledger")?;
    let migrated: i64 = tx
        .query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))
        .ctx("count migrated entries")?;
    tx.commit().ctx("commit migration")?;
    Ok(migrated as u64)
}

fn query_last(conn: &Connection) -> AuditResult<Option<StoredEntry>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM ledger ORDER BY rowid DESC LIMIT 1",
            SELECT_COLUMNS
        ),
        [],
        row_to_stored,
    )
    .optional()
    .ctx("read last entry")
}

fn insert_entry(conn: &Connection, entry: Entry) -> AuditResult<StoredEntry> {
    conn.execute(
        "INSERT INTO ledger (timestamp, method, path, user, status, body, response, hash, prev_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.timestamp,
            entry.method,
            entry.path,
            entry.user,
            entry.status,
            entry.body,
            entry.response,
            entry.hash,
            entry.prev_hash,
        ],
    )
    .ctx("insert ledger entry")?;

    Ok(StoredEntry {
        row_id: conn.last_insert_rowid(),
        entry,
    })
}

/// Map a row selected with [`SELECT_COLUMNS`].
///
/// NULLs read as empty values so a hand-edited row is reported by
/// verification instead of aborting the read.
fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredEntry> {
    let text = |idx: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
    };
    Ok(StoredEntry {
        row_id: row.get(0)?,
        entry: Entry {
            timestamp: text(1)?,
            method: text(2)?,
            path: text(3)?,
            user: text(4)?,
            status: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
            body: text(6)?,
            response: text(7)?,
            hash: text(8)?,
            prev_hash: text(9)?,
        },
    })
}
