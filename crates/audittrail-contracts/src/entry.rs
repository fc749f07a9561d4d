//! Ledger entry types.
//!
//! `EntryFields` is what an event producer hands to the chain engine.
//! `Entry` is the completed, immutable record with its hash linkage, and
//! `StoredEntry` is an `Entry` as read back from storage together with its
//! insertion row id.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The `user` recorded when the producer could not resolve an actor.
pub const ANONYMOUS_USER: &str = "anonymous";

/// The `prev_hash` of the first entry in every ledger.
pub const GENESIS_PREV_HASH: &str = "";

/// Render a timestamp in the ledger's canonical text form.
///
/// RFC 3339, UTC, microsecond precision, `Z` suffix. The stored text is what
/// gets hashed, so this format must never change for schema version 1.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back into a `DateTime<Utc>`.
///
/// Returns `None` for text that is not valid RFC 3339 (for example a row
/// edited by hand).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// A candidate entry submitted by an event producer.
///
/// Carries no hash fields; the chain engine assigns `timestamp` (unless
/// supplied), `hash`, and `prev_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFields {
    pub method: String,
    pub path: String,
    /// Resolved actor, or `None` for [`ANONYMOUS_USER`].
    pub user: Option<String>,
    pub status: i64,
    pub body: Option<String>,
    pub response: Option<String>,
    /// Explicit event time. When absent the engine uses the current time.
    pub timestamp: Option<DateTime<Utc>>,
}

impl EntryFields {
    pub fn new(method: impl Into<String>, path: impl Into<String>, status: i64) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            user: None,
            status,
            body: None,
            response: None,
            timestamp: None,
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// One audited event, immutable once appended.
///
/// Field order matches the storage column order and the export format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// RFC 3339 UTC text, see [`format_timestamp`].
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub user: String,
    pub status: i64,
    /// Opaque payload; empty when absent. Ciphertext when confidentiality is on.
    pub body: String,
    /// Opaque payload; empty when absent. Ciphertext when confidentiality is on.
    pub response: String,
    /// Lowercase hex SHA-256 over the canonical content and `prev_hash`.
    pub hash: String,
    /// `hash` of the preceding entry, or [`GENESIS_PREV_HASH`].
    pub prev_hash: String,
}

impl Entry {
    /// True when this entry claims to be the first in its chain.
    pub fn is_genesis(&self) -> bool {
        self.prev_hash == GENESIS_PREV_HASH
    }

    /// The stored timestamp parsed as a `DateTime<Utc>`, if well-formed.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// An `Entry` read back from a store, tagged with its insertion row id.
///
/// Row ids increase strictly with insertion order but are not guaranteed to
/// be contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub row_id: i64,
    #[serde(flatten)]
    pub entry: Entry,
}
