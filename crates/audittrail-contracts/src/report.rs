//! Chain verification report types.
//!
//! `verify()` always produces a `VerificationReport`. Tampering is data in
//! the report, never an error: the report is `verified` only when it carries
//! zero findings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How an entry broke the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingKind {
    /// The stored `prev_hash` does not equal the preceding entry's stored hash.
    #[serde(rename = "prev-hash mismatch")]
    PrevHashMismatch,

    /// The stored `hash` does not equal the digest recomputed from the
    /// entry's own fields.
    #[serde(rename = "hash mismatch")]
    HashMismatch,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::PrevHashMismatch => "prev-hash mismatch",
            FindingKind::HashMismatch => "hash mismatch",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chain violation located at one ledger position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 1-based position of the offending entry in insertion order.
    pub position: u64,
    /// Storage row id of the offending entry.
    pub row_id: i64,
    pub kind: FindingKind,
    /// Request path of the offending entry, to help operators locate it.
    pub path: String,
    /// The value verification derived independently.
    pub expected: String,
    /// The value found in storage.
    pub actual: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}: {} (path {}, expected {:?}, found {:?})",
            self.position, self.kind, self.path, self.expected, self.actual
        )
    }
}

/// The outcome of one verification pass over the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True iff `findings` is empty.
    pub verified: bool,
    /// Number of entries walked.
    pub entries_checked: u64,
    /// Stored hash of the last entry walked, or empty for an empty ledger.
    pub head_hash: String,
    /// Every violation found, in ledger order.
    pub findings: Vec<Finding>,
}

impl VerificationReport {
    /// Build a report, deriving `verified` from the findings.
    pub fn new(entries_checked: u64, head_hash: String, findings: Vec<Finding>) -> Self {
        Self {
            verified: findings.is_empty(),
            entries_checked,
            head_hash,
            findings,
        }
    }

    /// Positions with at least one finding, deduplicated, in ledger order.
    pub fn tampered_positions(&self) -> Vec<u64> {
        let mut positions: Vec<u64> = self.findings.iter().map(|f| f.position).collect();
        positions.dedup();
        positions
    }
}
