//! Hash-chain primitives: canonical hashing and chain verification.
//!
//! Hash input layout, schema version 1 (bytes, in order):
//!   1. the ASCII domain tag `audittrail.entry.v1`
//!   2. eight frames: timestamp, method, path, user, status (decimal ASCII),
//!      body, response, prev_hash
//!
//! Each frame is the field's byte length as 8-byte little-endian followed by
//! the UTF-8 bytes. Length framing keeps the encoding injective: no two
//! distinct field tuples share a hash input.

use sha2::{Digest, Sha256};
use tracing::warn;

use audittrail_contracts::{
    AuditResult, Entry, Finding, FindingKind, StoredEntry, VerificationReport, GENESIS_PREV_HASH,
};

/// Domain separation tag prefixed to every hash input.
pub const CANONICAL_DOMAIN: &[u8] = b"audittrail.entry.v1";

fn frame(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Compute the SHA-256 hash binding `entry`'s content to `prev_hash`.
///
/// Only the content fields are read from `entry`; its own `hash` and
/// `prev_hash` fields are ignored so callers can recompute against any
/// linkage. Returns a lowercase 64-character hex string.
pub fn hash_entry(entry: &Entry, prev_hash: &str) -> String {
    let status = entry.status.to_string();

    let mut hasher = Sha256::new();
    hasher.update(CANONICAL_DOMAIN);
    frame(&mut hasher, entry.timestamp.as_bytes());
    frame(&mut hasher, entry.method.as_bytes());
    frame(&mut hasher, entry.path.as_bytes());
    frame(&mut hasher, entry.user.as_bytes());
    frame(&mut hasher, status.as_bytes());
    frame(&mut hasher, entry.body.as_bytes());
    frame(&mut hasher, entry.response.as_bytes());
    frame(&mut hasher, prev_hash.as_bytes());

    hex::encode(hasher.finalize())
}

/// Incremental chain verifier.
///
/// Feed entries in insertion order with [`observe`](Self::observe), then
/// call [`finish`](Self::finish). Two rules are checked per entry:
///
/// 1. **Prev-hash linkage**: the stored `prev_hash` equals the stored `hash`
///    of the entry before it (or `""` for the first entry).
/// 2. **Hash correctness**: the stored `hash` equals the digest recomputed
///    from the entry's own fields and the expected previous hash.
///
/// Verification never stops at a finding. The running expectation advances
/// to each entry's *stored* hash, so one edited entry is reported once
/// instead of cascading through the rest of the chain.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    expected_prev: String,
    position: u64,
    findings: Vec<Finding>,
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainVerifier {
    /// A verifier positioned before the genesis entry.
    pub fn new() -> Self {
        Self::resume(GENESIS_PREV_HASH, 0)
    }

    /// A verifier that continues after `position` entries whose last stored
    /// hash was `head_hash`.
    pub fn resume(head_hash: impl Into<String>, position: u64) -> Self {
        Self {
            expected_prev: head_hash.into(),
            position,
            findings: Vec::new(),
        }
    }

    /// Check the next entry. Returns the findings it produced, if any.
    pub fn observe(&mut self, stored: &StoredEntry) -> &[Finding] {
        self.position += 1;
        let first_new = self.findings.len();
        let entry = &stored.entry;

        if entry.prev_hash != self.expected_prev {
            let expected = self.expected_prev.clone();
            self.record(
                stored,
                FindingKind::PrevHashMismatch,
                expected,
                entry.prev_hash.clone(),
            );
        }

        let recomputed = hash_entry(entry, &self.expected_prev);
        if recomputed != entry.hash {
            self.record(stored, FindingKind::HashMismatch, recomputed, entry.hash.clone());
        }

        self.expected_prev = entry.hash.clone();
        &self.findings[first_new..]
    }

    /// Number of entries observed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The stored hash the next entry must link to.
    pub fn head_hash(&self) -> &str {
        &self.expected_prev
    }

    pub fn finish(self) -> VerificationReport {
        VerificationReport::new(self.position, self.expected_prev, self.findings)
    }

    fn record(
        &mut self,
        stored: &StoredEntry,
        kind: FindingKind,
        expected: String,
        actual: String,
    ) {
        warn!(
            position = self.position,
            row_id = stored.row_id,
            path = %stored.entry.path,
            kind = %kind,
            "hash chain broken"
        );
        self.findings.push(Finding {
            position: self.position,
            row_id: stored.row_id,
            kind,
            path: stored.entry.path.clone(),
            expected,
            actual,
        });
    }
}

/// Verify a complete, in-memory chain.
///
/// An empty slice is a valid chain.
pub fn verify_chain(entries: &[StoredEntry]) -> VerificationReport {
    let mut verifier = ChainVerifier::new();
    for stored in entries {
        verifier.observe(stored);
    }
    verifier.finish()
}

/// Verify a chain streamed from storage.
///
/// Fails only if reading fails; tampering is reported in the result.
pub fn verify_stream<I>(entries: I) -> AuditResult<VerificationReport>
where
    I: IntoIterator<Item = AuditResult<StoredEntry>>,
{
    let mut verifier = ChainVerifier::new();
    for stored in entries {
        verifier.observe(&stored?);
    }
    Ok(verifier.finish())
}
