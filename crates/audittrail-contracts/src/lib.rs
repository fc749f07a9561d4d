//! # audittrail-contracts
//!
//! Shared types and errors for the AuditTrail tamper-evident ledger.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod entry;
pub mod error;
pub mod event;
pub mod report;

pub use entry::{Entry, EntryFields, StoredEntry, ANONYMOUS_USER, GENESIS_PREV_HASH};
pub use error::{AuditResult, AuditTrailError};
pub use event::LedgerEvent;
pub use report::{Finding, FindingKind, VerificationReport};
