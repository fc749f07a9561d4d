//! # audittrail-core
//!
//! The hash-chain core of the AuditTrail tamper-evident ledger.
//!
//! This crate provides:
//! - The `LedgerStore` trait: the storage boundary, ignorant of hashing
//! - Canonical entry hashing and the `ChainVerifier`
//! - The `ChainEngine`: single-writer append protocol, verification,
//!   administrative clear, and change subscriptions
//! - The `LedgerWatcher`: a polling consumer for out-of-process readers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use audittrail_contracts::EntryFields;
//! use audittrail_core::ChainEngine;
//!
//! let engine = ChainEngine::create(Arc::new(store))?;
//! engine.append_entry(EntryFields::new("GET", "/x", 200).user("alice"))?;
//! assert!(engine.verify()?.verified);
//! ```

pub mod chain;
pub mod engine;
pub mod traits;
pub mod watch;

pub use chain::{hash_entry, verify_chain, verify_stream, ChainVerifier};
pub use engine::{clamp_timestamp, link_entry, ChainEngine};
pub use traits::{EntryCursor, LedgerStore, DEFAULT_PAGE_SIZE};
pub use watch::LedgerWatcher;

// ── Tests ─────────────────────────────────────────────────────────────────────
