//! Error types for the AuditTrail ledger.
//!
//! All fallible ledger operations return `AuditResult<T>`. Tampering found
//! during verification is NOT an error: it is reported through
//! `VerificationReport` findings. Errors here mean the operation itself could
//! not complete.

use thiserror::Error;

/// The unified error type for the AuditTrail crates.
#[derive(Debug, Error)]
pub enum AuditTrailError {
    /// The backing store is unavailable, unwritable, or structurally broken
    /// (missing file or table, unsupported schema version, poisoned lock).
    ///
    /// Never retried: a retry after a partial write could double-append.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// Configuration or key material is missing or invalid.
    ///
    /// The requested operation is refused; nothing falls back to plaintext.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// A payload could not be sealed or opened.
    #[error("cipher error: {reason}")]
    Cipher { reason: String },

    /// An export destination could not be written.
    #[error("export failed: {reason}")]
    Export { reason: String },
}

impl AuditTrailError {
    /// Shorthand for `AuditTrailError::Storage`.
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Shorthand for `AuditTrailError::Configuration`.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for `AuditTrailError::Cipher`.
    pub fn cipher(reason: impl Into<String>) -> Self {
        Self::Cipher {
            reason: reason.into(),
        }
    }

    /// Shorthand for `AuditTrailError::Export`.
    pub fn export(reason: impl Into<String>) -> Self {
        Self::Export {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the AuditTrail crates.
pub type AuditResult<T> = Result<T, AuditTrailError>;
