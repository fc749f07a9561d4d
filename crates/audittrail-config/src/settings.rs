//! Configuration schema.
//!
//! An `AuditConfig` is deserialized from TOML. Every section and every key is
//! optional; anything left out takes the default shown below.
//!
//! ```toml
//! [ledger]
//! path = "~/audit/audit_log.db"
//!
//! [encryption]
//! enabled = true
//! key_file = "~/.audittrail.key"
//!
//! [watch]
//! interval_secs = 2
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Ledger file used when neither the command line nor the config names one.
pub const DEFAULT_LEDGER_PATH: &str = "audit_log.db";

/// Poll interval of `audittrail watch` when the config does not set one.
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 2;

/// The whole user configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub ledger: LedgerSettings,
    pub encryption: EncryptionSettings,
    pub watch: WatchSettings,
}

/// `[ledger]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Default ledger file. A leading `~` is expanded to the home directory.
    pub path: PathBuf,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LEDGER_PATH),
        }
    }
}

/// `[encryption]`
///
/// When `enabled` is true, `key_file` must name a key created by
/// `audittrail keygen`. A missing or unreadable key refuses the operation;
/// payloads are never written in plaintext instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

/// `[watch]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub interval_secs: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
        }
    }
}
