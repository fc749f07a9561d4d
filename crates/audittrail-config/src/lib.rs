//! # audittrail-config
//!
//! The user configuration file shared by the AuditTrail tools.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use audittrail_config::AuditConfig;
//!
//! let config = AuditConfig::load()?;
//! let ledger = config.ledger_path();
//! ```
//!
//! ## Sections
//!
//! - `[ledger] path`: default ledger file for commands given no path.
//! - `[encryption] enabled, key_file`: payload sealing for `append`.
//! - `[watch] interval_secs`: poll interval of `watch`.

pub mod loader;
pub mod settings;

pub use loader::{default_config_path, expand_home, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
pub use settings::{
    AuditConfig, EncryptionSettings, LedgerSettings, WatchSettings, DEFAULT_LEDGER_PATH,
    DEFAULT_WATCH_INTERVAL_SECS,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
