use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::export::ExportFormat;

/// AuditTrail: verify, inspect, and manage tamper-evident audit ledgers.
///
/// Every command that takes a LEDGER argument falls back to the default
/// ledger from the config file, then to `audit_log.db`.
#[derive(Parser)]
#[command(
    name = "audittrail",
    version,
    about = "Verify, inspect, and manage tamper-evident audit ledgers",
    long_about = "Verify, inspect, and manage tamper-evident audit ledgers.\n\
                  Each entry is chained to its predecessor with SHA-256; `verify`\n\
                  reports every edited, deleted, or reordered entry."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new empty ledger database.
    Init(LedgerArg),
    /// Upgrade a ledger written in the legacy unversioned layout.
    Migrate(LedgerArg),
    /// Record one entry.
    Append(AppendArgs),
    /// Verify the integrity of the ledger.
    Verify(VerifyArgs),
    /// Show recent log entries, newest first.
    Logs(LogsArgs),
    /// Search entries by user or endpoint.
    Search(SearchArgs),
    /// Export all entries to JSON or CSV.
    Export(ExportArgs),
    /// Show simple ledger statistics.
    Stats(LedgerArg),
    /// Clear all log entries. The chain restarts from a new genesis entry.
    Clear(ClearArgs),
    /// Stream new entries as they are appended (like tail -f).
    Watch(WatchArgs),
    /// View or change the user configuration.
    Config(ConfigArgs),
    /// Create new key material for payload encryption.
    Keygen(KeygenArgs),
}

#[derive(Args)]
pub struct LedgerArg {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,
}

#[derive(Args)]
pub struct AppendArgs {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,

    /// HTTP method, e.g. GET.
    #[arg(long)]
    pub method: String,

    /// Request path, e.g. /patients/42.
    #[arg(long)]
    pub path: String,

    /// Response status code.
    #[arg(long)]
    pub status: i64,

    /// Authenticated user; recorded as "anonymous" when omitted.
    #[arg(long)]
    pub user: Option<String>,

    /// Request body. Sealed when encryption is enabled.
    #[arg(long)]
    pub body: Option<String>,

    /// Response body. Sealed when encryption is enabled.
    #[arg(long)]
    pub response: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,

    /// Print the full report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,

    /// Number of recent entries to show.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Decrypt and show body and response with the configured key.
    #[arg(long)]
    pub decrypt: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,

    /// Filter by user (case-insensitive substring).
    #[arg(long)]
    pub user: Option<String>,

    /// Filter by endpoint path (case-insensitive substring).
    #[arg(long)]
    pub path: Option<String>,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,

    /// Destination file.
    #[arg(long, default_value = "audit_export.json")]
    pub out: PathBuf,
}

#[derive(Args)]
pub struct ClearArgs {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,

    /// Skip the confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Ledger database file.
    pub ledger: Option<PathBuf>,

    /// Seconds between refreshes. Defaults to `[watch] interval_secs`.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Check chain linkage of every entry as it arrives.
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Set the default ledger path.
    #[arg(long, value_name = "PATH")]
    pub set_default: Option<PathBuf>,

    /// Enable payload encryption with this key file.
    #[arg(long, value_name = "FILE", conflicts_with = "no_encryption")]
    pub key_file: Option<PathBuf>,

    /// Disable payload encryption for new entries.
    #[arg(long)]
    pub no_encryption: bool,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Where to write the new key. An existing file is never overwritten.
    #[arg(long)]
    pub out: PathBuf,
}
