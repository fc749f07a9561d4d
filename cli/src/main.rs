//! AuditTrail CLI.
//!
//! Inspects and manages ledgers written by the chain engine. Commands open
//! the SQLite file directly, so they can run alongside the application that
//! is appending to it.
//!
//! Usage:
//!   audittrail init audit_log.db
//!   audittrail append --method GET --path /patients/42 --status 200 --user alice
//!   audittrail verify
//!   audittrail logs --limit 20
//!   audittrail watch --verify

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use audittrail_config::AuditConfig;

mod cli;
mod commands;
mod export;
mod query;
mod render;

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = cli::Cli::parse();

    let result = AuditConfig::load().and_then(|config| commands::run_command(cli, &config));

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
