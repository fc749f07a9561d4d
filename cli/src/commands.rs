//! Command handlers.
//!
//! Each handler returns `Ok(true)` on success and `Ok(false)` when the
//! command ran but the process should exit non-zero (an unverified chain,
//! a declined confirmation).

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use tracing::{debug, info};

use audittrail_cipher::{KeyMaterial, PayloadCipher, SealingProducer, BODY_FIELD, RESPONSE_FIELD};
use audittrail_config::{default_config_path, AuditConfig};
use audittrail_contracts::{AuditResult, AuditTrailError, EntryFields, LedgerEvent};
use audittrail_core::{ChainEngine, LedgerStore, LedgerWatcher};
use audittrail_store::SqliteLedgerStore;

use crate::cli::*;
use crate::export::export_entries;
use crate::query::{newest, LedgerStats, SearchFilter, SEARCH_LIMIT};
use crate::render;

pub const CLEAR_PROMPT: &str = "Are you sure you want to clear all logs?";

pub fn run_command(cli: Cli, config: &AuditConfig) -> AuditResult<bool> {
    match cli.command {
        Command::Init(args) => cmd_init(resolve_ledger(args.ledger, config)),
        Command::Migrate(args) => cmd_migrate(resolve_ledger(args.ledger, config)),
        Command::Append(args) => cmd_append(args, config),
        Command::Verify(args) => cmd_verify(args, config),
        Command::Logs(args) => cmd_logs(args, config),
        Command::Search(args) => cmd_search(args, config),
        Command::Export(args) => cmd_export(args, config),
        Command::Stats(args) => cmd_stats(resolve_ledger(args.ledger, config)),
        Command::Clear(args) => cmd_clear(args, config),
        Command::Watch(args) => cmd_watch(args, config),
        Command::Config(args) => cmd_config(args),
        Command::Keygen(args) => cmd_keygen(args),
    }
}

/// Command-line path, else the configured default (itself defaulting to
/// `audit_log.db`).
pub fn resolve_ledger(arg: Option<PathBuf>, config: &AuditConfig) -> PathBuf {
    arg.unwrap_or_else(|| config.ledger_path())
}

fn open_engine(path: &Path) -> AuditResult<ChainEngine> {
    let store = SqliteLedgerStore::open(path)?;
    debug!(ledger = %path.display(), "ledger opened");
    Ok(ChainEngine::new(Arc::new(store)))
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

fn cmd_init(path: PathBuf) -> AuditResult<bool> {
    if path.exists() {
        return Err(AuditTrailError::storage(format!(
            "{} already exists; refusing to initialize over it",
            path.display()
        )));
    }
    let store = SqliteLedgerStore::open_or_create(&path)?;
    ChainEngine::create(Arc::new(store))?;
    println!(
        "{}",
        format!("Initialized new ledger at {}", path.display()).green()
    );
    Ok(true)
}

fn cmd_migrate(path: PathBuf) -> AuditResult<bool> {
    if !path.exists() {
        return Err(AuditTrailError::storage(format!(
            "{} does not exist; nothing to migrate",
            path.display()
        )));
    }
    let store = SqliteLedgerStore::open_or_create(&path)?;
    println!(
        "{}",
        format!(
            "Ledger {} is at schema version {} ({} entries)",
            path.display(),
            store.schema_version()?,
            store.count()?
        )
        .green()
    );
    Ok(true)
}

fn cmd_clear(args: ClearArgs, config: &AuditConfig) -> AuditResult<bool> {
    let path = resolve_ledger(args.ledger, config);
    let engine = open_engine(&path)?;

    if !args.yes && !confirm(CLEAR_PROMPT) {
        println!("{}", "Aborted.".yellow());
        return Ok(false);
    }

    let removed = engine.clear()?;
    println!(
        "{}",
        format!("Ledger cleared ({} entries removed).", removed).red()
    );
    Ok(true)
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(_) => false,
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

// ── Writing ───────────────────────────────────────────────────────────────────

fn cmd_append(args: AppendArgs, config: &AuditConfig) -> AuditResult<bool> {
    let path = resolve_ledger(args.ledger, config);
    let engine = Arc::new(open_engine(&path)?);

    let mut fields = EntryFields::new(args.method, args.path, args.status);
    fields.user = args.user;
    fields.body = args.body;
    fields.response = args.response;

    let stored = match PayloadCipher::from_settings(&config.encryption)? {
        Some(cipher) => SealingProducer::new(engine, cipher).record(fields)?,
        None => engine.append_entry(fields)?,
    };

    println!(
        "{} row {} {}",
        "Appended".green(),
        stored.row_id,
        render::short_hash(&stored.entry.hash).dimmed()
    );
    Ok(true)
}

// ── Reading ───────────────────────────────────────────────────────────────────

fn cmd_verify(args: VerifyArgs, config: &AuditConfig) -> AuditResult<bool> {
    let path = resolve_ledger(args.ledger, config);
    let engine = open_engine(&path)?;
    let report = engine.verify()?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| {
            AuditTrailError::export(format!("failed to encode report: {}", e))
        })?;
        println!("{}", json);
    } else {
        for line in render::report_lines(&report) {
            println!("{}", line);
        }
    }
    Ok(report.verified)
}

fn cmd_logs(args: LogsArgs, config: &AuditConfig) -> AuditResult<bool> {
    let path = resolve_ledger(args.ledger, config);
    let engine = open_engine(&path)?;
    let cipher = if args.decrypt {
        Some(decryption_cipher(config)?)
    } else {
        None
    };

    let rows = newest(engine.read_all_ordered(), args.limit, |_| true)?;
    println!("{}\n", format!("Last {} log entries:", rows.len()).bold());
    for stored in &rows {
        println!("{}", render::entry_line(&stored.entry));
        if let Some(cipher) = &cipher {
            print_payload(cipher, BODY_FIELD, &stored.entry.body);
            print_payload(cipher, RESPONSE_FIELD, &stored.entry.response);
        }
    }
    Ok(true)
}

fn print_payload(cipher: &PayloadCipher, field: &str, stored: &str) {
    if stored.is_empty() {
        return;
    }
    match cipher.reveal(field, stored) {
        Ok(text) => println!("    {:<9}{}", format!("{}:", field), text),
        Err(e) => println!("    {:<9}{}", format!("{}:", field), e.to_string().red()),
    }
}

/// `logs --decrypt` needs a key even when new entries are not being sealed.
fn decryption_cipher(config: &AuditConfig) -> AuditResult<PayloadCipher> {
    let key_file = config.key_file().ok_or_else(|| {
        AuditTrailError::configuration(
            "--decrypt needs [encryption] key_file in the config; see `audittrail config --key-file`",
        )
    })?;
    Ok(PayloadCipher::new(&KeyMaterial::from_file(&key_file)?))
}

fn cmd_search(args: SearchArgs, config: &AuditConfig) -> AuditResult<bool> {
    let path = resolve_ledger(args.ledger, config);
    let engine = open_engine(&path)?;
    let filter = SearchFilter::new(args.user, args.path);

    let rows = newest(engine.read_all_ordered(), SEARCH_LIMIT, |e| filter.matches(e))?;
    if rows.is_empty() {
        println!("{}", "No matching entries found.".yellow());
        return Ok(true);
    }

    println!("{}\n", format!("Found {} entries:", rows.len()).bold());
    for stored in &rows {
        println!("{}", render::entry_line(&stored.entry));
    }
    Ok(true)
}

fn cmd_export(args: ExportArgs, config: &AuditConfig) -> AuditResult<bool> {
    let path = resolve_ledger(args.ledger, config);
    let engine = open_engine(&path)?;
    let count = export_entries(engine.read_all_ordered(), args.format, &args.out)?;
    info!(entries = count, out = %args.out.display(), "ledger exported");
    println!(
        "{}",
        format!("Exported {} entries to {}", count, args.out.display()).green()
    );
    Ok(true)
}

fn cmd_stats(path: PathBuf) -> AuditResult<bool> {
    let engine = open_engine(&path)?;
    let stats = LedgerStats::collect(engine.read_all_ordered())?;

    println!("{}", "Ledger Statistics:".bold());
    println!("Total entries: {}", stats.total.to_string().cyan());
    println!("Unique users:  {}", stats.users.len().to_string().cyan());
    println!("Requests by method:");
    for (method, count) in &stats.by_method {
        println!("  - {}: {}", method, count.to_string().blue());
    }
    Ok(true)
}

fn cmd_watch(args: WatchArgs, config: &AuditConfig) -> AuditResult<bool> {
    let path = resolve_ledger(args.ledger, config);
    let interval = Duration::from_secs(args.interval.unwrap_or(config.watch.interval_secs).max(1));

    let store = SqliteLedgerStore::open(&path)?;
    let mut watcher = LedgerWatcher::from_start(store);
    if args.verify {
        watcher = watcher.with_verification()?;
    }

    println!(
        "{}\n",
        "Watching for new entries (Ctrl+C to stop)".cyan().bold()
    );
    loop {
        for event in watcher.poll()? {
            match &event {
                LedgerEvent::Appended(stored) => {
                    println!("{}", render::entry_line(&stored.entry));
                }
                LedgerEvent::Cleared { .. } => {
                    println!("{}", "Ledger cleared; watching the new chain.".yellow());
                }
            }
            for finding in watcher.check(&event) {
                println!("{}", render::finding_line(&finding));
            }
        }
        thread::sleep(interval);
    }
}

// ── Setup ─────────────────────────────────────────────────────────────────────

fn cmd_config(args: ConfigArgs) -> AuditResult<bool> {
    let path = default_config_path()?;
    let changing = args.set_default.is_some() || args.key_file.is_some() || args.no_encryption;

    if !changing {
        if !path.exists() {
            println!(
                "{}",
                format!("No config file found at {}; using defaults.", path.display()).yellow()
            );
        } else {
            println!("{}", format!("Config file: {}", path.display()).cyan());
        }
        let config = AuditConfig::load_or_default(&path)?;
        print_config(&config);
        return Ok(true);
    }

    let mut config = AuditConfig::load_or_default(&path)?;
    if let Some(default) = args.set_default {
        println!(
            "{}",
            format!("Default ledger set to {}", default.display()).green()
        );
        config.ledger.path = default;
    }
    if let Some(key_file) = args.key_file {
        println!(
            "{}",
            format!("Encryption enabled with key {}", key_file.display()).green()
        );
        config.encryption.enabled = true;
        config.encryption.key_file = Some(key_file);
    }
    if args.no_encryption {
        println!("{}", "Encryption disabled for new entries.".yellow());
        config.encryption.enabled = false;
    }
    config.save(&path)?;
    Ok(true)
}

fn print_config(config: &AuditConfig) {
    println!("  ledger.path            = {}", config.ledger.path.display());
    println!("  encryption.enabled     = {}", config.encryption.enabled);
    match &config.encryption.key_file {
        Some(key_file) => println!("  encryption.key_file    = {}", key_file.display()),
        None => println!("  encryption.key_file    = (unset)"),
    }
    println!("  watch.interval_secs    = {}", config.watch.interval_secs);
}

fn cmd_keygen(args: KeygenArgs) -> AuditResult<bool> {
    KeyMaterial::generate().write_new(&args.out)?;
    println!(
        "{}",
        format!("Wrote new key to {}", args.out.display()).green()
    );
    println!(
        "Enable it with: audittrail config --key-file {}",
        args.out.display()
    );
    Ok(true)
}
