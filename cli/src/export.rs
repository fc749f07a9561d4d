//! Read-only dump of the ledger in storage column order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::ValueEnum;

use audittrail_contracts::{AuditResult, AuditTrailError, Entry, StoredEntry};

/// Export columns, in storage order.
pub const COLUMNS: [&str; 9] = [
    "timestamp",
    "method",
    "path",
    "user",
    "status",
    "body",
    "response",
    "hash",
    "prev_hash",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// A JSON array of objects.
    Json,
    /// A header row plus one row per entry.
    Csv,
}

/// Write every entry to `out` and return how many were written.
///
/// All entries are read before the destination is touched, so a storage
/// failure never leaves a partial export behind.
pub fn export_entries<I>(entries: I, format: ExportFormat, out: &Path) -> AuditResult<usize>
where
    I: IntoIterator<Item = AuditResult<StoredEntry>>,
{
    let entries = entries
        .into_iter()
        .map(|stored| stored.map(|s| s.entry))
        .collect::<AuditResult<Vec<Entry>>>()?;

    match format {
        ExportFormat::Json => write_json(&entries, out)?,
        ExportFormat::Csv => write_csv(&entries, out)?,
    }
    Ok(entries.len())
}

fn write_json(entries: &[Entry], out: &Path) -> AuditResult<()> {
    let file = File::create(out).map_err(|e| destination_error(out, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, entries)
        .map_err(|e| destination_error(out, e))?;
    writer.write_all(b"\n").map_err(|e| destination_error(out, e))?;
    writer.flush().map_err(|e| destination_error(out, e))
}

fn write_csv(entries: &[Entry], out: &Path) -> AuditResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(out)
        .map_err(|e| destination_error(out, e))?;
    writer
        .write_record(COLUMNS)
        .map_err(|e| destination_error(out, e))?;
    for entry in entries {
        writer
            .serialize(entry)
            .map_err(|e| destination_error(out, e))?;
    }
    writer.flush().map_err(|e| destination_error(out, e))
}

fn destination_error(out: &Path, e: impl std::fmt::Display) -> AuditTrailError {
    AuditTrailError::export(format!("cannot write {}: {}", out.display(), e))
}
