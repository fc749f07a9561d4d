//! Terminal formatting.

use colored::{ColoredString, Colorize};

use audittrail_contracts::{Entry, Finding, VerificationReport};

/// Status code bands, colored green, yellow and red.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Redirect,
    Error,
}

impl StatusClass {
    pub fn of(status: i64) -> Self {
        if status < 300 {
            StatusClass::Success
        } else if status < 400 {
            StatusClass::Redirect
        } else {
            StatusClass::Error
        }
    }
}

pub fn colored_status(status: i64) -> ColoredString {
    let text = status.to_string();
    match StatusClass::of(status) {
        StatusClass::Success => text.green(),
        StatusClass::Redirect => text.yellow(),
        StatusClass::Error => text.red(),
    }
}

/// `timestamp | METHOD path | user | -> status`
pub fn entry_line(entry: &Entry) -> String {
    format!(
        "{} | {} {} | {} | -> {}",
        entry.timestamp,
        entry.method,
        entry.path,
        entry.user,
        colored_status(entry.status)
    )
}

/// The summary line of a report. Never says verified when there are findings.
pub fn verdict_line(report: &VerificationReport) -> ColoredString {
    if report.verified && report.findings.is_empty() {
        "Verified: true".green().bold()
    } else {
        "Verified: false".red().bold()
    }
}

pub fn finding_line(finding: &Finding) -> String {
    format!("  {} {}", "x".red(), finding)
}

/// Plain-text report, one finding per line.
pub fn report_lines(report: &VerificationReport) -> Vec<String> {
    let mut lines = vec![
        verdict_line(report).to_string(),
        format!("Entries checked: {}", report.entries_checked),
    ];
    if !report.head_hash.is_empty() {
        lines.push(format!("Head hash:       {}", report.head_hash));
    }
    if !report.findings.is_empty() {
        lines.push(format!(
            "{} finding(s) at position(s) {:?}:",
            report.findings.len(),
            report.tampered_positions()
        ));
        lines.extend(report.findings.iter().map(finding_line));
    }
    lines
}

/// Shorten a hash for one-line output.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
