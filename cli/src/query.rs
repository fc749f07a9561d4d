//! Selection and aggregation over a full ledger scan.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use audittrail_contracts::{AuditResult, Entry, StoredEntry};

/// Most entries `search` prints.
pub const SEARCH_LIMIT: usize = 50;

/// Case-insensitive substring filters; an unset filter matches everything.
#[derive(Debug, Default, Clone)]
pub struct SearchFilter {
    pub user: Option<String>,
    pub path: Option<String>,
}

impl SearchFilter {
    pub fn new(user: Option<String>, path: Option<String>) -> Self {
        Self {
            user: user.map(|u| u.to_lowercase()),
            path: path.map(|p| p.to_lowercase()),
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        contains(&entry.user, self.user.as_deref()) && contains(&entry.path, self.path.as_deref())
    }
}

fn contains(haystack: &str, needle: Option<&str>) -> bool {
    needle.map_or(true, |n| haystack.to_lowercase().contains(n))
}

/// The last `limit` entries accepted by `keep`, newest first.
pub fn newest<I, F>(entries: I, limit: usize, keep: F) -> AuditResult<Vec<StoredEntry>>
where
    I: IntoIterator<Item = AuditResult<StoredEntry>>,
    F: Fn(&Entry) -> bool,
{
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut window = VecDeque::with_capacity(limit.min(1024));
    for stored in entries {
        let stored = stored?;
        if !keep(&stored.entry) {
            continue;
        }
        if window.len() == limit {
            window.pop_front();
        }
        window.push_back(stored);
    }
    Ok(window.into_iter().rev().collect())
}

/// Totals shown by `audittrail stats`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub total: u64,
    pub users: BTreeSet<String>,
    pub by_method: BTreeMap<String, u64>,
}

impl LedgerStats {
    pub fn collect<I>(entries: I) -> AuditResult<Self>
    where
        I: IntoIterator<Item = AuditResult<StoredEntry>>,
    {
        let mut stats = Self::default();
        for stored in entries {
            let stored = stored?;
            stats.total += 1;
            stats.users.insert(stored.entry.user);
            *stats.by_method.entry(stored.entry.method).or_insert(0) += 1;
        }
        Ok(stats)
    }
}
