//! Filtered, paginated retrieval and statistics

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{AuditAction, AuditCategory, AuditEntry};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// Audit log filter. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub category: Option<AuditCategory>,
    pub action: Option<AuditAction>,
    pub success: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Case-insensitive substring of description, entity id or user id
    pub search: Option<String>,
    /// 1-based
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ref user_id) = self.user_id {
            if &entry.user_id != user_id {
                return false;
            }
        }
        if self.category.is_some_and(|c| c != entry.category) {
            return false;
        }
        if self.action.is_some_and(|a| a != entry.action) {
            return false;
        }
        if self.success.is_some_and(|s| s != entry.success) {
            return false;
        }
        if self.start_date.is_some_and(|start| entry.created_at < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| entry.created_at > end) {
            return false;
        }
        if let Some(ref needle) = self.search {
            let needle = needle.to_lowercase();
            let hit = entry.description.to_lowercase().contains(&needle)
                || entry.entity_id.to_lowercase().contains(&needle)
                || entry.user_id.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        true
    }

    /// All matching entries, newest first
    pub fn filter(&self, entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        let mut matching: Vec<AuditEntry> =
            entries.into_iter().filter(|e| self.matches(e)).collect();
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching
    }

    /// One page of matching entries, newest first
    pub fn paginate(&self, entries: Vec<AuditEntry>, default_limit: usize) -> AuditPage {
        let limit = self
            .limit
            .unwrap_or(default_limit)
            .clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).max(1);

        let matching = self.filter(entries);
        let total = matching.len();
        let entries = matching
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();

        AuditPage {
            entries,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Aggregate counts over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub days: u32,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub by_category: BTreeMap<AuditCategory, usize>,
    pub by_action: BTreeMap<AuditAction, usize>,
}

impl AuditStats {
    /// Count entries created within `days` before `now`
    pub fn compute(entries: &[AuditEntry], days: u32, now: DateTime<Utc>) -> Self {
        let since = now - Duration::days(days as i64);
        let mut stats = AuditStats {
            days,
            total: 0,
            successes: 0,
            failures: 0,
            by_category: BTreeMap::new(),
            by_action: BTreeMap::new(),
        };

        for entry in entries.iter().filter(|e| e.created_at >= since) {
            stats.total += 1;
            if entry.success {
                stats.successes += 1;
            } else {
                stats.failures += 1;
            }
            *stats.by_category.entry(entry.category).or_insert(0) += 1;
            *stats.by_action.entry(entry.action).or_insert(0) += 1;
        }

        stats
    }
}
