//! Filter evaluation over log entries.

use crate::model::{LogEntry, LogFilter};

impl LogFilter {
    /// Does `entry` satisfy every populated criterion?
    ///
    /// Criteria are checked in a fixed order: level, category, workflow id,
    /// run id, time range, free-text search. Empty level/category lists and
    /// an empty search string impose no constraint.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(levels) = self.level.as_deref().filter(|l| !l.is_empty()) {
            if !levels.contains(&entry.level) {
                return false;
            }
        }
        if let Some(categories) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if !categories.contains(&entry.category) {
                return false;
            }
        }
        if let Some(ref workflow_id) = self.workflow_id {
            if entry.workflow_id.as_ref() != Some(workflow_id) {
                return false;
            }
        }
        if let Some(ref run_id) = self.run_id {
            if entry.run_id.as_ref() != Some(run_id) {
                return false;
            }
        }
        if let Some(ref start) = self.start_time {
            if entry.timestamp.as_str() < start.as_str() {
                return false;
            }
        }
        if let Some(ref end) = self.end_time {
            if entry.timestamp.as_str() > end.as_str() {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().filter(|s| !s.is_empty()) {
            if !matches_search(entry, &needle.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// Filter then paginate a newest-first sequence.
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a LogEntry>) -> Vec<LogEntry> {
        entries
            .into_iter()
            .filter(|entry| self.matches(entry))
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}

fn matches_search(entry: &LogEntry, needle: &str) -> bool {
    if entry.message.to_lowercase().contains(needle) {
        return true;
    }

    let endpoint = entry
        .details
        .get("endpoint")
        .and_then(serde_json::Value::as_str);
    if endpoint.is_some_and(|endpoint| endpoint.to_lowercase().contains(needle)) {
        return true;
    }

    entry
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(needle))
}
