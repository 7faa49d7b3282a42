//! Core data model.
//!
//! Log entries are the aggregator's unit of record: immutable once written,
//! tagged with a level, a category and optional correlation ids that group
//! them under a higher-level workflow run.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::Error;

// ---------------------------------------------------------------------------
// Level / Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Info,
        LogLevel::Success,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Debug,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Validation(format!("unknown log level: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Workflow,
    Api,
    System,
    User,
    Performance,
}

impl LogCategory {
    pub const ALL: [LogCategory; 5] = [
        LogCategory::Workflow,
        LogCategory::Api,
        LogCategory::System,
        LogCategory::User,
        LogCategory::Performance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogCategory::Workflow => "workflow",
            LogCategory::Api => "api",
            LogCategory::System => "system",
            LogCategory::User => "user",
            LogCategory::Performance => "performance",
        }
    }
}

impl std::fmt::Display for LogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Validation(format!("unknown log category: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Log Entry
// ---------------------------------------------------------------------------

/// One aggregated log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,

    /// ISO-8601, millisecond precision, UTC (`2024-05-01T12:00:00.000Z`).
    /// Fixed width, so lexicographic order is chronological order.
    pub timestamp: String,

    pub level: LogLevel,
    pub category: LogCategory,
    pub message: String,

    /// Arbitrary structured payload. `details.endpoint` participates in search.
    #[serde(default)]
    pub details: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Elapsed milliseconds for timed operations.
    #[serde(default, rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Render an instant the way log entries store it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Correlation ids and timing attached to a log call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    pub workflow_id: Option<String>,
    pub run_id: Option<String>,
    pub user_id: Option<String>,
    pub duration_ms: Option<u64>,
    pub tags: BTreeSet<String>,
}

impl Correlation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workflow(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn run(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Query over the log buffer. All populated fields must match.
#[derive(Debug, Clone, PartialEq)]
pub struct LogFilter {
    pub level: Option<Vec<LogLevel>>,
    pub category: Option<Vec<LogCategory>>,
    pub workflow_id: Option<String>,
    pub run_id: Option<String>,
    /// Inclusive lower bound, compared lexicographically against `timestamp`.
    pub start_time: Option<String>,
    /// Inclusive upper bound.
    pub end_time: Option<String>,
    /// Case-insensitive substring over message, `details.endpoint` and tags.
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            level: None,
            category: None,
            workflow_id: None,
            run_id: None,
            start_time: None,
            end_time: None,
            search: None,
            limit: DEFAULT_LOG_LIMIT,
            offset: 0,
        }
    }
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.level = Some(levels.into_iter().collect());
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = LogCategory>) -> Self {
        self.category = Some(categories.into_iter().collect());
        self
    }

    pub fn workflow(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn run(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn since(mut self, start: impl Into<String>) -> Self {
        self.start_time = Some(start.into());
        self
    }

    pub fn until(mut self, end: impl Into<String>) -> Self {
        self.end_time = Some(end.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStats {
    pub total: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
    pub by_category: BTreeMap<LogCategory, usize>,
    pub performance_metrics: PerformanceMetrics,
    /// Percentage (0–100) of entries at `error` level.
    pub error_rate: f64,
    /// Percentage (0–100) of entries at `success` level.
    pub success_rate: f64,
    /// Up to ten most recent `error` entries, newest first.
    pub recent_errors: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Mean `duration` in ms over entries that carry one; 0 if none do.
    pub average_response_time: f64,
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::Validation(format!("unknown export format: {other}"))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler status
// ---------------------------------------------------------------------------

/// Snapshot of the scheduler's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Items waiting for dispatch.
    pub queued: usize,
    /// Items dispatched and not yet completed.
    pub active: usize,
}
