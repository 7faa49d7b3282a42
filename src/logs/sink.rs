//! Mirrors for aggregated log entries.
//!
//! A sink sees every entry after it lands in the buffer. Sink errors are
//! reported back to the aggregator, which swallows them; a panicking sink
//! is caught the same way.

use crate::error::Result;
use crate::model::{LogEntry, LogLevel};

pub trait LogSink: Send + Sync {
    fn write(&self, entry: &LogEntry) -> Result<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn write(&self, _entry: &LogEntry) -> Result<()> {
        Ok(())
    }
}

/// Re-emits entries as `tracing` events under the `conductor::logs` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, entry: &LogEntry) -> Result<()> {
        let category = entry.category.as_str();
        let workflow_id = entry.workflow_id.as_deref().unwrap_or("-");
        let run_id = entry.run_id.as_deref().unwrap_or("-");

        match entry.level {
            LogLevel::Error => tracing::error!(
                target: "conductor::logs",
                category, workflow_id, run_id, duration_ms = entry.duration_ms,
                "{}", entry.message
            ),
            LogLevel::Warn => tracing::warn!(
                target: "conductor::logs",
                category, workflow_id, run_id, duration_ms = entry.duration_ms,
                "{}", entry.message
            ),
            LogLevel::Info | LogLevel::Success => tracing::info!(
                target: "conductor::logs",
                category, workflow_id, run_id, duration_ms = entry.duration_ms,
                success = entry.level == LogLevel::Success,
                "{}", entry.message
            ),
            LogLevel::Debug => tracing::debug!(
                target: "conductor::logs",
                category, workflow_id, run_id, duration_ms = entry.duration_ms,
                "{}", entry.message
            ),
        }
        Ok(())
    }
}
