//! Capped, newest-first log aggregator.
//!
//! Entries are prepended and the tail (oldest) is dropped once the buffer
//! exceeds `max_logs`. Every mutation hands subscribers a snapshot of the
//! whole buffer, and every new entry is mirrored to the configured sink.

pub mod export;
pub mod filter;
pub mod sink;

use opentelemetry::KeyValue;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::model::{
    Correlation, ExportFormat, LogCategory, LogEntry, LogFilter, LogLevel, LogStats,
    PerformanceMetrics, format_timestamp,
};
use crate::telemetry::metrics;

pub use sink::{LogSink, NoopSink, TracingSink};

pub const DEFAULT_MAX_LOGS: usize = 10_000;
const RECENT_ERRORS: usize = 10;

/// Callback receiving the full buffer, newest first.
pub type Listener = Arc<dyn Fn(&[LogEntry]) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Buffer capacity.
    pub max_logs: usize,
    /// Record a `system/info` entry after `clear_logs` empties the buffer.
    pub self_log_clear: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            self_log_clear: true,
        }
    }
}

/// Shared handle to a log buffer. Clones observe the same buffer.
#[derive(Clone)]
pub struct LogAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    buffer: Mutex<VecDeque<LogEntry>>,
    subscribers: Mutex<Vec<(u64, Listener)>>,
    next_subscriber: AtomicU64,
    config: LogConfig,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
}

/// Registration returned by [`LogAggregator::subscribe`].
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Deregister the listener. No further snapshots are delivered.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl LogAggregator {
    /// Aggregator mirroring to `tracing`, on the system clock.
    pub fn new(config: LogConfig) -> Result<Self> {
        Self::with_parts(config, Arc::new(TracingSink), Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: LogConfig,
        sink: Arc<dyn LogSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.max_logs == 0 {
            return Err(Error::Validation("max_logs must be at least 1".to_string()));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::new()),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                config,
                sink,
                clock,
            }),
        })
    }

    pub fn config(&self) -> &LogConfig {
        &self.inner.config
    }

    /// Record an entry and return a copy of it.
    pub fn log(
        &self,
        category: LogCategory,
        level: LogLevel,
        message: impl Into<String>,
        details: serde_json::Value,
        correlation: Correlation,
    ) -> LogEntry {
        let entry = LogEntry {
            id: Uuid::new_v4().to_string(),
            timestamp: format_timestamp(self.inner.clock.now()),
            level,
            category,
            message: message.into(),
            details,
            workflow_id: correlation.workflow_id,
            run_id: correlation.run_id,
            user_id: correlation.user_id,
            duration_ms: correlation.duration_ms,
            tags: correlation.tags,
        };

        {
            let mut buffer = self.buffer();
            buffer.push_front(entry.clone());
            buffer.truncate(self.inner.config.max_logs);
        }

        metrics::log_entries().add(
            1,
            &[
                KeyValue::new("level", level.as_str()),
                KeyValue::new("category", category.as_str()),
            ],
        );

        self.mirror(&entry);

        self.notify();
        entry
    }

    pub fn info(&self, category: LogCategory, message: impl Into<String>) -> LogEntry {
        self.log(
            category,
            LogLevel::Info,
            message,
            serde_json::Value::Null,
            Correlation::default(),
        )
    }

    pub fn success(&self, category: LogCategory, message: impl Into<String>) -> LogEntry {
        self.log(
            category,
            LogLevel::Success,
            message,
            serde_json::Value::Null,
            Correlation::default(),
        )
    }

    pub fn warn(&self, category: LogCategory, message: impl Into<String>) -> LogEntry {
        self.log(
            category,
            LogLevel::Warn,
            message,
            serde_json::Value::Null,
            Correlation::default(),
        )
    }

    pub fn error(&self, category: LogCategory, message: impl Into<String>) -> LogEntry {
        self.log(
            category,
            LogLevel::Error,
            message,
            serde_json::Value::Null,
            Correlation::default(),
        )
    }

    pub fn debug(&self, category: LogCategory, message: impl Into<String>) -> LogEntry {
        self.log(
            category,
            LogLevel::Debug,
            message,
            serde_json::Value::Null,
            Correlation::default(),
        )
    }

    /// Matching entries, newest first, after `offset`/`limit` pagination.
    pub fn get_logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        filter.apply(self.buffer().iter())
    }

    /// The whole buffer, newest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.buffer().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    pub fn get_log_stats(&self) -> LogStats {
        let buffer = self.buffer();
        let total = buffer.len();

        let mut by_level: BTreeMap<LogLevel, usize> =
            LogLevel::ALL.into_iter().map(|level| (level, 0)).collect();
        let mut by_category: BTreeMap<LogCategory, usize> =
            LogCategory::ALL.into_iter().map(|category| (category, 0)).collect();
        let mut duration_sum = 0u64;
        let mut timed = 0usize;

        for entry in buffer.iter() {
            *by_level.entry(entry.level).or_default() += 1;
            *by_category.entry(entry.category).or_default() += 1;
            if let Some(ms) = entry.duration_ms {
                duration_sum = duration_sum.saturating_add(ms);
                timed += 1;
            }
        }

        let average_response_time = if timed == 0 {
            0.0
        } else {
            duration_sum as f64 / timed as f64
        };
        let percent = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            }
        };

        let recent_errors = buffer
            .iter()
            .filter(|entry| entry.level == LogLevel::Error)
            .take(RECENT_ERRORS)
            .cloned()
            .collect();

        LogStats {
            total,
            error_rate: percent(by_level[&LogLevel::Error]),
            success_rate: percent(by_level[&LogLevel::Success]),
            by_level,
            by_category,
            performance_metrics: PerformanceMetrics {
                average_response_time,
            },
            recent_errors,
        }
    }

    /// Empty the buffer and notify subscribers.
    ///
    /// With `self_log_clear` set (the default), a `system/info` entry
    /// recording the clear is written afterwards, so the buffer ends up
    /// holding exactly that one entry.
    pub fn clear_logs(&self) {
        self.buffer().clear();
        self.notify();

        if self.inner.config.self_log_clear {
            self.info(LogCategory::System, "Logs cleared");
        }
    }

    /// Render the whole buffer, newest first.
    pub fn export_logs(&self, format: ExportFormat) -> Result<String> {
        let entries = self.snapshot();
        match format {
            ExportFormat::Json => export::to_json(&entries),
            ExportFormat::Csv => Ok(export::to_csv(&entries)),
        }
    }

    /// Register a listener invoked with a full snapshot on every
    /// `log`/`clear_logs`.
    pub fn subscribe(
        &self,
        listener: impl Fn(&[LogEntry]) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Sink errors and panics never reach the caller.
    fn mirror(&self, entry: &LogEntry) {
        let sink = &self.inner.sink;
        match panic::catch_unwind(AssertUnwindSafe(|| sink.write(entry))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "log sink write failed"),
            Err(_) => debug!("log sink panicked"),
        }
    }

    // Listeners run with no lock held, so they may call back into the aggregator.
    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
