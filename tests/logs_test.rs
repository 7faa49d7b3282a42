//! Integration tests for the log aggregator: capping, filtering, stats,
//! export and subscriptions.

use api_conductor::clock::{Clock, ManualClock};
use api_conductor::error::{Error, Result};
use api_conductor::logs::{LogAggregator, LogConfig, LogSink, NoopSink};
use api_conductor::model::{
    Correlation, ExportFormat, LogCategory, LogEntry, LogFilter, LogLevel, format_timestamp,
};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn aggregator(max_logs: usize) -> (Arc<ManualClock>, LogAggregator) {
    aggregator_with(LogConfig {
        max_logs,
        ..LogConfig::default()
    })
}

fn aggregator_with(config: LogConfig) -> (Arc<ManualClock>, LogAggregator) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    ));
    let logs = LogAggregator::with_parts(config, Arc::new(NoopSink), clock.clone()).unwrap();
    (clock, logs)
}

fn stamp(clock: &ManualClock) -> String {
    format_timestamp(clock.now())
}

fn messages(entries: &[LogEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.message.as_str()).collect()
}

struct FailingSink;

impl LogSink for FailingSink {
    fn write(&self, _entry: &LogEntry) -> Result<()> {
        Err(Error::Other("sink offline".to_string()))
    }
}

struct PanickingSink;

impl LogSink for PanickingSink {
    fn write(&self, _entry: &LogEntry) -> Result<()> {
        panic!("sink exploded");
    }
}

// ---------------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------------

#[test]
fn log_returns_entry_with_correlation_and_timestamp() {
    let (_clock, logs) = aggregator(10);
    let entry = logs.log(
        LogCategory::Workflow,
        LogLevel::Success,
        "step done",
        json!({ "step": 3 }),
        Correlation::new()
            .workflow("wf-1")
            .run("run-9")
            .user("u-7")
            .duration_ms(42)
            .tag("nightly"),
    );

    assert!(!entry.id.is_empty());
    assert_eq!(entry.timestamp, "2024-05-01T12:00:00.000Z");
    assert_eq!(entry.workflow_id.as_deref(), Some("wf-1"));
    assert_eq!(entry.run_id.as_deref(), Some("run-9"));
    assert_eq!(entry.user_id.as_deref(), Some("u-7"));
    assert_eq!(entry.duration_ms, Some(42));
    assert!(entry.tags.contains("nightly"));
    assert_eq!(logs.snapshot(), vec![entry]);
}

#[test]
fn entry_ids_are_unique() {
    let (_clock, logs) = aggregator(10);
    let a = logs.info(LogCategory::User, "a");
    let b = logs.info(LogCategory::User, "b");
    assert_ne!(a.id, b.id);
}

#[test]
fn buffer_is_newest_first_and_capped() {
    let (_clock, logs) = aggregator(3);
    for i in 0..5 {
        logs.info(LogCategory::System, format!("entry {i}"));
    }

    assert_eq!(logs.len(), 3);
    assert_eq!(
        messages(&logs.snapshot()),
        ["entry 4", "entry 3", "entry 2"]
    );
}

#[test]
fn zero_capacity_is_rejected() {
    let result = LogAggregator::new(LogConfig {
        max_logs: 0,
        ..LogConfig::default()
    });
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn failing_sink_does_not_lose_entries() {
    let logs = LogAggregator::with_parts(
        LogConfig::default(),
        Arc::new(FailingSink),
        Arc::new(ManualClock::default()),
    )
    .unwrap();

    logs.error(LogCategory::Api, "upstream down");
    assert_eq!(logs.len(), 1);
}

#[test]
fn panicking_sink_does_not_escape_log() {
    let logs = LogAggregator::with_parts(
        LogConfig::default(),
        Arc::new(PanickingSink),
        Arc::new(ManualClock::default()),
    )
    .unwrap();

    let entry = logs.warn(LogCategory::System, "still recorded");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs.snapshot(), vec![entry]);

    logs.clear_logs();
    assert_eq!(logs.len(), 1);
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[test]
fn level_and_category_filters_intersect() {
    let (_clock, logs) = aggregator(100);
    logs.error(LogCategory::Api, "api error");
    logs.warn(LogCategory::Api, "api warn");
    logs.error(LogCategory::Workflow, "workflow error");
    logs.info(LogCategory::Api, "api info");

    let errors = logs.get_logs(&LogFilter::new().levels([LogLevel::Error]));
    assert_eq!(messages(&errors), ["workflow error", "api error"]);

    let api_problems = logs.get_logs(
        &LogFilter::new()
            .levels([LogLevel::Error, LogLevel::Warn])
            .categories([LogCategory::Api]),
    );
    assert_eq!(messages(&api_problems), ["api warn", "api error"]);
}

#[test]
fn empty_level_list_imposes_no_constraint() {
    let (_clock, logs) = aggregator(100);
    logs.info(LogCategory::Api, "one");
    logs.debug(LogCategory::Performance, "two");

    let all = logs.get_logs(&LogFilter::new().levels([]).categories([]).search(""));
    assert_eq!(all.len(), 2);
}

#[test]
fn workflow_and_run_filters_match_exactly() {
    let (_clock, logs) = aggregator(100);
    let wf = |w: &str, r: &str| Correlation::new().workflow(w).run(r);
    logs.log(LogCategory::Workflow, LogLevel::Info, "a", json!(null), wf("wf-1", "r-1"));
    logs.log(LogCategory::Workflow, LogLevel::Info, "b", json!(null), wf("wf-1", "r-2"));
    logs.log(LogCategory::Workflow, LogLevel::Info, "c", json!(null), wf("wf-2", "r-1"));
    logs.info(LogCategory::Workflow, "uncorrelated");

    let by_workflow = logs.get_logs(&LogFilter::new().workflow("wf-1"));
    assert_eq!(messages(&by_workflow), ["b", "a"]);

    let by_run = logs.get_logs(&LogFilter::new().workflow("wf-1").run("r-1"));
    assert_eq!(messages(&by_run), ["a"]);
}

#[test]
fn time_range_is_inclusive() {
    let (clock, logs) = aggregator(100);
    let start = stamp(&clock);
    logs.info(LogCategory::System, "t0");
    clock.advance(Duration::from_secs(60));
    let middle = stamp(&clock);
    logs.info(LogCategory::System, "t1");
    clock.advance(Duration::from_secs(60));
    logs.info(LogCategory::System, "t2");

    let from_middle = logs.get_logs(&LogFilter::new().since(middle.clone()));
    assert_eq!(messages(&from_middle), ["t2", "t1"]);

    let up_to_middle = logs.get_logs(&LogFilter::new().since(start).until(middle));
    assert_eq!(messages(&up_to_middle), ["t1", "t0"]);
}

#[test]
fn search_covers_message_endpoint_and_tags_case_insensitively() {
    let (_clock, logs) = aggregator(100);
    logs.info(LogCategory::Api, "Fetched QUOTES");
    logs.log(
        LogCategory::Api,
        LogLevel::Success,
        "request done",
        json!({ "endpoint": "/v1/Quotes/AAPL" }),
        Correlation::new(),
    );
    logs.log(
        LogCategory::User,
        LogLevel::Info,
        "clicked",
        json!(null),
        Correlation::new().tag("quotes-page"),
    );
    logs.info(LogCategory::Api, "unrelated");

    let hits = logs.get_logs(&LogFilter::new().search("quotes"));
    assert_eq!(messages(&hits), ["clicked", "request done", "Fetched QUOTES"]);
}

#[test]
fn pagination_defaults_to_first_hundred() {
    let (_clock, logs) = aggregator(1_000);
    for i in 0..150 {
        logs.info(LogCategory::System, format!("entry {i}"));
    }

    let first_page = logs.get_logs(&LogFilter::new());
    assert_eq!(first_page.len(), 100);
    assert_eq!(first_page[0].message, "entry 149");

    let second_page = logs.get_logs(&LogFilter::new().offset(100).limit(20));
    assert_eq!(second_page.len(), 20);
    assert_eq!(second_page[0].message, "entry 49");

    let past_end = logs.get_logs(&LogFilter::new().offset(500));
    assert!(past_end.is_empty());
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[test]
fn stats_count_every_level_and_category() {
    let (_clock, logs) = aggregator(100);
    let timed = |ms| Correlation::new().duration_ms(ms);
    logs.log(LogCategory::Api, LogLevel::Success, "ok", json!(null), timed(100));
    logs.log(LogCategory::Api, LogLevel::Success, "ok", json!(null), timed(300));
    logs.log(LogCategory::Api, LogLevel::Error, "bad", json!(null), timed(200));
    logs.warn(LogCategory::Workflow, "slow");

    let stats = logs.get_log_stats();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.by_level.len(), LogLevel::ALL.len());
    assert_eq!(stats.by_level[&LogLevel::Success], 2);
    assert_eq!(stats.by_level[&LogLevel::Debug], 0);
    assert_eq!(stats.by_category.len(), LogCategory::ALL.len());
    assert_eq!(stats.by_category[&LogCategory::Api], 3);
    assert_eq!(stats.by_category[&LogCategory::Performance], 0);
    assert_eq!(stats.error_rate, 25.0);
    assert_eq!(stats.success_rate, 50.0);
    assert_eq!(stats.performance_metrics.average_response_time, 200.0);
    assert_eq!(messages(&stats.recent_errors), ["bad"]);
}

#[test]
fn stats_on_empty_buffer_are_zero() {
    let (_clock, logs) = aggregator(10);
    let stats = logs.get_log_stats();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.error_rate, 0.0);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.performance_metrics.average_response_time, 0.0);
    assert!(stats.recent_errors.is_empty());
}

#[test]
fn recent_errors_keeps_ten_newest() {
    let (_clock, logs) = aggregator(100);
    for i in 0..15 {
        logs.error(LogCategory::Api, format!("error {i}"));
    }

    let recent = logs.get_log_stats().recent_errors;
    assert_eq!(recent.len(), 10);
    assert_eq!(recent[0].message, "error 14");
    assert_eq!(recent[9].message, "error 5");
}

// ---------------------------------------------------------------------------
// Clearing
// ---------------------------------------------------------------------------

#[test]
fn clear_logs_leaves_a_single_system_entry() {
    let (_clock, logs) = aggregator(100);
    logs.info(LogCategory::Api, "a");
    logs.error(LogCategory::Api, "b");

    logs.clear_logs();

    let stats = logs.get_log_stats();
    assert_eq!(stats.total, 1);
    let remaining = logs.snapshot();
    assert_eq!(remaining[0].category, LogCategory::System);
    assert_eq!(remaining[0].level, LogLevel::Info);
    assert_eq!(remaining[0].message, "Logs cleared");
}

#[test]
fn clear_logs_without_self_log_empties_buffer() {
    let (_clock, logs) = aggregator_with(LogConfig {
        self_log_clear: false,
        ..LogConfig::default()
    });
    logs.info(LogCategory::Api, "a");

    logs.clear_logs();
    assert!(logs.is_empty());
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[test]
fn csv_export_quotes_every_field() {
    let (_clock, logs) = aggregator(10);
    logs.log(
        LogCategory::Api,
        LogLevel::Success,
        r#"fetched "quotes", again"#,
        json!(null),
        Correlation::new().workflow("wf-1").duration_ms(12),
    );
    logs.info(LogCategory::System, "plain");

    let csv = logs.export_logs(ExportFormat::Csv).unwrap();
    let lines: Vec<&str> = csv.split('\n').collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "timestamp,level,category,message,workflowId,runId,duration"
    );
    assert_eq!(
        lines[1],
        r#""2024-05-01T12:00:00.000Z","info","system","plain","","","""#
    );
    assert_eq!(
        lines[2],
        r#""2024-05-01T12:00:00.000Z","success","api","fetched ""quotes"", again","wf-1","","12""#
    );
}

#[test]
fn json_export_round_trips() {
    let (_clock, logs) = aggregator(10);
    logs.log(
        LogCategory::Performance,
        LogLevel::Debug,
        "timing",
        json!({ "endpoint": "/health" }),
        Correlation::new().duration_ms(7).tag("probe"),
    );

    let rendered = logs.export_logs(ExportFormat::Json).unwrap();
    assert!(rendered.contains("\"duration\": 7"));
    assert!(rendered.contains("\"category\": \"performance\""));

    let parsed: Vec<LogEntry> = serde_json::from_str(&rendered).unwrap();
    assert_eq!(parsed, logs.snapshot());
}

#[test]
fn export_format_parses_case_insensitively() {
    assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
    assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
    assert!("xml".parse::<ExportFormat>().is_err());
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[test]
fn subscribers_receive_full_snapshots_until_unsubscribed() {
    let (_clock, logs) = aggregator(100);
    let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let subscription = logs.subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.len()));
    assert_eq!(logs.subscriber_count(), 1);

    logs.info(LogCategory::User, "one");
    logs.info(LogCategory::User, "two");
    logs.clear_logs();

    // two logs, the clear itself, then the "Logs cleared" entry
    assert_eq!(*seen.lock().unwrap(), [1, 2, 0, 1]);

    subscription.unsubscribe();
    assert_eq!(logs.subscriber_count(), 0);
    logs.info(LogCategory::User, "three");
    assert_eq!(seen.lock().unwrap().len(), 4);
}

#[test]
fn listener_may_read_the_aggregator() {
    let (_clock, logs) = aggregator(100);
    let calls = Arc::new(AtomicUsize::new(0));

    let reader = logs.clone();
    let counter = Arc::clone(&calls);
    let _subscription = logs.subscribe(move |snapshot| {
        assert_eq!(reader.len(), snapshot.len());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    logs.warn(LogCategory::Workflow, "reentrant");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
