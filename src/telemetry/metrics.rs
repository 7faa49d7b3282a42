//! Metric instrument factories for api-conductor.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"api-conductor"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for api-conductor instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("api-conductor")
}

/// Counter: requests accepted into the scheduler queue.
pub fn requests_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("conductor.requests.enqueued")
        .with_description("Number of requests enqueued")
        .build()
}

/// Counter: request settlements.
/// Labels: `outcome` ("completed" | "failed" | "superseded" | "cancelled").
pub fn requests_settled() -> Counter<u64> {
    meter()
        .u64_counter("conductor.requests.settled")
        .with_description("Number of request futures settled, by outcome")
        .build()
}

/// Histogram: transport call duration in milliseconds.
pub fn dispatch_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("conductor.dispatch.duration_ms")
        .with_description("Transport call duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: cache reads.
/// Labels: `result` ("hit" | "miss" | "expired").
pub fn cache_lookups() -> Counter<u64> {
    meter()
        .u64_counter("conductor.cache.lookups")
        .with_description("Number of cache lookups, by result")
        .build()
}

/// Counter: entries written to the log aggregator.
/// Labels: `level`, `category`.
pub fn log_entries() -> Counter<u64> {
    meter()
        .u64_counter("conductor.logs.entries")
        .with_description("Number of aggregated log entries")
        .build()
}
