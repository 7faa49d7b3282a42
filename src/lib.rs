//! # api-conductor
//!
//! Client-side API orchestration for service dashboards.
//!
//! Provides a priority request scheduler with a global concurrency ceiling
//! and per-id dedup, a TTL result cache with lazy expiry, a capped log
//! aggregator with filtering, stats and export, and OpenTelemetry
//! observability.

pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod logs;
pub mod model;
pub mod scheduler;
pub mod telemetry;
pub mod transport;
