//! Tracing and OpenTelemetry setup.
//!
//! Diagnostics always go to stderr through a `tracing-subscriber` fmt
//! layer, leaving stdout to command output. With an OTLP endpoint the same
//! subscriber also exports traces, metrics and logs. The scheduler, cache
//! and log aggregator emit their spans and metrics through whatever is
//! installed here.

pub mod metrics;
pub mod request;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::error::{Error, Result};

pub struct TelemetryConfig {
    /// OTLP gRPC endpoint (e.g. "http://localhost:4317"); `None` means stderr only.
    pub endpoint: Option<String>,
    /// Reported as `service.name`.
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info").
    pub log_level: String,
}

/// Keeps the OTLP pipelines alive; flushes and shuts them down on drop.
///
/// Hold it for the lifetime of the process.
pub struct TelemetryGuard {
    otlp: Option<OtlpProviders>,
}

struct OtlpProviders {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(otlp) = self.otlp.take() {
            let _ = otlp.logger.shutdown();
            let _ = otlp.meter.shutdown();
            let _ = otlp.tracer.shutdown();
        }
    }
}

/// Install the global subscriber (and, with an endpoint, the OTLP
/// pipelines and global meter provider).
///
/// # Errors
///
/// Fails if an OTLP exporter cannot be built or a global subscriber is
/// already set.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let otlp = config
        .endpoint
        .as_deref()
        .map(|endpoint| build_providers(endpoint, config.service_name.clone()))
        .transpose()?;

    let trace_layer = otlp.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer.tracer("api-conductor"))
    });
    let log_layer = otlp.as_ref().map(|p| {
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&p.logger)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    if let Some(ref p) = otlp {
        opentelemetry::global::set_meter_provider(p.meter.clone());
    }

    Ok(TelemetryGuard { otlp })
}

fn build_providers(endpoint: &str, service_name: String) -> Result<OtlpProviders> {
    let resource = Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ))
        .build();
    let exporter_error = |kind: &str, e: &dyn std::fmt::Display| {
        Error::Other(format!("failed to create OTLP {kind} exporter: {e}"))
    };

    let spans = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("span", &e))?;
    let metrics = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("metric", &e))?;
    let logs = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("log", &e))?;

    Ok(OtlpProviders {
        tracer: SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build(),
        meter: SdkMeterProvider::builder()
            .with_periodic_exporter(metrics)
            .with_resource(resource.clone())
            .build(),
        logger: SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource)
            .build(),
    })
}
