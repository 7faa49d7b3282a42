//! conductor CLI: run API requests through the scheduler, cache and log aggregator.

use api_conductor::cache::{ResultCache, generate_cache_key};
use api_conductor::client::{ApiClient, RequestOptions};
use api_conductor::clock::SystemClock;
use api_conductor::config::Config;
use api_conductor::logs::LogAggregator;
use api_conductor::model::{Correlation, ExportFormat};
use api_conductor::scheduler::RequestScheduler;
use api_conductor::telemetry::{TelemetryConfig, init_telemetry};
use api_conductor::transport::{HttpRequest, HttpTransport};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "conductor", about = "Prioritized, cached API requests")]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// GET one or more paths relative to the configured base URL
    Fetch {
        /// Paths to request; repeating a path supersedes the earlier one
        #[arg(required = true)]
        paths: Vec<String>,
        /// Priority (higher = dispatched sooner)
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Skip the result cache
        #[arg(long)]
        no_cache: bool,
        /// Workflow id attached to every log entry
        #[arg(long)]
        workflow: Option<String>,
        /// Export the aggregated logs afterwards (json | csv)
        #[arg(long)]
        export: Option<ExportFormat>,
        /// Write the export here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Fetch {
            paths,
            priority,
            no_cache,
            workflow,
            export,
            output,
        } => cmd_fetch(config, paths, priority, no_cache, workflow, export, output).await,
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_fetch(
    config: Config,
    paths: Vec<String>,
    priority: i32,
    no_cache: bool,
    workflow: Option<String>,
    export: Option<ExportFormat>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "conductor".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let base_url = config
        .api
        .base_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("CONDUCTOR_API_BASE_URL is not set"))?;
    let token = config
        .api
        .token
        .as_ref()
        .map(|t| SecretString::from(t.expose_secret().to_string()));
    let transport = HttpTransport::new(base_url, token, config.api_timeout())?;

    let scheduler = RequestScheduler::start(transport, config.scheduler_config())?;
    let cache = Arc::new(ResultCache::new(config.cache_ttl())?);
    let logs = LogAggregator::with_parts(
        config.log_config(),
        config.log_sink(),
        Arc::new(SystemClock),
    )?;
    let client = ApiClient::new(scheduler.clone(), cache, logs.clone());

    let mut correlation = Correlation::new().tag("cli");
    if let Some(ref workflow) = workflow {
        correlation = correlation.workflow(workflow);
    }

    let pending: Vec<_> = paths
        .iter()
        .map(|path| {
            let mut options = RequestOptions::new()
                .priority(priority)
                .endpoint(path)
                .correlation(correlation.clone());
            if !no_cache {
                options = options.cache_key(generate_cache_key(
                    "GET",
                    &serde_json::json!({ "path": path }),
                ));
            }
            (path, client.request(path, HttpRequest::get(path), options))
        })
        .collect();

    for (path, request) in pending {
        match request.await {
            Ok(body) => println!("{path}: {}", serde_json::to_string_pretty(&body)?),
            Err(e) => eprintln!("{path}: {e}"),
        }
    }

    let stats = logs.get_log_stats();
    eprintln!(
        "{} log entries, {:.1}% errors, avg {:.0}ms",
        stats.total, stats.error_rate, stats.performance_metrics.average_response_time
    );

    if let Some(format) = export {
        let rendered = logs.export_logs(format)?;
        match output {
            Some(path) => {
                std::fs::write(&path, rendered)?;
                eprintln!("exported logs to {}", path.display());
            }
            None => println!("{rendered}"),
        }
    }

    scheduler.shutdown();
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    println!("concurrency_limit:  {}", config.scheduler.concurrency_limit);
    println!("dispatch_delay_ms:  {}", config.scheduler.dispatch_delay_ms);
    println!("cache_ttl_secs:     {}", config.cache.default_ttl_secs);
    println!("max_logs:           {}", config.logs.max_logs);
    println!("log_mirror:         {}", config.logs.mirror);
    println!(
        "api_base_url:       {}",
        config.api.base_url.as_deref().unwrap_or("-")
    );
    println!(
        "api_token:          {}",
        if config.api.token.is_some() {
            "[REDACTED]"
        } else {
            "-"
        }
    );
    println!("api_timeout_secs:   {}", config.api.timeout_secs);
    println!(
        "otel_endpoint:      {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
    println!("log_level:          {}", config.log_level);
    Ok(())
}
