//! Typed configuration: defaults, then an optional TOML file, then
//! environment variables (later sources win).
//!
//! The API token is wrapped in `secrecy::SecretString` so it never shows
//! up in `Debug` output or logs.

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::logs::{DEFAULT_MAX_LOGS, LogConfig, LogSink, NoopSink, TracingSink};
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub scheduler: SchedulerSettings,
    pub cache: CacheSettings,
    pub logs: LogSettings,
    pub api: ApiSettings,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    pub concurrency_limit: usize,
    pub dispatch_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub max_logs: usize,
    /// Mirror aggregated entries to `tracing`.
    pub mirror: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSettings {
    pub base_url: Option<String>,
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: Option<SecretString>,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            cache: CacheSettings::default(),
            logs: LogSettings::default(),
            api: ApiSettings::default(),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            concurrency_limit: defaults.concurrency_limit,
            dispatch_delay_ms: defaults.dispatch_delay.as_millis() as u64,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: crate::cache::DEFAULT_TTL.as_secs(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            max_logs: DEFAULT_MAX_LOGS,
            mirror: true,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Defaults overlaid with environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults, then the TOML file at `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read config file {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from `lookup`, keyed by environment variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_var(&lookup, "CONDUCTOR_CONCURRENCY_LIMIT")? {
            self.scheduler.concurrency_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "CONDUCTOR_DISPATCH_DELAY_MS")? {
            self.scheduler.dispatch_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CONDUCTOR_CACHE_TTL_SECS")? {
            self.cache.default_ttl_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CONDUCTOR_MAX_LOGS")? {
            self.logs.max_logs = v;
        }
        if let Some(v) = lookup("CONDUCTOR_LOG_MIRROR") {
            self.logs.mirror = parse_bool("CONDUCTOR_LOG_MIRROR", &v)?;
        }
        if let Some(v) = lookup("CONDUCTOR_API_BASE_URL") {
            self.api.base_url = Some(v);
        }
        if let Some(v) = lookup("CONDUCTOR_API_TOKEN") {
            self.api.token = Some(SecretString::from(v));
        }
        if let Some(v) = parse_var(&lookup, "CONDUCTOR_API_TIMEOUT_SECS")? {
            self.api.timeout_secs = v;
        }
        if let Some(v) = lookup("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency_limit: self.scheduler.concurrency_limit,
            dispatch_delay: Duration::from_millis(self.scheduler.dispatch_delay_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_secs)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            max_logs: self.logs.max_logs,
            ..LogConfig::default()
        }
    }

    /// `TracingSink` when mirroring is on, `NoopSink` otherwise.
    pub fn log_sink(&self) -> Arc<dyn LogSink> {
        if self.logs.mirror {
            Arc::new(TracingSink)
        } else {
            Arc::new(NoopSink)
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid value for {name}: {raw:?} ({e})")))
        })
        .transpose()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("invalid value for {name}: {raw:?}"))),
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}
