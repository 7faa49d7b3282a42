//! Cache-first request orchestration.
//!
//! `ApiClient` ties the three components together: a cache hit
//! short-circuits dispatch, a miss goes through the scheduler, and every
//! settlement is recorded in the log aggregator under the `api` category.

use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::ResultCache;
use crate::error::{Error, Result};
use crate::logs::LogAggregator;
use crate::model::{Correlation, LogCategory, LogLevel};
use crate::scheduler::{RequestHandle, RequestScheduler};
use crate::transport::Transport;

/// Per-request knobs for [`ApiClient::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub priority: i32,
    /// Look here before dispatching; store the result here on success.
    pub cache_key: Option<String>,
    /// Overrides the cache's default TTL.
    pub cache_ttl: Option<Duration>,
    /// Recorded as `details.endpoint`, which log search matches on.
    pub endpoint: Option<String>,
    pub correlation: Correlation,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn correlation(mut self, correlation: Correlation) -> Self {
        self.correlation = correlation;
        self
    }
}

pub struct ApiClient<T: Transport>
where
    T::Output: Clone,
{
    scheduler: RequestScheduler<T>,
    cache: Arc<ResultCache<T::Output>>,
    logs: LogAggregator,
}

impl<T: Transport> Clone for ApiClient<T>
where
    T::Output: Clone,
{
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            cache: Arc::clone(&self.cache),
            logs: self.logs.clone(),
        }
    }
}

enum Pending<O> {
    Cached(O),
    Dispatched(RequestHandle<O>),
    Rejected(Error),
}

impl<T: Transport> ApiClient<T>
where
    T::Output: Clone,
{
    pub fn new(
        scheduler: RequestScheduler<T>,
        cache: Arc<ResultCache<T::Output>>,
        logs: LogAggregator,
    ) -> Self {
        Self {
            scheduler,
            cache,
            logs,
        }
    }

    pub fn scheduler(&self) -> &RequestScheduler<T> {
        &self.scheduler
    }

    pub fn cache(&self) -> &ResultCache<T::Output> {
        &self.cache
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.logs
    }

    /// Serve from cache or enqueue, eagerly; the returned future reports
    /// the outcome.
    ///
    /// The cache lookup and the enqueue both happen before this returns,
    /// so request ordering follows call order, not await order.
    ///
    /// A zero `cache_ttl` is rejected with [`Error::Validation`] before
    /// anything is looked up or queued.
    pub fn request(
        &self,
        id: &str,
        descriptor: T::Descriptor,
        options: RequestOptions,
    ) -> impl Future<Output = Result<T::Output>> + Send + use<T> {
        let id = id.to_string();
        let details = json!({
            "endpoint": options.endpoint,
            "requestId": id,
            "priority": options.priority,
            "cacheKey": options.cache_key,
        });

        let pending = if options.cache_ttl.is_some_and(|ttl| ttl.is_zero()) {
            let error = Error::Validation("cache TTL must be greater than zero".to_string());
            self.logs.log(
                LogCategory::Api,
                LogLevel::Error,
                format!("request {id} rejected: {error}"),
                details.clone(),
                options.correlation.clone(),
            );
            Pending::Rejected(error)
        } else {
            self.lookup_or_enqueue(&id, descriptor, &options, &details)
        };

        let started = Instant::now();
        let cache = Arc::clone(&self.cache);
        let logs = self.logs.clone();

        async move {
            let handle = match pending {
                Pending::Cached(value) => return Ok(value),
                Pending::Rejected(error) => return Err(error),
                Pending::Dispatched(handle) => handle,
            };

            let result = handle.await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let correlation = options.correlation.duration_ms(elapsed_ms);

            match result {
                Ok(value) => {
                    if let Some(key) = options.cache_key {
                        store(&cache, key, value.clone(), options.cache_ttl);
                    }
                    logs.log(
                        LogCategory::Api,
                        LogLevel::Success,
                        format!("request {id} completed"),
                        details,
                        correlation,
                    );
                    Ok(value)
                }
                Err(e) => {
                    let level = if e.is_abandoned() {
                        LogLevel::Warn
                    } else {
                        LogLevel::Error
                    };
                    logs.log(
                        LogCategory::Api,
                        level,
                        format!("request {id} failed: {e}"),
                        details,
                        correlation,
                    );
                    Err(e)
                }
            }
        }
    }

    fn lookup_or_enqueue(
        &self,
        id: &str,
        descriptor: T::Descriptor,
        options: &RequestOptions,
        details: &serde_json::Value,
    ) -> Pending<T::Output> {
        let cached = options
            .cache_key
            .as_deref()
            .and_then(|key| self.cache.get(key));
        match cached {
            Some(value) => {
                self.logs.log(
                    LogCategory::Api,
                    LogLevel::Debug,
                    format!("cache hit for {id}"),
                    details.clone(),
                    options.correlation.clone(),
                );
                Pending::Cached(value)
            }
            None => Pending::Dispatched(self.scheduler.enqueue(id, descriptor, options.priority)),
        }
    }
}

fn store<V: Clone>(cache: &ResultCache<V>, key: String, value: V, ttl: Option<Duration>) {
    match ttl {
        Some(ttl) => {
            if let Err(e) = cache.set_with_ttl(key, value, ttl) {
                tracing::debug!(error = %e, "result not cached");
            }
        }
        None => cache.set(key, value),
    }
}
