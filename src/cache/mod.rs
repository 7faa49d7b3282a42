//! TTL-keyed result cache with lazy expiry.
//!
//! Entries are never swept in the background: an expired entry lingers until
//! the next `get` for its key, which removes it and reports a miss.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::telemetry::metrics;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached value and its validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    /// Valid iff `now <= expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

pub struct ResultCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResultCache<V> {
    /// Cache on the system clock.
    pub fn new(default_ttl: Duration) -> Result<Self> {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        validate_ttl(default_ttl)?;
        Ok(Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            clock,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch a live value. An expired entry is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let (result, value) = match entries.get(key) {
            None => ("miss", None),
            Some(entry) if entry.is_valid_at(now) => ("hit", Some(entry.value.clone())),
            Some(_) => ("expired", None),
        };

        if result == "expired" {
            entries.remove(key);
            debug!(key, "cache entry expired");
        }

        metrics::cache_lookups().add(1, &[KeyValue::new("result", result)]);
        value
    }

    /// Store under the default TTL, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.insert(key.into(), value, self.default_ttl);
    }

    /// Store with an explicit TTL. A zero TTL is rejected.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) -> Result<()> {
        validate_ttl(ttl)?;
        self.insert(key.into(), value, ttl);
        Ok(())
    }

    /// Read-only validity check; never evicts.
    pub fn is_valid(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.lock()
            .get(key)
            .is_some_and(|entry| entry.is_valid_at(now))
    }

    /// Copy of the raw entry, expired or not. Never evicts.
    pub fn entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock().get(key).cloned()
    }

    /// Remove one entry, or everything when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.lock();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    /// Return the live value for `key`, computing and storing it on a miss.
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = make();
        self.insert(key.to_string(), value.clone(), self.default_ttl);
        value
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn insert(&self, key: String, value: V, ttl: Duration) {
        let created_at = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.lock().insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                created_at,
                expires_at,
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
        return Err(Error::Validation("cache TTL must be greater than zero".to_string()));
    }
    Ok(())
}

/// Derive a cache key from a prefix and a parameter object.
///
/// Parameters are emitted sorted by name as `name=value` pairs joined with
/// `&`, so insertion order never affects the key. Strings render bare;
/// every other JSON value renders as compact JSON. A non-object `params`
/// is rendered whole after the prefix.
pub fn generate_cache_key(prefix: &str, params: &serde_json::Value) -> String {
    let Some(map) = params.as_object() else {
        return format!("{prefix}:{}", render_param(params));
    };

    let mut pairs: Vec<(&String, &serde_json::Value)> = map.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let query = pairs
        .into_iter()
        .map(|(name, value)| format!("{name}={}", render_param(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{prefix}:{query}")
}

fn render_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
