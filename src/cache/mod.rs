//! Cache metadata, staleness policy and per-resource caches.
//!
//! A resource is stale unless it has [`CacheMetadata`] younger than its TTL *and*
//! its [`ApiKey`] has already been called once this session. Metadata is replaced
//! wholesale on every successful network fetch and never mutated in place.
//!
//! Key re-exports:
//! - [`ApiKey`], [`ApiCallTracker`] - first-call bookkeeping
//! - [`ResourceCache`] - bounded in-memory cache implementing the fetch-if-stale flow

mod tracker;

pub use tracker::{ApiCallTracker, ApiKey};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tokio::time::Instant;
use tracing::instrument;

use crate::config::{DEFAULT_CACHE_TTL_SECS, DEFAULT_MAX_CACHE_ENTRIES};
use crate::error::Result;

/// When a resource was last fetched and how long that fetch stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetadata {
    pub last_fetched: Instant,
    pub ttl: Duration,
}

impl CacheMetadata {
    /// Metadata stamped with the current time.
    pub fn new(ttl: Duration) -> Self {
        Self {
            last_fetched: Instant::now(),
            ttl,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fetched) < self.ttl
    }
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}

/// Decide whether a fetch must bypass cached data.
///
/// True when the caller asked for no cache, when there is no metadata, when the
/// metadata expired, or when `key` has never been first-called this session.
pub fn should_force_api_call(
    tracker: &ApiCallTracker,
    key: &ApiKey,
    metadata: Option<&CacheMetadata>,
    no_cache: bool,
) -> bool {
    if no_cache {
        return true;
    }
    match metadata {
        None => true,
        Some(meta) if !meta.is_valid() => true,
        Some(_) => !tracker.has_been_called(key),
    }
}

/// Value returned by cached fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    /// True when served from memory without a network round-trip
    pub from_cache: bool,
    /// When the value was fetched from the network
    pub time: DateTime<Utc>,
}

#[derive(Clone)]
struct CachedEntry<T> {
    value: T,
    meta: CacheMetadata,
    fetched_at: DateTime<Utc>,
}

/// Bounded in-memory cache for one kind of resource, keyed by [`ApiKey`].
///
/// Cloning is cheap and shares entries.
#[derive(Clone)]
pub struct ResourceCache<T> {
    name: Arc<str>,
    entries: Cache<String, CachedEntry<T>>,
    tracker: ApiCallTracker,
    ttl: Duration,
}

impl<T> ResourceCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &str, ttl: Duration, tracker: ApiCallTracker) -> Self {
        Self::with_capacity(name, ttl, DEFAULT_MAX_CACHE_ENTRIES, tracker)
    }

    pub fn with_capacity(
        name: &str,
        ttl: Duration,
        max_entries: u64,
        tracker: ApiCallTracker,
    ) -> Self {
        Self {
            name: Arc::from(name),
            entries: Cache::builder().max_capacity(max_entries).build(),
            tracker,
            ttl,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key` if the staleness policy allows it,
    /// otherwise run `fetcher` and replace the entry with its result.
    ///
    /// Errors from `fetcher` propagate unchanged and leave the entry untouched.
    #[instrument(
        name = "cache.fetch",
        skip(self, key, fetcher),
        fields(resource = %self.name, %key, cache_hit = false, duration_ms)
    )]
    pub async fn fetch<F, Fut>(&self, key: &ApiKey, no_cache: bool, fetcher: F) -> Result<Cached<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();

        let fresh = self.entries.get(key.as_str()).await.filter(|entry| {
            !should_force_api_call(&self.tracker, key, Some(&entry.meta), no_cache)
        });
        if let Some(entry) = fresh {
            tracing::Span::current().record("cache_hit", true);
            tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
            return Ok(Cached {
                value: entry.value,
                from_cache: true,
                time: entry.fetched_at,
            });
        }

        let value = fetcher().await?;
        self.tracker.mark_api_first_called(key);
        let fetched_at = self.write(key, value.clone()).await;

        tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(Cached {
            value,
            from_cache: false,
            time: fetched_at,
        })
    }

    /// Write a value obtained outside [`fetch`](Self::fetch), e.g. from a realtime
    /// event. Stamps fresh metadata but does not count as a first call.
    pub async fn store(&self, key: &ApiKey, value: T) {
        self.write(key, value).await;
    }

    /// Peek at the cached value regardless of staleness.
    pub async fn peek(&self, key: &ApiKey) -> Option<Cached<T>> {
        self.entries.get(key.as_str()).await.map(|entry| Cached {
            value: entry.value,
            from_cache: true,
            time: entry.fetched_at,
        })
    }

    pub async fn metadata(&self, key: &ApiKey) -> Option<CacheMetadata> {
        self.entries.get(key.as_str()).await.map(|entry| entry.meta)
    }

    pub async fn invalidate(&self, key: &ApiKey) {
        self.entries.invalidate(key.as_str()).await;
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    async fn write(&self, key: &ApiKey, value: T) -> DateTime<Utc> {
        let fetched_at = Utc::now();
        self.entries
            .insert(
                key.to_string(),
                CachedEntry {
                    value,
                    meta: CacheMetadata::new(self.ttl),
                    fetched_at,
                },
            )
            .await;
        fetched_at
    }
}

/// Type-erased handle used to clear caches on session teardown.
pub(crate) trait ClearOnReset: Send + Sync {
    fn clear_entries(&self);
}

impl<T> ClearOnReset for ResourceCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clear_entries(&self) {
        self.clear();
    }
}
