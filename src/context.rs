//! Session-scoped synchronization context.
//!
//! [`SyncContext`] owns the state shared by every fetch in a signed-in
//! session: the API call tracker, the registered resource caches, the retry
//! engine and its connectivity probe, the optional streaming channel, badge
//! counters and paginated feeds. Cloning is cheap; all clones share state.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

use crate::badge::{
    BadgeCounters, BadgeReconciler, MessageEvent, ResetBadgeParams, ResetDisposition, ResetPoll,
    Viewer,
};
use crate::cache::{ApiCallTracker, ApiKey, Cached, ClearOnReset, ResourceCache};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::feed::{Attachment, FeedMerger, MergeOutcome, MergeRequest};
use crate::fetch::{fetch_data_with_socket_fallback, Fetched, StreamingChannel, StreamingRequest};
use crate::retry::{ConnectivityProbe, OnlineStatus, RetryConfig, RetryEngine};

#[derive(Clone)]
pub struct SyncContext {
    config: Arc<SyncConfig>,
    tracker: ApiCallTracker,
    retry: RetryEngine,
    streaming: Arc<RwLock<Option<Arc<dyn StreamingChannel>>>>,
    badges: Arc<Mutex<BadgeReconciler>>,
    attachments: Arc<Mutex<FeedMerger<Attachment>>>,
    caches: Arc<StdMutex<Vec<Box<dyn ClearOnReset>>>>,
}

impl SyncContext {
    /// Context without a connectivity probe; retries never wait on the
    /// offline delay.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            tracker: ApiCallTracker::new(),
            retry: RetryEngine::new(),
            streaming: Arc::new(RwLock::new(None)),
            badges: Arc::new(Mutex::new(BadgeReconciler::new(&config.badge))),
            attachments: Arc::new(Mutex::new(FeedMerger::new())),
            caches: Arc::new(StdMutex::new(Vec::new())),
            config: Arc::new(config),
        }
    }

    /// Context whose retries consult `probe` before each backoff.
    pub fn with_connectivity_probe(config: SyncConfig, probe: Arc<dyn ConnectivityProbe>) -> Self {
        let online = OnlineStatus::with_timing(
            probe,
            config.probe.cache_ttl(),
            config.probe.timeout(),
        );
        let offline_delay = config.probe.offline_retry_delay();
        let mut context = Self::new(config);
        context.retry = RetryEngine::with_online_status(online, offline_delay);
        context
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ApiCallTracker {
        &self.tracker
    }

    pub fn retry_engine(&self) -> &RetryEngine {
        &self.retry
    }

    /// Retry settings from configuration, without hooks.
    pub fn default_retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.config.retry)
    }

    /// Current connectivity; true when no probe is configured.
    pub async fn is_online(&self) -> bool {
        match self.retry.online_status() {
            Some(online) => online.is_online().await,
            None => true,
        }
    }

    /// Create a cache for one resource kind, sharing this context's tracker.
    /// The cache is cleared on [`reset`](Self::reset).
    pub fn resource_cache<T>(&self, name: &str, ttl: Duration) -> ResourceCache<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let cache = ResourceCache::with_capacity(
            name,
            ttl,
            self.config.cache.max_entries,
            self.tracker.clone(),
        );
        self.lock_caches().push(Box::new(cache.clone()));
        cache
    }

    pub async fn set_streaming_channel(&self, channel: Option<Arc<dyn StreamingChannel>>) {
        let connected = channel.is_some();
        *self.streaming.write().await = channel;
        tracing::debug!(connected, "Streaming channel updated");
    }

    /// Fetch over the streaming channel if open, else over REST with retry.
    pub async fn fetch_with_fallback<T, F, Fut>(
        &self,
        request: &StreamingRequest,
        response_key: Option<&str>,
        rest_fallback: F,
        retry_config: Option<&RetryConfig>,
    ) -> Result<Fetched<T>>
    where
        T: DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let channel = self.streaming.read().await.clone();
        let default_config;
        let retry_config = match retry_config {
            Some(config) => config,
            None => {
                default_config = self.default_retry_config();
                &default_config
            }
        };
        fetch_data_with_socket_fallback(
            &self.retry,
            channel.as_deref(),
            request,
            response_key,
            rest_fallback,
            retry_config,
        )
        .await
    }

    /// [`ResourceCache::fetch`] whose miss path is [`fetch_with_fallback`](Self::fetch_with_fallback).
    pub async fn fetch_cached_with_fallback<T, F, Fut>(
        &self,
        cache: &ResourceCache<T>,
        key: &ApiKey,
        no_cache: bool,
        request: &StreamingRequest,
        response_key: Option<&str>,
        rest_fallback: F,
    ) -> Result<Cached<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        cache
            .fetch(key, no_cache, move || async move {
                self.fetch_with_fallback(request, response_key, rest_fallback, None)
                    .await
                    .map(|fetched| fetched.value)
            })
            .await
    }

    // =========================================================================
    // Feeds
    // =========================================================================

    pub async fn merge_attachments(&self, request: MergeRequest<Attachment>) -> MergeOutcome<Attachment> {
        self.attachments.lock().await.merge(request)
    }

    pub fn attachments(&self) -> Arc<Mutex<FeedMerger<Attachment>>> {
        self.attachments.clone()
    }

    // =========================================================================
    // Badges
    // =========================================================================

    /// Mark a channel read. Bursts on the same channel are debounced; the
    /// trailing call is applied by a background timer when the window closes.
    #[instrument(
        name = "badge.reset",
        skip_all,
        fields(clan_id = %params.clan_id, channel_id = %params.channel_id)
    )]
    pub async fn reset_channel_badge_count(&self, params: ResetBadgeParams) -> ResetDisposition {
        let disposition = self.badges.lock().await.request_reset(params);
        if let ResetDisposition::Deferred {
            key,
            deadline,
            arm_timer: true,
        } = &disposition
        {
            self.spawn_reset_timer(key.clone(), *deadline);
        }
        disposition
    }

    pub async fn decrease_channel_badge_count(&self, event: &MessageEvent, viewer: &Viewer) -> bool {
        self.badges
            .lock()
            .await
            .decrease_channel_badge_count(event, viewer)
    }

    pub async fn increase_channel_badge_count(&self, event: &MessageEvent, viewer: &Viewer) -> bool {
        self.badges
            .lock()
            .await
            .increase_channel_badge_count(event, viewer)
    }

    /// Apply all pending trailing resets without waiting for their timers.
    pub async fn flush_badge_resets(&self) -> usize {
        self.badges.lock().await.flush_resets()
    }

    /// Read badge counters under the lock.
    pub async fn with_badges<R>(&self, read: impl FnOnce(&BadgeCounters) -> R) -> R {
        read(self.badges.lock().await.counters())
    }

    /// Update badge counters, e.g. from a server snapshot.
    pub async fn update_badges<R>(&self, update: impl FnOnce(&mut BadgeCounters) -> R) -> R {
        update(self.badges.lock().await.counters_mut())
    }

    fn spawn_reset_timer(&self, key: String, deadline: Instant) {
        let badges = self.badges.clone();
        tokio::spawn(async move {
            let mut deadline = deadline;
            loop {
                tokio::time::sleep_until(deadline).await;
                let poll = badges.lock().await.poll_reset(&key);
                match poll {
                    ResetPoll::Wait(next) => deadline = next,
                    ResetPoll::Applied(applied) => {
                        tracing::trace!(%key, applied, "Trailing badge reset fired");
                        break;
                    }
                    ResetPoll::Idle => break,
                }
            }
        });
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Session teardown: forget first-call history, cached resources, badge
    /// state and feeds. Pending badge timers find nothing to apply and exit.
    pub async fn reset(&self) {
        self.tracker.clear();
        for cache in self.lock_caches().iter() {
            cache.clear_entries();
        }
        self.badges.lock().await.reset();
        self.attachments.lock().await.reset();
        if let Some(online) = self.retry.online_status() {
            online.invalidate().await;
        }
        tracing::info!("Sync context reset");
    }

    /// [`reset`](Self::reset), then drop the streaming channel and the cache
    /// registrations.
    pub async fn dispose(&self) {
        self.reset().await;
        self.set_streaming_channel(None).await;
        self.lock_caches().clear();
    }

    fn lock_caches(&self) -> MutexGuard<'_, Vec<Box<dyn ClearOnReset>>> {
        self.caches.lock().unwrap_or_else(|e| e.into_inner())
    }
}
