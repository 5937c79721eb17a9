//! Connectivity probing with a shared, short-lived result cache.
//!
//! At most one probe is in flight at a time; concurrent callers subscribe to the
//! in-flight probe and receive its result. A completed result is reused for the
//! configured cache window (2 seconds by default) to avoid probe storms while
//! many retries back off at once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::instrument;

use crate::config::{
    ProbeSettings, BROADCAST_CHANNEL_CAPACITY, DEFAULT_PROBE_CACHE_MS, DEFAULT_PROBE_TIMEOUT_MS,
    PROBE_USER_AGENT,
};
use crate::error::Result;

/// Lightweight reachability check that needs no authentication.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true when the network looks reachable.
    async fn probe(&self) -> bool;
}

/// Probe that issues a `HEAD` request; any HTTP response counts as online.
pub struct HttpConnectivityProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpConnectivityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(PROBE_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_settings(settings: &ProbeSettings) -> Result<Self> {
        Self::new(settings.url.clone(), settings.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpConnectivityProbe {
    async fn probe(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(response) => {
                tracing::debug!(url = %self.url, status = response.status().as_u16(), "Connectivity probe succeeded");
                true
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}

/// In-flight probe with its start time, used to detect abandoned probes
type PendingProbe = (broadcast::Sender<bool>, Instant);

#[derive(Default)]
struct ProbeState {
    last: Option<(bool, Instant)>,
    pending: Option<PendingProbe>,
}

/// Shared online/offline status backed by a [`ConnectivityProbe`].
///
/// Cloning shares the cached result and the in-flight probe.
#[derive(Clone)]
pub struct OnlineStatus {
    probe: Arc<dyn ConnectivityProbe>,
    state: Arc<Mutex<ProbeState>>,
    cache_ttl: Duration,
    probe_timeout: Duration,
}

impl OnlineStatus {
    pub fn new(probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self::with_timing(
            probe,
            Duration::from_millis(DEFAULT_PROBE_CACHE_MS),
            Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        )
    }

    pub fn with_timing(
        probe: Arc<dyn ConnectivityProbe>,
        cache_ttl: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            probe,
            state: Arc::new(Mutex::new(ProbeState::default())),
            cache_ttl,
            probe_timeout,
        }
    }

    /// Check connectivity, reusing a recent result or an in-flight probe.
    #[instrument(
        name = "online.is_online",
        skip(self),
        fields(cache_hit = false, coalesced = false, duration_ms)
    )]
    pub async fn is_online(&self) -> bool {
        let start = Instant::now();
        let mut state = self.state.lock().await;

        if let Some((online, checked_at)) = state.last {
            if checked_at.elapsed() < self.cache_ttl {
                tracing::Span::current().record("cache_hit", true);
                return online;
            }
        }

        // Join the in-flight probe unless it has been abandoned
        if let Some((tx, started_at)) = state.pending.as_ref() {
            if started_at.elapsed() < self.probe_timeout {
                let rx = tx.subscribe();
                drop(state);
                tracing::Span::current().record("coalesced", true);
                return self.await_probe(rx, start).await;
            }
            tracing::debug!("Pending connectivity probe timed out, starting new probe");
            state.pending = None;
        }

        let (tx, rx) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        state.pending = Some((tx.clone(), Instant::now()));
        drop(state);

        self.spawn_probe(tx);
        self.await_probe(rx, start).await
    }

    // The probe runs detached so its result is published even if the caller
    // that started it is dropped.
    fn spawn_probe(&self, tx: broadcast::Sender<bool>) {
        let probe = self.probe.clone();
        let state = self.state.clone();
        let probe_timeout = self.probe_timeout;

        tokio::spawn(async move {
            let online = tokio::time::timeout(probe_timeout, probe.probe())
                .await
                .unwrap_or(false);

            {
                let mut state = state.lock().await;
                state.last = Some((online, Instant::now()));
                state.pending = None;
            }
            let _ = tx.send(online);

            if !online {
                tracing::info!("Network appears to be offline");
            }
        });
    }

    async fn await_probe(&self, mut rx: broadcast::Receiver<bool>, start: Instant) -> bool {
        // The probe task is bounded by probe_timeout; the extra window covers publishing
        let online = match tokio::time::timeout(self.probe_timeout * 2, rx.recv()).await {
            Ok(Ok(online)) => online,
            // No answer counts as offline, same as a hung probe
            Ok(Err(_)) | Err(_) => false,
        };
        tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        online
    }

    /// Drop the cached result so the next check probes again.
    pub async fn invalidate(&self) {
        self.state.lock().await.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
        online: AtomicBool,
        latency: Duration,
    }

    impl CountingProbe {
        fn new(online: bool, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                online: AtomicBool::new(online),
                latency,
            })
        }
    }

    #[async_trait]
    impl ConnectivityProbe for CountingProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.online.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_probe() {
        let probe = CountingProbe::new(false, Duration::from_millis(200));
        let status = OnlineStatus::new(probe.clone());

        let results = futures::future::join_all((0..8).map(|_| {
            let status = status.clone();
            async move { status.is_online().await }
        }))
        .await;

        assert!(results.iter().all(|online| !online));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_cached_for_window() {
        let probe = CountingProbe::new(true, Duration::ZERO);
        let status = OnlineStatus::new(probe.clone());

        assert!(status.is_online().await);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(status.is_online().await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        probe.online.store(false, Ordering::SeqCst);
        assert!(!status.is_online().await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_counts_as_offline() {
        let probe = CountingProbe::new(true, Duration::from_secs(60));
        let status = OnlineStatus::with_timing(
            probe.clone(),
            Duration::from_secs(2),
            Duration::from_secs(1),
        );
        assert!(!status.is_online().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_first_caller_still_publishes_result() {
        let probe = CountingProbe::new(false, Duration::from_millis(100));
        let status = OnlineStatus::new(probe.clone());

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), status.is_online()).await;
        assert!(cancelled.is_err());

        let start = Instant::now();
        assert!(!status.is_online().await);
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_cached_after_first_caller_cancelled() {
        let probe = CountingProbe::new(false, Duration::from_millis(100));
        let status = OnlineStatus::new(probe.clone());

        let _ = tokio::time::timeout(Duration::from_millis(10), status.is_online()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!status.is_online().await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_new_probe() {
        let probe = CountingProbe::new(true, Duration::ZERO);
        let status = OnlineStatus::new(probe.clone());
        status.is_online().await;
        status.invalidate().await;
        status.is_online().await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_http_probe_keeps_url() {
        let probe =
            HttpConnectivityProbe::new("http://127.0.0.1:9/health", Duration::from_secs(1)).unwrap();
        assert_eq!(probe.url(), "http://127.0.0.1:9/health");
    }
}
