//! Retry with exponential backoff and jitter.
//!
//! [`RetryEngine::run`] executes an async operation up to `max_retries + 1`
//! times. Each attempt is bounded by a per-attempt timeout. Errors are
//! classified by a caller-supplied predicate or, by default, by
//! [`SyncError::is_transient`]; fatal errors are returned without consuming a
//! retry. When the network looks offline the wait before the next attempt is
//! pinned to a fixed offline delay instead of the computed backoff.

mod online;

pub use online::{ConnectivityProbe, HttpConnectivityProbe, OnlineStatus};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::instrument;

use crate::config::{
    RetrySettings, BACKOFF_JITTER_FACTOR, DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_OFFLINE_RETRY_DELAY_MS,
};
use crate::error::{Result, SyncError};

/// Decides whether an error is worth another attempt. Receives the error and
/// the 1-based number of the attempt that produced it.
pub type ShouldRetryFn = Arc<dyn Fn(&SyncError, u32) -> bool + Send + Sync>;

/// Called before sleeping ahead of a retry with the error, the 1-based number
/// of the failed attempt and the delay about to be applied.
pub type OnRetryFn = Arc<dyn Fn(&SyncError, u32, Duration) + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_exponential_backoff: bool,
    pub timeout: Duration,
    pub check_online_status: bool,
    pub should_retry: Option<ShouldRetryFn>,
    pub on_retry: Option<OnRetryFn>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            use_exponential_backoff: true,
            timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            check_online_status: true,
            should_retry: None,
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("use_exponential_backoff", &self.use_exponential_backoff)
            .field("timeout", &self.timeout)
            .field("check_online_status", &self.check_online_status)
            .field("should_retry", &self.should_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            use_exponential_backoff: settings.use_exponential_backoff,
            timeout: Duration::from_millis(settings.timeout_ms),
            check_online_status: settings.check_online_status,
            should_retry: None,
            on_retry: None,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.use_exponential_backoff = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_online_check(mut self, enabled: bool) -> Self {
        self.check_online_status = enabled;
        self
    }

    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SyncError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    pub fn with_on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SyncError, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn is_retryable(&self, error: &SyncError, attempt: u32) -> bool {
        match &self.should_retry {
            Some(predicate) => predicate(error, attempt),
            None => error.is_transient(),
        }
    }

    /// Backoff before retrying after failed attempt `attempt` (1-based), using
    /// `jitter` as the fractional jitter in `[0, BACKOFF_JITTER_FACTOR)`.
    pub fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        if !self.use_exponential_backoff {
            return self.initial_delay;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let jittered_ms = base_ms * (1.0 + jitter);
        let capped_ms = jittered_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms.max(0.0) as u64)
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0.0..BACKOFF_JITTER_FACTOR);
        self.backoff_delay(attempt, jitter)
    }
}

/// Runs operations under a [`RetryConfig`], optionally consulting a shared
/// [`OnlineStatus`] before each wait.
#[derive(Clone)]
pub struct RetryEngine {
    online: Option<OnlineStatus>,
    offline_delay: Duration,
}

impl Default for RetryEngine {
    fn default() -> Self {
        Self {
            online: None,
            offline_delay: Duration::from_millis(DEFAULT_OFFLINE_RETRY_DELAY_MS),
        }
    }
}

impl RetryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_online_status(online: OnlineStatus, offline_delay: Duration) -> Self {
        Self {
            online: Some(online),
            offline_delay,
        }
    }

    pub fn online_status(&self) -> Option<&OnlineStatus> {
        self.online.as_ref()
    }

    #[instrument(
        name = "retry.run",
        skip_all,
        fields(max_retries = config.max_retries, attempts)
    )]
    pub async fn run<T, F, Fut>(&self, config: &RetryConfig, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::Span::current().record("attempts", attempt);

            let outcome = match tokio::time::timeout(config.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout(config.timeout)),
            };

            let error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !config.is_retryable(&error, attempt) {
                tracing::debug!(attempt, error = %error, "Non-retryable error");
                return Err(error);
            }

            if attempt >= config.max_attempts() {
                tracing::error!(
                    attempts = attempt,
                    error = %error,
                    "Operation failed after exhausting retries"
                );
                return Err(error);
            }

            let mut delay = config.jittered_backoff(attempt);
            if config.check_online_status {
                if let Some(online) = &self.online {
                    if !online.is_online().await {
                        delay = self.offline_delay;
                    }
                }
            }

            if let Some(callback) = &config.on_retry {
                callback(&error, attempt, delay);
            }

            tracing::warn!(
                attempt,
                max_attempts = config.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Run `operation` under `config` without an online-status check.
pub async fn with_retry<T, F, Fut>(operation: F, config: &RetryConfig) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryEngine::default().run(config, operation).await
}
