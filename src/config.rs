//! Configuration loading and constants.
//!
//! Loads synchronization settings from TOML files and defines constants for
//! retry/backoff defaults, connectivity probing, cache TTLs, badge reconciliation
//! and logging. `SyncConfig` is the root configuration struct; every section has
//! defaults so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use const_format::formatcp;
use serde::{Deserialize, Serialize};

// =============================================================================
// Retry / Backoff Defaults
// =============================================================================

/// Retries after the first attempt before the last error is returned
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry, in milliseconds
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Upper bound for any computed retry delay, in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Growth factor between consecutive retry delays
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Hard timeout for a single attempt, in milliseconds
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

/// Upper bound (exclusive) of the multiplicative jitter added to backoff delays
pub const BACKOFF_JITTER_FACTOR: f64 = 0.3;

// =============================================================================
// Connectivity Probe Constants
// =============================================================================

/// How long a probe result is shared between callers, in milliseconds
pub const DEFAULT_PROBE_CACHE_MS: u64 = 2000;

/// Timeout for a single connectivity probe, in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

/// Retry delay used instead of the computed backoff while offline, in milliseconds
pub const DEFAULT_OFFLINE_RETRY_DELAY_MS: u64 = 5000;

/// Default unauthenticated endpoint used for reachability checks
pub const DEFAULT_PROBE_URL: &str = "https://www.gstatic.com/generate_204";

/// Capacity of broadcast channels used to share in-flight probe results
pub const BROADCAST_CHANNEL_CAPACITY: usize = 16;

/// User agent sent with connectivity probes
pub const PROBE_USER_AGENT: &str = formatcp!("clansync/{}", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Cache TTL Defaults
// =============================================================================

/// TTL for ordinary resources (channel lists, attachments), in seconds
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// TTL for session/profile data that rarely changes, in seconds
pub const SESSION_CACHE_TTL_SECS: u64 = 86_400;

/// TTL for live counts; zero means every read is stale
pub const LIVE_CACHE_TTL_SECS: u64 = 0;

/// Maximum entries held by a single resource cache
pub const DEFAULT_MAX_CACHE_ENTRIES: u64 = 10_000;

/// Separator used when joining API key parts
pub const API_KEY_SEPARATOR: &str = "_";

// =============================================================================
// Badge Reconciliation Constants
// =============================================================================

/// Debounce window for badge resets on the same (clan, channel), in milliseconds
pub const DEFAULT_RESET_DEBOUNCE_MS: u64 = 100;

/// How long a processed event id suppresses reapplication (5 hours), in seconds
pub const DEFAULT_PROCESSED_EVENT_HORIZON_SECS: u64 = 5 * 60 * 60;

/// Maximum number of (clan, channel) keys tracked by the reset debouncer
pub const DEFAULT_MAX_DEBOUNCE_KEYS: usize = 4096;

/// Clan id used by direct-message channels
pub const DM_CLAN_ID: &str = "0";

/// Minimum interval between sweeps of expired processed-event ids, in seconds
pub const PROCESSED_EVENT_PURGE_INTERVAL_SECS: u64 = 60;

// =============================================================================
// Feed Constants
// =============================================================================

/// Default page size for paginated feeds
pub const DEFAULT_FEED_PAGE_LIMIT: usize = 50;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/clansync.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "clansync=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Retry engine defaults applied to REST fallbacks
    #[serde(default)]
    pub retry: RetrySettings,
    /// Resource cache TTLs and bounds
    #[serde(default)]
    pub cache: CacheSettings,
    /// Unread-badge reconciliation tuning
    #[serde(default)]
    pub badge: BadgeSettings,
    /// Connectivity probe settings
    #[serde(default)]
    pub probe: ProbeSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retry engine settings. Converted into a `RetryConfig` by the retry module.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "RetrySettings::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "RetrySettings::default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "RetrySettings::default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "RetrySettings::default_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_true")]
    pub use_exponential_backoff: bool,
    /// Hard timeout for each attempt
    #[serde(default = "RetrySettings::default_timeout")]
    pub timeout_ms: u64,
    /// Probe connectivity before sleeping between attempts
    #[serde(default = "default_true")]
    pub check_online_status: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            initial_delay_ms: Self::default_initial_delay(),
            max_delay_ms: Self::default_max_delay(),
            backoff_multiplier: Self::default_multiplier(),
            use_exponential_backoff: true,
            timeout_ms: Self::default_timeout(),
            check_online_status: true,
        }
    }
}

impl RetrySettings {
    fn default_max_retries() -> u32 {
        DEFAULT_MAX_RETRIES
    }
    fn default_initial_delay() -> u64 {
        DEFAULT_INITIAL_DELAY_MS
    }
    fn default_max_delay() -> u64 {
        DEFAULT_MAX_DELAY_MS
    }
    fn default_multiplier() -> f64 {
        DEFAULT_BACKOFF_MULTIPLIER
    }
    fn default_timeout() -> u64 {
        DEFAULT_ATTEMPT_TIMEOUT_MS
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// TTL for ordinary resources in seconds (default: 5 minutes)
    #[serde(default = "CacheSettings::default_ttl_secs")]
    pub default_ttl_seconds: u64,
    /// TTL for session/profile data in seconds (default: 24 hours)
    #[serde(default = "CacheSettings::default_session_ttl")]
    pub session_ttl_seconds: u64,
    /// TTL for live counts in seconds (default: 0, always stale)
    #[serde(default = "CacheSettings::default_live_ttl")]
    pub live_ttl_seconds: u64,
    /// Maximum entries per resource cache (default: 10000)
    #[serde(default = "CacheSettings::default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_seconds: Self::default_ttl_secs(),
            session_ttl_seconds: Self::default_session_ttl(),
            live_ttl_seconds: Self::default_live_ttl(),
            max_entries: Self::default_max_entries(),
        }
    }
}

impl CacheSettings {
    fn default_ttl_secs() -> u64 {
        DEFAULT_CACHE_TTL_SECS
    }
    fn default_session_ttl() -> u64 {
        SESSION_CACHE_TTL_SECS
    }
    fn default_live_ttl() -> u64 {
        LIVE_CACHE_TTL_SECS
    }
    fn default_max_entries() -> u64 {
        DEFAULT_MAX_CACHE_ENTRIES
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn live_ttl(&self) -> Duration {
        Duration::from_secs(self.live_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BadgeSettings {
    /// Debounce window for resets per (clan, channel) (default: 100ms)
    #[serde(default = "BadgeSettings::default_debounce")]
    pub reset_debounce_ms: u64,
    /// Duplicate-suppression horizon for processed events (default: 5 hours)
    #[serde(default = "BadgeSettings::default_horizon")]
    pub processed_event_horizon_seconds: u64,
    /// Bound on tracked debounce keys (default: 4096)
    #[serde(default = "BadgeSettings::default_max_keys")]
    pub max_debounce_keys: usize,
}

impl Default for BadgeSettings {
    fn default() -> Self {
        Self {
            reset_debounce_ms: Self::default_debounce(),
            processed_event_horizon_seconds: Self::default_horizon(),
            max_debounce_keys: Self::default_max_keys(),
        }
    }
}

impl BadgeSettings {
    fn default_debounce() -> u64 {
        DEFAULT_RESET_DEBOUNCE_MS
    }
    fn default_horizon() -> u64 {
        DEFAULT_PROCESSED_EVENT_HORIZON_SECS
    }
    fn default_max_keys() -> usize {
        DEFAULT_MAX_DEBOUNCE_KEYS
    }

    pub fn reset_debounce(&self) -> Duration {
        Duration::from_millis(self.reset_debounce_ms)
    }

    pub fn processed_event_horizon(&self) -> Duration {
        Duration::from_secs(self.processed_event_horizon_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeSettings {
    /// Unauthenticated URL used for reachability checks
    #[serde(default = "ProbeSettings::default_url")]
    pub url: String,
    #[serde(default = "ProbeSettings::default_timeout")]
    pub timeout_ms: u64,
    /// How long a probe result is reused (default: 2 seconds)
    #[serde(default = "ProbeSettings::default_cache")]
    pub cache_ms: u64,
    /// Retry delay while offline (default: 5 seconds)
    #[serde(default = "ProbeSettings::default_offline_delay")]
    pub offline_retry_delay_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            timeout_ms: Self::default_timeout(),
            cache_ms: Self::default_cache(),
            offline_retry_delay_ms: Self::default_offline_delay(),
        }
    }
}

impl ProbeSettings {
    fn default_url() -> String {
        DEFAULT_PROBE_URL.to_string()
    }
    fn default_timeout() -> u64 {
        DEFAULT_PROBE_TIMEOUT_MS
    }
    fn default_cache() -> u64 {
        DEFAULT_PROBE_CACHE_MS
    }
    fn default_offline_delay() -> u64 {
        DEFAULT_OFFLINE_RETRY_DELAY_MS
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ms)
    }

    pub fn offline_retry_delay(&self) -> Duration {
        Duration::from_millis(self.offline_retry_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

fn default_true() -> bool {
    true
}

impl SyncConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Validation(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.retry.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "retry.timeout_ms must be greater than zero".to_string(),
            ));
        }
        match reqwest::Url::parse(&self.probe.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::Validation(format!(
                    "probe.url must use http or https, got {}",
                    url.scheme()
                )))
            }
            Err(e) => {
                return Err(ConfigError::Validation(format!(
                    "probe.url is not a valid URL: {}",
                    e
                )))
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
