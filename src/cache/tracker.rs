//! API call tracking.
//!
//! An [`ApiKey`] identifies one logical fetch (operation name plus every parameter
//! that distinguishes it). The [`ApiCallTracker`] remembers which keys have been
//! called at least once in the current session so the first call for a key always
//! performs a real round-trip, even if another path already wrote fresh data.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::API_KEY_SEPARATOR;

/// Deterministic identifier for a logical fetch operation.
///
/// Parts are joined in order; call sites must pass them in a consistent order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn from_parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: fmt::Display,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(API_KEY_SEPARATOR);
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build an [`ApiKey`] from heterogeneous parts.
///
/// ```
/// let key = clansync::api_key!("fetchChannels", "clan-1", 50);
/// assert_eq!(key.as_str(), "fetchChannels_clan-1_50");
/// ```
#[macro_export]
macro_rules! api_key {
    ($($part:expr),+ $(,)?) => {
        $crate::cache::ApiKey::from_parts([$(::std::string::ToString::to_string(&$part)),+])
    };
}

/// Session-wide registry of keys that have been "first called".
///
/// Cloning shares the underlying registry.
#[derive(Debug, Clone, Default)]
pub struct ApiCallTracker {
    called: Arc<Mutex<HashSet<String>>>,
}

impl ApiCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` has been called. Idempotent.
    pub fn mark_api_first_called(&self, key: &ApiKey) {
        let mut called = self.lock();
        if called.insert(key.0.clone()) {
            tracing::trace!(%key, "API key first called");
        }
    }

    pub fn has_been_called(&self, key: &ApiKey) -> bool {
        self.lock().contains(key.as_str())
    }

    /// Forget every key. Only for session teardown, never on transient errors.
    pub fn clear(&self) {
        let mut called = self.lock();
        tracing::debug!(keys = called.len(), "Clearing API call tracker");
        called.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The set is only ever mutated by infallible inserts, so a poisoned lock
    // still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.called.lock().unwrap_or_else(|e| e.into_inner())
    }
}
