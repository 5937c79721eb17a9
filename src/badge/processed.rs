//! Time-bounded record of already-applied events.
//!
//! The same logical event can be delivered more than once (reconnect replays,
//! duplicate pushes). Each id is remembered for a fixed horizon; expired ids are
//! swept lazily, at most once per purge interval.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::PROCESSED_EVENT_PURGE_INTERVAL_SECS;

pub struct ProcessedEventCache {
    seen: HashMap<String, Instant>,
    horizon: Duration,
    last_purge: Instant,
}

impl ProcessedEventCache {
    pub fn new(horizon: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            horizon,
            last_purge: Instant::now(),
        }
    }

    /// Compose an event id from its parts, e.g. `("removed", channel, message)`.
    pub fn event_id(parts: &[&str]) -> String {
        parts.join(":")
    }

    /// Record `id` as processed. Returns false if it was already processed
    /// within the horizon, in which case the caller must not reapply it.
    pub fn check_and_record(&mut self, id: &str) -> bool {
        let now = Instant::now();
        self.purge_expired(now);

        if let Some(processed_at) = self.seen.get(id) {
            if now.duration_since(*processed_at) < self.horizon {
                return false;
            }
        }
        self.seen.insert(id.to_string(), now);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen
            .get(id)
            .is_some_and(|processed_at| processed_at.elapsed() < self.horizon)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    fn purge_expired(&mut self, now: Instant) {
        if now.duration_since(self.last_purge) < Duration::from_secs(PROCESSED_EVENT_PURGE_INTERVAL_SECS)
        {
            return;
        }
        let horizon = self.horizon;
        let before = self.seen.len();
        self.seen
            .retain(|_, processed_at| now.duration_since(*processed_at) < horizon);
        self.last_purge = now;

        let purged = before - self.seen.len();
        if purged > 0 {
            tracing::trace!(purged, remaining = self.seen.len(), "Purged processed events");
        }
    }
}
