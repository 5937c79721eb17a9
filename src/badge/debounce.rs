//! Per-key leading + trailing debounce.
//!
//! The first call for a key runs immediately. Calls arriving inside the window
//! replace any pending call and push the window out; when the window finally
//! closes, the most recent pending call fires once. The caller owns the clock
//! and the timer: [`Debouncer::poll`] tells it whether a key is due.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, PartialEq, Eq)]
pub enum Submission<P> {
    /// Leading call: run these params now
    RunNow(P),
    /// Held as the trailing call. `arm_timer` is set on the first deferral of
    /// a window; later deferrals reuse the timer already running.
    Deferred { deadline: Instant, arm_timer: bool },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Poll<P> {
    /// Window closed with a pending call
    Fire(P),
    /// Window still open; check again at this instant
    Wait(Instant),
    Idle,
}

struct Slot<P> {
    deadline: Instant,
    pending: Option<P>,
    last_used: Instant,
}

pub struct Debouncer<P> {
    window: Duration,
    max_keys: usize,
    slots: HashMap<String, Slot<P>>,
}

impl<P> Debouncer<P> {
    pub fn new(window: Duration, max_keys: usize) -> Self {
        Self {
            window,
            max_keys: max_keys.max(1),
            slots: HashMap::new(),
        }
    }

    pub fn submit(&mut self, key: &str, params: P, now: Instant) -> Submission<P> {
        let deadline = now + self.window;

        if let Some(slot) = self.slots.get_mut(key) {
            slot.last_used = now;
            if now < slot.deadline {
                let arm_timer = slot.pending.is_none();
                slot.pending = Some(params);
                slot.deadline = deadline;
                return Submission::Deferred {
                    deadline,
                    arm_timer,
                };
            }
            // Window already closed; a newer call supersedes any unflushed trailing call
            slot.pending = None;
            slot.deadline = deadline;
            return Submission::RunNow(params);
        }

        self.slots.insert(
            key.to_string(),
            Slot {
                deadline,
                pending: None,
                last_used: now,
            },
        );
        self.evict_idle(now);
        Submission::RunNow(params)
    }

    pub fn poll(&mut self, key: &str, now: Instant) -> Poll<P> {
        let Some(slot) = self.slots.get_mut(key) else {
            return Poll::Idle;
        };
        if now < slot.deadline {
            return match slot.pending {
                Some(_) => Poll::Wait(slot.deadline),
                None => Poll::Idle,
            };
        }
        match slot.pending.take() {
            Some(params) => Poll::Fire(params),
            None => Poll::Idle,
        }
    }

    /// Take every pending call regardless of its deadline.
    pub fn drain_pending(&mut self) -> Vec<(String, P)> {
        self.slots
            .iter_mut()
            .filter_map(|(key, slot)| slot.pending.take().map(|params| (key.clone(), params)))
            .collect()
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.pending.is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    // Drops least-recently-used keys with no pending call until within bounds.
    fn evict_idle(&mut self, now: Instant) {
        while self.slots.len() > self.max_keys {
            let victim = self
                .slots
                .iter()
                .filter(|(_, slot)| slot.pending.is_none() && now >= slot.deadline)
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    self.slots.remove(&key);
                }
                None => break,
            }
        }
    }
}
