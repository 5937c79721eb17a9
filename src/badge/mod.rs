//! Unread badge reconciliation.
//!
//! Badge counts exist at several scopes that must agree:
//!
//! - per channel, with the last-seen timestamp for that channel
//! - per clan, the total across its channels
//! - two per-channel mirrors (channel list rendering and clan membership)
//! - per direct-message channel, kept apart from any clan
//!
//! Every mutation goes through [`BadgeReconciler`], which de-duplicates
//! replayed events and debounces bursts of resets on the same channel.

mod debounce;
mod processed;

pub use debounce::{Debouncer, Poll, Submission};
pub use processed::ProcessedEventCache;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::{BadgeSettings, DM_CLAN_ID};

/// Marks a channel read up to `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetBadgeParams {
    pub clan_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub last_seen_time: DateTime<Utc>,
}

impl ResetBadgeParams {
    pub fn is_direct_message(&self) -> bool {
        self.clan_id == DM_CLAN_ID
    }

    pub fn debounce_key(&self) -> String {
        format!("{}:{}", self.clan_id, self.channel_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEventCode {
    Created,
    Updated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Mention {
    /// Mentions everyone present in the channel
    Here,
    User(String),
    Role(String),
}

/// A message lifecycle event as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub clan_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub code: MessageEventCode,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub reply_to_sender_id: Option<String>,
}

impl MessageEvent {
    /// Whether the event mentions the viewer (directly, by role or via
    /// `@here`) or replies to one of the viewer's messages.
    pub fn concerns(&self, viewer: &Viewer) -> bool {
        let mentioned = self.mentions.iter().any(|mention| match mention {
            Mention::Here => true,
            Mention::User(user_id) => *user_id == viewer.user_id,
            Mention::Role(role_id) => viewer.role_ids.contains(role_id),
        });
        mentioned || self.reply_to_sender_id.as_deref() == Some(viewer.user_id.as_str())
    }

    pub fn is_direct_message(&self) -> bool {
        self.clan_id == DM_CLAN_ID
    }
}

/// The signed-in user, with the role ids they hold in the event's clan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
    pub role_ids: HashSet<String>,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_ids: HashSet::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_ids.extend(roles.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelBadge {
    pub clan_id: String,
    pub count: u32,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_seen_message_id: Option<String>,
}

impl ChannelBadge {
    fn mark_seen(&mut self, message_id: &str, seen_at: DateTime<Utc>) {
        // Out-of-order resets must not move the read marker backwards
        if self.last_seen.map_or(true, |current| seen_at >= current) {
            self.last_seen = Some(seen_at);
            self.last_seen_message_id = Some(message_id.to_string());
        }
    }

    fn already_seen(&self, create_time: DateTime<Utc>) -> bool {
        self.last_seen.is_some_and(|seen| create_time <= seen)
    }
}

/// All badge counters, keyed by channel or clan id.
#[derive(Debug, Default)]
pub struct BadgeCounters {
    channels: HashMap<String, ChannelBadge>,
    clans: HashMap<String, u32>,
    list_render: HashMap<String, u32>,
    memberships: HashMap<String, u32>,
    direct_messages: HashMap<String, ChannelBadge>,
}

impl BadgeCounters {
    pub fn channel(&self, channel_id: &str) -> Option<&ChannelBadge> {
        self.channels.get(channel_id)
    }

    pub fn channel_count(&self, channel_id: &str) -> u32 {
        self.channels.get(channel_id).map_or(0, |badge| badge.count)
    }

    pub fn clan_count(&self, clan_id: &str) -> u32 {
        self.clans.get(clan_id).copied().unwrap_or(0)
    }

    pub fn list_render_count(&self, channel_id: &str) -> u32 {
        self.list_render.get(channel_id).copied().unwrap_or(0)
    }

    pub fn membership_count(&self, channel_id: &str) -> u32 {
        self.memberships.get(channel_id).copied().unwrap_or(0)
    }

    pub fn direct_message(&self, channel_id: &str) -> Option<&ChannelBadge> {
        self.direct_messages.get(channel_id)
    }

    pub fn direct_message_count(&self, channel_id: &str) -> u32 {
        self.direct_messages.get(channel_id).map_or(0, |badge| badge.count)
    }

    /// Seed a channel count from a server snapshot. Updates both mirrors.
    pub fn set_channel_count(&mut self, clan_id: &str, channel_id: &str, count: u32) {
        let badge = self.channels.entry(channel_id.to_string()).or_default();
        badge.clan_id = clan_id.to_string();
        badge.count = count;
        self.list_render.insert(channel_id.to_string(), count);
        self.memberships.insert(channel_id.to_string(), count);
    }

    pub fn set_clan_count(&mut self, clan_id: &str, count: u32) {
        self.clans.insert(clan_id.to_string(), count);
    }

    pub fn set_direct_message_count(&mut self, channel_id: &str, count: u32) {
        let badge = self.direct_messages.entry(channel_id.to_string()).or_default();
        badge.clan_id = DM_CLAN_ID.to_string();
        badge.count = count;
    }

    fn set_mirrors(&mut self, channel_id: &str, count: u32) {
        self.list_render.insert(channel_id.to_string(), count);
        self.memberships.insert(channel_id.to_string(), count);
    }

    fn adjust_mirrors(&mut self, channel_id: &str, adjust: impl Fn(u32) -> u32) {
        for mirror in [&mut self.list_render, &mut self.memberships] {
            let value = mirror.entry(channel_id.to_string()).or_default();
            *value = adjust(*value);
        }
    }

    fn clear(&mut self) {
        self.channels.clear();
        self.clans.clear();
        self.list_render.clear();
        self.memberships.clear();
        self.direct_messages.clear();
    }
}

/// What happened to a reset request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetDisposition {
    /// Applied immediately; false when it was a duplicate
    Applied(bool),
    /// Held as the trailing call for `key`
    Deferred {
        key: String,
        deadline: Instant,
        arm_timer: bool,
    },
}

/// Outcome of polling a debounced reset key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPoll {
    Applied(bool),
    Wait(Instant),
    Idle,
}

pub struct BadgeReconciler {
    counters: BadgeCounters,
    processed: ProcessedEventCache,
    resets: Debouncer<ResetBadgeParams>,
}

impl BadgeReconciler {
    pub fn new(settings: &BadgeSettings) -> Self {
        Self {
            counters: BadgeCounters::default(),
            processed: ProcessedEventCache::new(settings.processed_event_horizon()),
            resets: Debouncer::new(settings.reset_debounce(), settings.max_debounce_keys),
        }
    }

    pub fn counters(&self) -> &BadgeCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut BadgeCounters {
        &mut self.counters
    }

    /// Debounced reset: leading call applies now, bursts collapse into one
    /// trailing application with the latest params.
    pub fn request_reset(&mut self, params: ResetBadgeParams) -> ResetDisposition {
        let key = params.debounce_key();
        match self.resets.submit(&key, params, Instant::now()) {
            Submission::RunNow(params) => ResetDisposition::Applied(self.apply_reset(&params)),
            Submission::Deferred {
                deadline,
                arm_timer,
            } => {
                tracing::trace!(%key, "Badge reset deferred");
                ResetDisposition::Deferred {
                    key,
                    deadline,
                    arm_timer,
                }
            }
        }
    }

    /// Apply the trailing reset for `key` if its window has closed.
    pub fn poll_reset(&mut self, key: &str) -> ResetPoll {
        match self.resets.poll(key, Instant::now()) {
            Poll::Fire(params) => ResetPoll::Applied(self.apply_reset(&params)),
            Poll::Wait(deadline) => ResetPoll::Wait(deadline),
            Poll::Idle => ResetPoll::Idle,
        }
    }

    /// Apply every pending trailing reset now, whether or not its window has
    /// closed. Returns how many were applied.
    pub fn flush_resets(&mut self) -> usize {
        let pending = self.resets.drain_pending();
        pending
            .into_iter()
            .filter(|(_, params)| self.apply_reset(params))
            .count()
    }

    /// Zero the channel badge and reconcile the clan total. Returns false when
    /// this (channel, message) reset was already applied.
    pub fn apply_reset(&mut self, params: &ResetBadgeParams) -> bool {
        let event_id =
            ProcessedEventCache::event_id(&["reset", &params.channel_id, &params.message_id]);
        if !self.processed.check_and_record(&event_id) {
            tracing::debug!(channel_id = %params.channel_id, message_id = %params.message_id, "Duplicate badge reset ignored");
            return false;
        }

        if params.is_direct_message() {
            let badge = self
                .counters
                .direct_messages
                .entry(params.channel_id.clone())
                .or_default();
            badge.clan_id = DM_CLAN_ID.to_string();
            badge.count = 0;
            badge.mark_seen(&params.message_id, params.last_seen_time);
            return true;
        }

        let badge = self
            .counters
            .channels
            .entry(params.channel_id.clone())
            .or_default();
        badge.clan_id = params.clan_id.clone();
        let previous = badge.count;
        badge.count = 0;
        badge.mark_seen(&params.message_id, params.last_seen_time);
        self.counters.set_mirrors(&params.channel_id, 0);

        let clan_total = self
            .counters
            .clans
            .entry(params.clan_id.clone())
            .or_default();
        let removed = previous.min(*clan_total);
        *clan_total -= removed;

        tracing::debug!(
            clan_id = %params.clan_id,
            channel_id = %params.channel_id,
            previous,
            clan_removed = removed,
            "Channel badge reset"
        );
        true
    }

    /// Undo one unread mention when a message that mentioned (or replied to)
    /// the viewer is deleted before the viewer saw it.
    pub fn decrease_channel_badge_count(&mut self, event: &MessageEvent, viewer: &Viewer) -> bool {
        if event.code != MessageEventCode::Removed || event.sender_id == viewer.user_id {
            return false;
        }
        let Some(badge) = self.counters.channels.get(&event.channel_id) else {
            return false;
        };
        if badge.count == 0 || badge.already_seen(event.create_time) || !event.concerns(viewer) {
            return false;
        }

        let event_id =
            ProcessedEventCache::event_id(&["removed", &event.channel_id, &event.message_id]);
        if !self.processed.check_and_record(&event_id) {
            tracing::debug!(message_id = %event.message_id, "Duplicate removal ignored");
            return false;
        }

        if let Some(badge) = self.counters.channels.get_mut(&event.channel_id) {
            badge.count -= 1;
        }
        if let Some(clan_total) = self.counters.clans.get_mut(&event.clan_id) {
            *clan_total = clan_total.saturating_sub(1);
        }
        self.counters
            .adjust_mirrors(&event.channel_id, |value| value.saturating_sub(1));

        tracing::debug!(
            clan_id = %event.clan_id,
            channel_id = %event.channel_id,
            message_id = %event.message_id,
            "Channel badge decreased"
        );
        true
    }

    /// Count a newly created message that the viewer has not seen yet. Clan
    /// channels count only messages that concern the viewer; direct messages
    /// count every message from someone else.
    pub fn increase_channel_badge_count(&mut self, event: &MessageEvent, viewer: &Viewer) -> bool {
        if event.code != MessageEventCode::Created || event.sender_id == viewer.user_id {
            return false;
        }

        let seen = if event.is_direct_message() {
            self.counters.direct_messages.get(&event.channel_id)
        } else {
            self.counters.channels.get(&event.channel_id)
        };
        if seen.is_some_and(|badge| badge.already_seen(event.create_time)) {
            return false;
        }
        if !event.is_direct_message() && !event.concerns(viewer) {
            return false;
        }

        let event_id =
            ProcessedEventCache::event_id(&["created", &event.channel_id, &event.message_id]);
        if !self.processed.check_and_record(&event_id) {
            return false;
        }

        if event.is_direct_message() {
            let badge = self
                .counters
                .direct_messages
                .entry(event.channel_id.clone())
                .or_default();
            badge.clan_id = DM_CLAN_ID.to_string();
            badge.count = badge.count.saturating_add(1);
            return true;
        }

        let badge = self
            .counters
            .channels
            .entry(event.channel_id.clone())
            .or_default();
        badge.clan_id = event.clan_id.clone();
        badge.count = badge.count.saturating_add(1);
        let clan_total = self
            .counters
            .clans
            .entry(event.clan_id.clone())
            .or_default();
        *clan_total = clan_total.saturating_add(1);
        self.counters
            .adjust_mirrors(&event.channel_id, |value| value.saturating_add(1));
        true
    }

    /// Forget every counter, processed id and pending reset.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.processed.clear();
        self.resets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn reconciler() -> BadgeReconciler {
        BadgeReconciler::new(&BadgeSettings::default())
    }

    fn reset_params(channel: &str, message: &str, secs: i64) -> ResetBadgeParams {
        ResetBadgeParams {
            clan_id: "clan-1".to_string(),
            channel_id: channel.to_string(),
            message_id: message.to_string(),
            last_seen_time: at(secs),
        }
    }

    fn event(code: MessageEventCode, message: &str, secs: i64, mentions: Vec<Mention>) -> MessageEvent {
        MessageEvent {
            clan_id: "clan-1".to_string(),
            channel_id: "chan-1".to_string(),
            message_id: message.to_string(),
            sender_id: "author".to_string(),
            code,
            create_time: at(secs),
            mentions,
            reply_to_sender_id: None,
        }
    }

    fn viewer() -> Viewer {
        Viewer::new("me").with_roles(["mods"])
    }

    // =========================================================================
    // Reset
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_reset_subtracts_at_most_clan_total() {
        let mut badges = reconciler();
        badges.counters_mut().set_clan_count("clan-1", 3);
        badges.counters_mut().set_channel_count("clan-1", "chan-1", 5);

        assert!(badges.apply_reset(&reset_params("chan-1", "m9", 100)));

        let counters = badges.counters();
        assert_eq!(counters.clan_count("clan-1"), 0);
        assert_eq!(counters.channel_count("chan-1"), 0);
        assert_eq!(counters.list_render_count("chan-1"), 0);
        assert_eq!(counters.membership_count("chan-1"), 0);
        assert_eq!(counters.channel("chan-1").unwrap().last_seen, Some(at(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_leaves_other_channels_in_clan() {
        let mut badges = reconciler();
        badges.counters_mut().set_clan_count("clan-1", 7);
        badges.counters_mut().set_channel_count("clan-1", "chan-1", 2);
        badges.counters_mut().set_channel_count("clan-1", "chan-2", 5);

        badges.apply_reset(&reset_params("chan-1", "m1", 10));
        assert_eq!(badges.counters().clan_count("clan-1"), 5);
        assert_eq!(badges.counters().channel_count("chan-2"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_reset_is_noop() {
        let mut badges = reconciler();
        badges.counters_mut().set_clan_count("clan-1", 4);
        badges.counters_mut().set_channel_count("clan-1", "chan-1", 2);
        assert!(badges.apply_reset(&reset_params("chan-1", "m1", 10)));

        badges.counters_mut().set_channel_count("clan-1", "chan-1", 1);
        assert!(!badges.apply_reset(&reset_params("chan-1", "m1", 10)));
        assert_eq!(badges.counters().channel_count("chan-1"), 1);
        assert_eq!(badges.counters().clan_count("clan-1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_message_reset_skips_clan_counters() {
        let mut badges = reconciler();
        badges.counters_mut().set_direct_message_count("dm-1", 4);
        badges.counters_mut().set_clan_count(DM_CLAN_ID, 9);

        let params = ResetBadgeParams {
            clan_id: DM_CLAN_ID.to_string(),
            channel_id: "dm-1".to_string(),
            message_id: "m1".to_string(),
            last_seen_time: at(5),
        };
        assert!(badges.apply_reset(&params));
        assert_eq!(badges.counters().direct_message_count("dm-1"), 0);
        assert_eq!(
            badges.counters().direct_message("dm-1").unwrap().last_seen,
            Some(at(5))
        );
        assert_eq!(badges.counters().clan_count(DM_CLAN_ID), 9);
        assert!(badges.counters().channel("dm-1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_reset_keeps_newer_last_seen() {
        let mut badges = reconciler();
        badges.apply_reset(&reset_params("chan-1", "m2", 200));
        badges.apply_reset(&reset_params("chan-1", "m1", 100));
        let badge = badges.counters().channel("chan-1").unwrap();
        assert_eq!(badge.last_seen, Some(at(200)));
        assert_eq!(badge.last_seen_message_id.as_deref(), Some("m2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_burst_collapses_to_one_trailing_application() {
        let mut badges = reconciler();
        badges.counters_mut().set_clan_count("clan-1", 10);
        badges.counters_mut().set_channel_count("clan-1", "chan-1", 3);

        assert_eq!(
            badges.request_reset(reset_params("chan-1", "m1", 1)),
            ResetDisposition::Applied(true)
        );
        for i in 2..=5 {
            badges.counters_mut().set_channel_count("clan-1", "chan-1", 1);
            let disposition = badges.request_reset(reset_params("chan-1", &format!("m{}", i), i));
            assert!(matches!(disposition, ResetDisposition::Deferred { .. }));
        }
        assert_eq!(badges.counters().channel_count("chan-1"), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(badges.poll_reset("clan-1:chan-1"), ResetPoll::Applied(true));
        assert_eq!(badges.counters().channel_count("chan-1"), 0);
        assert_eq!(
            badges.counters().channel("chan-1").unwrap().last_seen_message_id.as_deref(),
            Some("m5")
        );
        assert_eq!(badges.poll_reset("clan-1:chan-1"), ResetPoll::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_applies_pending_resets() {
        let mut badges = reconciler();
        badges.request_reset(reset_params("chan-1", "m1", 1));
        badges.request_reset(reset_params("chan-1", "m2", 2));
        badges.request_reset(reset_params("chan-2", "m1", 1));
        badges.request_reset(reset_params("chan-2", "m3", 3));
        assert_eq!(badges.flush_resets(), 2);
        assert_eq!(badges.flush_resets(), 0);
    }

    // =========================================================================
    // Decrease / increase
    // =========================================================================

    fn seeded() -> BadgeReconciler {
        let mut badges = reconciler();
        badges.apply_reset(&reset_params("chan-1", "m0", 0));
        badges.counters_mut().set_clan_count("clan-1", 2);
        badges.counters_mut().set_channel_count("clan-1", "chan-1", 2);
        badges
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_mention_decrements_every_scope_once() {
        let mut badges = seeded();
        let removed = event(
            MessageEventCode::Removed,
            "m1",
            10,
            vec![Mention::User("me".into())],
        );
        assert!(badges.decrease_channel_badge_count(&removed, &viewer()));
        assert!(!badges.decrease_channel_badge_count(&removed, &viewer()));

        let counters = badges.counters();
        assert_eq!(counters.channel_count("chan-1"), 1);
        assert_eq!(counters.clan_count("clan-1"), 1);
        assert_eq!(counters.list_render_count("chan-1"), 1);
        assert_eq!(counters.membership_count("chan-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_role_here_and_reply_count_as_concerning() {
        let mut badges = seeded();
        let by_role = event(MessageEventCode::Removed, "m1", 10, vec![Mention::Role("mods".into())]);
        let by_here = event(MessageEventCode::Removed, "m2", 11, vec![Mention::Here]);
        assert!(badges.decrease_channel_badge_count(&by_role, &viewer()));
        assert!(badges.decrease_channel_badge_count(&by_here, &viewer()));
        assert_eq!(badges.counters().channel_count("chan-1"), 0);

        let mut badges = seeded();
        let mut reply = event(MessageEventCode::Removed, "m3", 12, Vec::new());
        reply.reply_to_sender_id = Some("me".into());
        assert!(badges.decrease_channel_badge_count(&reply, &viewer()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decrease_ignores_irrelevant_events() {
        let mut badges = seeded();
        let me = vec![Mention::User("me".into())];

        let seen = event(MessageEventCode::Removed, "m1", 0, me.clone());
        assert!(!badges.decrease_channel_badge_count(&seen, &viewer()));

        let mut own = event(MessageEventCode::Removed, "m2", 10, me.clone());
        own.sender_id = "me".into();
        assert!(!badges.decrease_channel_badge_count(&own, &viewer()));

        let updated = event(MessageEventCode::Updated, "m3", 10, me.clone());
        assert!(!badges.decrease_channel_badge_count(&updated, &viewer()));

        let other = event(MessageEventCode::Removed, "m4", 10, vec![Mention::User("you".into())]);
        assert!(!badges.decrease_channel_badge_count(&other, &viewer()));

        assert_eq!(badges.counters().channel_count("chan-1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decrease_never_goes_below_zero() {
        let mut badges = reconciler();
        badges.apply_reset(&reset_params("chan-1", "m0", 0));
        let removed = event(MessageEventCode::Removed, "m1", 10, vec![Mention::Here]);
        assert!(!badges.decrease_channel_badge_count(&removed, &viewer()));
        assert_eq!(badges.counters().channel_count("chan-1"), 0);
        assert_eq!(badges.counters().clan_count("clan-1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increase_then_decrease_round_trip() {
        let mut badges = reconciler();
        let created = event(MessageEventCode::Created, "m1", 10, vec![Mention::Here]);
        assert!(badges.increase_channel_badge_count(&created, &viewer()));
        assert!(!badges.increase_channel_badge_count(&created, &viewer()));
        assert_eq!(badges.counters().clan_count("clan-1"), 1);
        assert_eq!(badges.counters().membership_count("chan-1"), 1);

        let removed = MessageEvent {
            code: MessageEventCode::Removed,
            ..created
        };
        assert!(badges.decrease_channel_badge_count(&removed, &viewer()));
        assert_eq!(badges.counters().channel_count("chan-1"), 0);
        assert_eq!(badges.counters().clan_count("clan-1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_messages_count_without_mentions() {
        let mut badges = reconciler();
        let mut dm = event(MessageEventCode::Created, "m1", 10, Vec::new());
        dm.clan_id = DM_CLAN_ID.to_string();
        dm.channel_id = "dm-1".to_string();
        assert!(badges.increase_channel_badge_count(&dm, &viewer()));
        assert_eq!(badges.counters().direct_message_count("dm-1"), 1);
        assert_eq!(badges.counters().clan_count(DM_CLAN_ID), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_everything() {
        let mut badges = seeded();
        badges.reset();
        assert_eq!(badges.counters().channel_count("chan-1"), 0);
        assert!(badges.apply_reset(&reset_params("chan-1", "m0", 0)));
    }

    #[test]
    fn test_mention_serde_shape() {
        let json = serde_json::to_value(Mention::Role("mods".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "role", "id": "mods"}));
        let here: Mention = serde_json::from_value(serde_json::json!({"kind": "here"})).unwrap();
        assert_eq!(here, Mention::Here);
    }
}
