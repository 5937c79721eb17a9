//! Paginated feed merging.
//!
//! Pages arrive as `Initial`, `Before` (older) or `After` (newer) relative to
//! what is already loaded. Merging de-duplicates by item id, keeps the list
//! ordered newest first and maintains per-direction "more available" flags.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_FEED_PAGE_LIMIT;

/// An item that can live in a paginated feed.
pub trait FeedItem: Clone {
    /// Stable identity used for de-duplication.
    fn item_id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

/// A file attached to a message. Identified by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub filetype: String,
    pub size: u64,
    pub uploader: String,
    pub message_id: String,
    pub create_time: DateTime<Utc>,
}

impl FeedItem for Attachment {
    fn item_id(&self) -> &str {
        &self.url
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.create_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Initial,
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    pub is_loading: bool,
    pub has_more_before: bool,
    pub has_more_after: bool,
    pub limit: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            is_loading: false,
            has_more_before: true,
            has_more_after: true,
            limit: DEFAULT_FEED_PAGE_LIMIT,
        }
    }
}

/// One fetched page to merge into the feed stored under `resource_key`.
#[derive(Debug, Clone)]
pub struct MergeRequest<T> {
    pub resource_key: String,
    pub items: Vec<T>,
    pub direction: Direction,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome<T> {
    pub items: Vec<T>,
    pub pagination: PaginationState,
    /// Items from the page that were not already present
    pub added: usize,
}

struct FeedState<T> {
    items: Vec<T>,
    ids: HashSet<String>,
    // Ids removed locally; filtered from later pages so a stale page cannot resurrect them
    removed: HashSet<String>,
    pagination: PaginationState,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            ids: HashSet::new(),
            removed: HashSet::new(),
            pagination: PaginationState::default(),
        }
    }
}

/// Per-resource store of merged feeds.
pub struct FeedMerger<T> {
    feeds: HashMap<String, FeedState<T>>,
}

impl<T> Default for FeedMerger<T> {
    fn default() -> Self {
        Self {
            feeds: HashMap::new(),
        }
    }
}

impl<T: FeedItem> FeedMerger<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fetched page and return the updated list and flags.
    pub fn merge(&mut self, request: MergeRequest<T>) -> MergeOutcome<T> {
        let MergeRequest {
            resource_key,
            items,
            direction,
            limit,
        } = request;
        let fetched = items.len();
        let page_full = fetched > 0 && fetched >= limit;

        let state = self.feeds.entry(resource_key).or_default();
        if direction == Direction::Initial {
            state.items.clear();
            state.ids.clear();
        }

        let mut fresh = Vec::with_capacity(fetched);
        for item in items {
            if state.removed.contains(item.item_id()) {
                continue;
            }
            // insert() also rejects duplicates within the page itself
            if state.ids.insert(item.item_id().to_string()) {
                fresh.push(item);
            }
        }
        let added = fresh.len();

        match direction {
            Direction::Initial => {
                state.items = fresh;
                state.pagination.has_more_before = page_full;
                state.pagination.has_more_after = page_full;
            }
            Direction::Before => {
                state.items.extend(fresh);
                state.pagination.has_more_before = page_full;
            }
            Direction::After => {
                fresh.append(&mut state.items);
                state.items = fresh;
                state.pagination.has_more_after = page_full;
            }
        }

        // Stable sort: equal timestamps keep their merged order
        state
            .items
            .sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        state.pagination.limit = limit;
        state.pagination.is_loading = false;

        tracing::debug!(
            ?direction,
            fetched,
            added,
            total = state.items.len(),
            "Merged feed page"
        );

        MergeOutcome {
            items: state.items.clone(),
            pagination: state.pagination,
            added,
        }
    }

    /// Whether a fetch in `direction` should be issued now.
    pub fn should_fetch(&self, resource_key: &str, direction: Direction) -> bool {
        let Some(state) = self.feeds.get(resource_key) else {
            return true;
        };
        if state.pagination.is_loading {
            return false;
        }
        match direction {
            Direction::Initial => true,
            Direction::Before => state.pagination.has_more_before,
            Direction::After => state.pagination.has_more_after,
        }
    }

    pub fn set_loading(&mut self, resource_key: &str, loading: bool) {
        self.feeds
            .entry(resource_key.to_string())
            .or_default()
            .pagination
            .is_loading = loading;
    }

    /// Remove an item locally (e.g. its message was deleted). Returns true if it
    /// was present.
    pub fn remove_item(&mut self, resource_key: &str, item_id: &str) -> bool {
        let state = self.feeds.entry(resource_key.to_string()).or_default();
        state.removed.insert(item_id.to_string());
        if !state.ids.remove(item_id) {
            return false;
        }
        state.items.retain(|item| item.item_id() != item_id);
        true
    }

    pub fn items(&self, resource_key: &str) -> &[T] {
        self.feeds
            .get(resource_key)
            .map(|state| state.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn pagination(&self, resource_key: &str) -> PaginationState {
        self.feeds
            .get(resource_key)
            .map(|state| state.pagination)
            .unwrap_or_default()
    }

    pub fn clear_resource(&mut self, resource_key: &str) {
        self.feeds.remove(resource_key);
    }

    pub fn reset(&mut self) {
        self.feeds.clear();
    }
}
