//! clansync - client-side data synchronization for a real-time chat app
//!
//! Keeps locally held server data fresh without redundant network traffic:
//! a staleness-aware resource cache with first-call tracking, retry with
//! backoff and connectivity awareness, streaming-first fetching with REST
//! fallback, paginated feed merging and unread badge reconciliation. All of it
//! hangs off a session-scoped [`SyncContext`].

pub mod badge;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod retry;

pub use cache::{ApiCallTracker, ApiKey, Cached, ResourceCache};
pub use config::{ConfigError, SyncConfig};
pub use context::SyncContext;
pub use error::{Result, SyncError};
pub use retry::{with_retry, RetryConfig, RetryEngine};
