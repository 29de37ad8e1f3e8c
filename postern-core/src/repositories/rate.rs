//! Store trait for sliding-window rate limiting.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::Error;

/// Outcome of one rate-limit check, also the source of the
/// `X-RateLimit-*` response headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// When the oldest counted request falls out of the window.
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateWindowStore: Send + Sync + 'static {
    /// Register a hit for `key`: prune timestamps older than `now - window`,
    /// compare the remaining count against `limit`, and append `now` when
    /// allowed. The whole operation is atomic per key.
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, Error>;

    /// Drop the window for a client (admin reset).
    async fn reset(&self, key: &str) -> Result<bool, Error>;

    /// Number of clients currently tracked.
    async fn len(&self) -> Result<usize, Error>;
}
