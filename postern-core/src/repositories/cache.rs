//! Store trait for the response cache.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::Error;

/// One cached response. Created on a miss after a successful read; destroyed
/// by TTL expiry or by invalidation after a mutation of its family.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// Content digest of method, path, query, body, and caller identity.
    pub key: String,

    /// Resource family the response belongs to, used for coarse
    /// invalidation. Derived from the first path segment.
    pub family: String,

    pub status: u16,

    pub content_type: Option<String>,

    #[serde(skip)]
    pub body: Vec<u8>,

    pub stored_at: DateTime<Utc>,

    /// Lifetime in seconds from `stored_at`.
    pub ttl_secs: i64,
}

impl CacheEntry {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.stored_at + Duration::seconds(self.ttl_secs)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Seconds of life left, clamped at zero.
    pub fn remaining_ttl_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at() - now).num_seconds().max(0)
    }
}

#[async_trait]
pub trait ResponseCacheStore: Send + Sync + 'static {
    /// Fetch a live entry. Expired entries are removed and reported as a
    /// miss.
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, Error>;

    async fn put(&self, entry: CacheEntry) -> Result<(), Error>;

    /// Remove every entry belonging to `family`. Returns the count removed.
    async fn invalidate_family(&self, family: &str) -> Result<u64, Error>;

    /// Remove everything. Returns the count removed.
    async fn clear(&self) -> Result<u64, Error>;

    /// Snapshot of current entries (bodies excluded from serialization) for
    /// the admin inspection endpoint.
    async fn entries(&self) -> Result<Vec<CacheEntry>, Error>;

    async fn len(&self) -> Result<usize, Error>;
}
