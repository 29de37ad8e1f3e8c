//! Read-through response cache.
//!
//! Applies only to side-effect-free reads. The key is a content digest over
//! method, path, query, body, and caller identity, so two principals never
//! share a cached response for the same query shape. Invalidation is coarse
//! on purpose: a successful mutation sweeps the whole resource family, which
//! trades precision for the guarantee that no family serves stale data past
//! its own mutation.
//!
//! Cache failures are observability failures, not request failures: a broken
//! lookup degrades to a miss, a broken store is logged and dropped.

use std::sync::Arc;

use crate::{
    clock::Clock,
    principal::Principal,
    repositories::{CacheEntry, ResponseCacheStore},
};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lifetime of stored entries.
    pub ttl: chrono::Duration,
    /// Administrators read through to live data so they never see a stale
    /// elevated-privilege view.
    pub bypass_admins: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: chrono::Duration::seconds(60),
            bypass_admins: true,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Identity of one cacheable response.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub digest: String,
    pub family: String,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
}

pub struct ResponseCache<S: ResponseCacheStore> {
    store: Arc<S>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl<S: ResponseCacheStore> ResponseCache<S> {
    pub fn new(store: Arc<S>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether this request should skip the cache entirely.
    pub fn bypasses(&self, method: &str, principal: Option<&Principal>) -> bool {
        if !self.config.enabled {
            return true;
        }
        if !matches!(method, "GET" | "HEAD") {
            return true;
        }
        self.config.bypass_admins && principal.is_some_and(|p| p.is_admin())
    }

    /// Derive the cache key for a request shape.
    pub fn key_for(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: &[u8],
        principal: Option<&Principal>,
    ) -> CacheKey {
        let caller = principal.map(|p| p.id.as_str()).unwrap_or("anon");

        let mut hasher = blake3::Hasher::new();
        hasher.update(method.as_bytes());
        hasher.update(b"\n");
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
        hasher.update(query.unwrap_or("").as_bytes());
        hasher.update(b"\n");
        hasher.update(body);
        hasher.update(b"\n");
        hasher.update(caller.as_bytes());

        CacheKey {
            digest: hasher.finalize().to_hex().to_string(),
            family: Self::family_of(path),
        }
    }

    /// Resource family of a path: its first segment (`/courses/42` →
    /// `courses`).
    pub fn family_of(path: &str) -> String {
        path.trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or("")
            .to_string()
    }

    /// Look up a stored response. Store failures degrade to a miss.
    pub async fn lookup(&self, key: &CacheKey) -> CacheLookup {
        match self.store.get(&key.digest, self.clock.now()).await {
            Ok(Some(entry)) => CacheLookup::Hit(entry),
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed, treating as miss");
                CacheLookup::Miss
            }
        }
    }

    /// Store a successful response under `key`. Failures are logged and
    /// dropped.
    pub async fn store(
        &self,
        key: &CacheKey,
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    ) {
        let now = self.clock.now();
        let entry = CacheEntry {
            key: key.digest.clone(),
            family: key.family.clone(),
            status,
            content_type,
            body,
            stored_at: now,
            ttl_secs: self.config.ttl.num_seconds(),
        };

        if let Err(e) = self.store.put(entry).await {
            tracing::warn!(error = %e, "Failed to store cache entry");
        }
    }

    /// Sweep the family a mutated path belongs to. Called after any
    /// successful mutating request.
    pub async fn invalidate_path(&self, path: &str) -> u64 {
        let family = Self::family_of(path);
        match self.store.invalidate_family(&family).await {
            Ok(count) => {
                if count > 0 {
                    tracing::debug!(family = %family, count, "Invalidated cached responses");
                }
                count
            }
            Err(e) => {
                tracing::warn!(family = %family, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    pub async fn clear(&self) -> u64 {
        match self.store.clear().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Cache clear failed");
                0
            }
        }
    }

    /// Snapshot for the admin inspection endpoint.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.store.entries().await.unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.store.len().await.unwrap_or(0)
    }

    /// Remaining TTL of an entry, for the `X-Cache-TTL` header.
    pub fn remaining_ttl(&self, entry: &CacheEntry) -> i64 {
        entry.remaining_ttl_secs(self.clock.now())
    }
}
