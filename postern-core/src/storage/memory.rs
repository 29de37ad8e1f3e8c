//! In-memory, map-backed stores.
//!
//! Keyed tables use [`dashmap::DashMap`]; every lockout and rate-window
//! transition runs inside a single entry guard, which makes the
//! read-modify-write atomic per key. The audit log is an append-only vector
//! behind an async `RwLock`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::{
    Error,
    audit::{AuditFilter, AuditRecord},
    error::StorageError,
    principal::{Principal, PrincipalId, SecurityState},
    repositories::{
        AttemptOutcome, AuditRepository, CacheEntry, LockoutRepository, PrincipalRepository,
        RateDecision, RateWindowStore, RepositoryProvider, ResponseCacheStore,
    },
};

#[derive(Default)]
pub struct MemoryPrincipalRepository {
    principals: DashMap<PrincipalId, Principal>,
    by_email: DashMap<String, PrincipalId>,
    password_hashes: DashMap<PrincipalId, String>,
}

impl MemoryPrincipalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrincipalRepository for MemoryPrincipalRepository {
    async fn create(&self, principal: Principal) -> Result<Principal, Error> {
        if self.by_email.contains_key(&principal.email) {
            return Err(StorageError::Constraint(format!(
                "email already registered: {}",
                principal.email
            ))
            .into());
        }

        self.by_email
            .insert(principal.email.clone(), principal.id.clone());
        self.principals
            .insert(principal.id.clone(), principal.clone());
        Ok(principal)
    }

    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<Principal>, Error> {
        Ok(self.principals.get(id).map(|p| p.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, Error> {
        let Some(id) = self.by_email.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        Ok(self.principals.get(&id).map(|p| p.clone()))
    }

    async fn update(&self, principal: &Principal) -> Result<Principal, Error> {
        let mut entry = self
            .principals
            .get_mut(&principal.id)
            .ok_or(StorageError::NotFound)?;
        let mut updated = principal.clone();
        updated.updated_at = Utc::now();
        *entry = updated.clone();
        Ok(updated)
    }

    async fn set_password_hash(&self, id: &PrincipalId, hash: &str) -> Result<(), Error> {
        self.password_hashes.insert(id.clone(), hash.to_string());
        Ok(())
    }

    async fn get_password_hash(&self, id: &PrincipalId) -> Result<Option<String>, Error> {
        Ok(self.password_hashes.get(id).map(|h| h.clone()))
    }

    async fn set_password_changed_at(
        &self,
        id: &PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut entry = self.principals.get_mut(id).ok_or(StorageError::NotFound)?;
        entry.password_changed_at = Some(at);
        entry.updated_at = at;
        Ok(())
    }

    async fn touch_last_activity(
        &self,
        id: &PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        if let Some(mut entry) = self.principals.get_mut(id) {
            entry.last_activity_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLockoutRepository {
    states: DashMap<String, SecurityState>,
}

impl MemoryLockoutRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockoutRepository for MemoryLockoutRepository {
    async fn begin_attempt(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, Error> {
        let mut state = self.states.entry(key.to_string()).or_default();

        match state.locked_until {
            Some(until) if now < until => Ok(AttemptOutcome::Locked {
                locked_until: until,
            }),
            Some(_) => {
                // Lock has expired: the cooldown self-heals and this attempt
                // counts as failure number one.
                state.failed_attempts = 1;
                state.locked_until = None;
                Ok(AttemptOutcome::ProceedCounted)
            }
            None => Ok(AttemptOutcome::Proceed),
        }
    }

    async fn record_failure(
        &self,
        key: &str,
        threshold: u32,
        lock_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<SecurityState, Error> {
        let mut state = self.states.entry(key.to_string()).or_default();

        state.failed_attempts += 1;
        if state.failed_attempts >= threshold {
            state.locked_until = Some(now + lock_duration);
        }
        Ok(state.clone())
    }

    async fn record_success(&self, key: &str) -> Result<(), Error> {
        self.states.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<SecurityState, Error> {
        Ok(self
            .states
            .get(key)
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryRateWindowStore {
    windows: DashMap<String, Vec<DateTime<Utc>>>,
}

impl MemoryRateWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateWindowStore for MemoryRateWindowStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, Error> {
        let mut timestamps = self.windows.entry(key.to_string()).or_default();

        let cutoff = now - window;
        timestamps.retain(|t| *t > cutoff);

        let count = timestamps.len() as u32;
        if count >= limit {
            // The window slides: quota frees up when the oldest counted
            // request ages out.
            let reset_at = timestamps
                .first()
                .map(|oldest| *oldest + window)
                .unwrap_or(now + window);
            return Ok(RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
            });
        }

        timestamps.push(now);
        let reset_at = timestamps
            .first()
            .map(|oldest| *oldest + window)
            .unwrap_or(now + window);

        Ok(RateDecision {
            allowed: true,
            limit,
            remaining: limit - count - 1,
            reset_at,
        })
    }

    async fn reset(&self, key: &str) -> Result<bool, Error> {
        Ok(self.windows.remove(key).is_some())
    }

    async fn len(&self) -> Result<usize, Error> {
        Ok(self.windows.len())
    }
}

#[derive(Default)]
pub struct MemoryResponseCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryResponseCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseCacheStore for MemoryResponseCacheStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, Error> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return Ok(Some(entry.clone())),
            None => return Ok(None),
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, entry: CacheEntry) -> Result<(), Error> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn invalidate_family(&self, family: &str) -> Result<u64, Error> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.family != family);
        Ok((before - self.entries.len()) as u64)
    }

    async fn clear(&self) -> Result<u64, Error> {
        let count = self.entries.len() as u64;
        self.entries.clear();
        Ok(count)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>, Error> {
        Ok(self.entries.iter().map(|e| e.clone()).collect())
    }

    async fn len(&self) -> Result<usize, Error> {
        Ok(self.entries.len())
    }
}

#[derive(Default)]
pub struct MemoryAuditRepository {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for MemoryAuditRepository {
    async fn append(&self, record: AuditRecord) -> Result<(), Error> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn query(
        &self,
        filter: &AuditFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<AuditRecord>, u64), Error> {
        let records = self.records.read().await;

        let mut matching: Vec<AuditRecord> = records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));

        let total = matching.len() as u64;
        let page = page.max(1);
        let start = (page - 1).saturating_mul(limit);
        let page_records = matching.into_iter().skip(start).take(limit).collect();

        Ok((page_records, total))
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.recorded_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}

/// Map-backed [`RepositoryProvider`].
///
/// Each test gets its own isolated instance; a production single-instance
/// deployment shares one behind an `Arc`.
#[derive(Default)]
pub struct MemoryRepositoryProvider {
    principals: Arc<MemoryPrincipalRepository>,
    lockouts: Arc<MemoryLockoutRepository>,
    rate_windows: Arc<MemoryRateWindowStore>,
    response_cache: Arc<MemoryResponseCacheStore>,
    audit: Arc<MemoryAuditRepository>,
}

impl MemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepositoryProvider for MemoryRepositoryProvider {
    type PrincipalRepo = MemoryPrincipalRepository;
    type LockoutRepo = MemoryLockoutRepository;
    type RateStore = MemoryRateWindowStore;
    type CacheStore = MemoryResponseCacheStore;
    type AuditRepo = MemoryAuditRepository;

    fn principals(&self) -> Arc<Self::PrincipalRepo> {
        self.principals.clone()
    }

    fn lockouts(&self) -> Arc<Self::LockoutRepo> {
        self.lockouts.clone()
    }

    fn rate_windows(&self) -> Arc<Self::RateStore> {
        self.rate_windows.clone()
    }

    fn response_cache(&self) -> Arc<Self::CacheStore> {
        self.response_cache.clone()
    }

    fn audit(&self) -> Arc<Self::AuditRepo> {
        self.audit.clone()
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditOutcome;
    use crate::principal::Role;

    #[tokio::test]
    async fn test_principal_email_uniqueness() {
        let repo = MemoryPrincipalRepository::new();
        let principal = Principal::builder()
            .email("casey@example.com")
            .role(Role::Member)
            .build()
            .unwrap();

        repo.create(principal.clone()).await.unwrap();

        let duplicate = Principal::builder()
            .email("casey@example.com")
            .build()
            .unwrap();
        let result = repo.create(duplicate).await;
        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::Constraint(_)))
        ));
    }

    #[tokio::test]
    async fn test_lockout_begin_attempt_resets_expired_lock() {
        let repo = MemoryLockoutRepository::new();
        let now = Utc::now();

        let state = repo
            .record_failure("a@example.com", 1, Duration::minutes(15), now)
            .await
            .unwrap();
        assert!(state.locked_until.is_some());

        // Still inside the cooldown
        let outcome = repo
            .begin_attempt("a@example.com", now + Duration::minutes(5))
            .await
            .unwrap();
        assert!(matches!(outcome, AttemptOutcome::Locked { .. }));

        // Past the cooldown: reset to one counted failure
        let outcome = repo
            .begin_attempt("a@example.com", now + Duration::minutes(16))
            .await
            .unwrap();
        assert_eq!(outcome, AttemptOutcome::ProceedCounted);

        let state = repo.get("a@example.com").await.unwrap();
        assert_eq!(state.failed_attempts, 1);
        assert!(state.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_failures_all_count() {
        let repo = Arc::new(MemoryLockoutRepository::new());
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.record_failure("a@example.com", 5, Duration::minutes(15), now)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = repo.get("a@example.com").await.unwrap();
        assert_eq!(state.failed_attempts, 10);
        assert!(state.locked_until.is_some());
    }

    #[tokio::test]
    async fn test_rate_window_slides() {
        let store = MemoryRateWindowStore::new();
        let now = Utc::now();
        let window = Duration::minutes(1);

        for i in 0..3 {
            let decision = store.hit("10.0.0.1", window, 3, now).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 2 - i);
        }

        let decision = store.hit("10.0.0.1", window, 3, now).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reset_at <= now + window);

        // A window later the counter has effectively reset
        let later = now + Duration::minutes(1) + Duration::seconds(1);
        let decision = store.hit("10.0.0.1", window, 3, later).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_cache_expiry_reports_miss() {
        let store = MemoryResponseCacheStore::new();
        let now = Utc::now();

        store
            .put(CacheEntry {
                key: "k1".to_string(),
                family: "courses".to_string(),
                status: 200,
                content_type: None,
                body: b"{}".to_vec(),
                stored_at: now,
                ttl_secs: 60,
            })
            .await
            .unwrap();

        assert!(store.get("k1", now).await.unwrap().is_some());
        assert!(
            store
                .get("k1", now + Duration::seconds(61))
                .await
                .unwrap()
                .is_none()
        );
        // The expired entry was dropped, not retained
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_family_invalidation() {
        let store = MemoryResponseCacheStore::new();
        let now = Utc::now();

        for (key, family) in [("k1", "courses"), ("k2", "courses"), ("k3", "events")] {
            store
                .put(CacheEntry {
                    key: key.to_string(),
                    family: family.to_string(),
                    status: 200,
                    content_type: None,
                    body: Vec::new(),
                    stored_at: now,
                    ttl_secs: 60,
                })
                .await
                .unwrap();
        }

        let removed = store.invalidate_family("courses").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("k3", now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_audit_query_pagination() {
        let repo = MemoryAuditRepository::new();
        for i in 0..5 {
            let record = AuditRecord::builder()
                .action("course.update")
                .resource_type("course")
                .resource_id(Some(format!("crs_{i}")))
                .outcome(AuditOutcome::Success)
                .recorded_at(Utc::now() + Duration::seconds(i))
                .build()
                .unwrap();
            repo.append(record).await.unwrap();
        }

        let (page1, total) = repo.query(&AuditFilter::default(), 1, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page1.len(), 2);
        // Newest first
        assert_eq!(page1[0].resource_id.as_deref(), Some("crs_4"));

        let (page3, _) = repo.query(&AuditFilter::default(), 3, 2).await.unwrap();
        assert_eq!(page3.len(), 1);
    }

    #[tokio::test]
    async fn test_audit_purge_before() {
        let repo = MemoryAuditRepository::new();
        let now = Utc::now();

        for days_ago in [100, 50, 1] {
            let record = AuditRecord::builder()
                .action("course.update")
                .resource_type("course")
                .recorded_at(now - Duration::days(days_ago))
                .build()
                .unwrap();
            repo.append(record).await.unwrap();
        }

        let purged = repo.purge_before(now - Duration::days(90)).await.unwrap();
        assert_eq!(purged, 1);

        let (_, total) = repo.query(&AuditFilter::default(), 1, 10).await.unwrap();
        assert_eq!(total, 2);
    }
}
