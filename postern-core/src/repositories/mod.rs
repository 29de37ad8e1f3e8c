//! Repository traits for the data access layer
//!
//! Services never touch a concrete store; they talk to these traits. The
//! in-memory implementations in [`crate::storage`] back a single-instance
//! deployment and every test; a multi-instance deployment swaps in a shared
//! store without touching call sites.

pub mod audit;
pub mod cache;
pub mod lockout;
pub mod principal;
pub mod rate;

pub use audit::AuditRepository;
pub use cache::{CacheEntry, ResponseCacheStore};
pub use lockout::{AttemptOutcome, LockoutRepository};
pub use principal::PrincipalRepository;
pub use rate::{RateDecision, RateWindowStore};

use std::sync::Arc;

use async_trait::async_trait;

use crate::Error;

/// Provider trait that storage implementations implement to hand out all
/// repositories.
///
/// Accessors return `Arc`s so services can hold their repository without
/// borrowing the provider.
#[async_trait]
pub trait RepositoryProvider: Send + Sync + 'static {
    type PrincipalRepo: PrincipalRepository;
    type LockoutRepo: LockoutRepository;
    type RateStore: RateWindowStore;
    type CacheStore: ResponseCacheStore;
    type AuditRepo: AuditRepository;

    fn principals(&self) -> Arc<Self::PrincipalRepo>;
    fn lockouts(&self) -> Arc<Self::LockoutRepo>;
    fn rate_windows(&self) -> Arc<Self::RateStore>;
    fn response_cache(&self) -> Arc<Self::CacheStore>;
    fn audit(&self) -> Arc<Self::AuditRepo>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
