//! Repository trait for principals and their password hashes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    principal::{Principal, PrincipalId},
};

#[async_trait]
pub trait PrincipalRepository: Send + Sync + 'static {
    /// Insert a new principal. Fails on a duplicate email.
    async fn create(&self, principal: Principal) -> Result<Principal, Error>;

    async fn find_by_id(&self, id: &PrincipalId) -> Result<Option<Principal>, Error>;

    /// Lookup by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, Error>;

    async fn update(&self, principal: &Principal) -> Result<Principal, Error>;

    async fn set_password_hash(&self, id: &PrincipalId, hash: &str) -> Result<(), Error>;

    async fn get_password_hash(&self, id: &PrincipalId) -> Result<Option<String>, Error>;

    /// Stamp `password_changed_at`, revoking every credential minted before
    /// that instant.
    async fn set_password_changed_at(
        &self,
        id: &PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Best-effort activity stamp; callers fire and forget this.
    async fn touch_last_activity(&self, id: &PrincipalId, at: DateTime<Utc>)
    -> Result<(), Error>;
}
