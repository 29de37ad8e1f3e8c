//! Password credentials.
//!
//! Verification answers with one uniform error for "no such account" and
//! "wrong password" so the login path cannot be used to enumerate accounts.
//! Changing a password stamps `password_changed_at`, which revokes every
//! bearer token minted before the change.

use std::sync::Arc;

use crate::{
    Error,
    clock::Clock,
    error::AuthenticationError,
    principal::{Principal, PrincipalId, Role},
    repositories::PrincipalRepository,
    validation::{validate_email, validate_password},
};

pub struct PasswordService<P: PrincipalRepository> {
    principals: Arc<P>,
    clock: Arc<dyn Clock>,
}

impl<P: PrincipalRepository> PasswordService<P> {
    pub fn new(principals: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        Self { principals, clock }
    }

    /// Register a principal with a password.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
        role: Role,
    ) -> Result<Principal, Error> {
        validate_email(email)?;
        validate_password(password)?;

        let principal = Principal::builder()
            .email(email)
            .name(name)
            .role(role)
            .build()?;

        let hash = Self::hash_password(password);
        let principal = self.principals.create(principal).await?;
        self.principals
            .set_password_hash(&principal.id, &hash)
            .await?;

        Ok(principal)
    }

    /// Verify a credential pair against the identity store.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, Error> {
        let normalized = email.trim().to_lowercase();

        let principal = self
            .principals
            .find_by_email(&normalized)
            .await?
            .ok_or(AuthenticationError::InvalidCredentials)?;

        let hash = self
            .principals
            .get_password_hash(&principal.id)
            .await?
            .ok_or(AuthenticationError::InvalidCredentials)?;

        if !Self::verify_password(password, &hash) {
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        Ok(principal)
    }

    /// Change a principal's password and revoke earlier-issued credentials.
    pub async fn change_password(
        &self,
        principal_id: &PrincipalId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        validate_password(new_password)?;

        let current_hash = self
            .principals
            .get_password_hash(principal_id)
            .await?
            .ok_or(AuthenticationError::InvalidCredentials)?;

        if !Self::verify_password(old_password, &current_hash) {
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        let new_hash = Self::hash_password(new_password);
        self.principals
            .set_password_hash(principal_id, &new_hash)
            .await?;

        // Tokens minted before this instant are stale from here on.
        self.principals
            .set_password_changed_at(principal_id, self.clock.now())
            .await?;

        Ok(())
    }

    /// Hash a password using argon2
    fn hash_password(password: &str) -> String {
        use password_auth::generate_hash;
        generate_hash(password)
    }

    /// Verify a password against a hash
    fn verify_password(password: &str, hash: &str) -> bool {
        use password_auth::verify_password;
        verify_password(password, hash).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::ValidationError;
    use crate::storage::MemoryPrincipalRepository;

    fn service() -> (
        PasswordService<MemoryPrincipalRepository>,
        Arc<MemoryPrincipalRepository>,
    ) {
        let principals = Arc::new(MemoryPrincipalRepository::new());
        let service = PasswordService::new(principals.clone(), Arc::new(SystemClock));
        (service, principals)
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password() {
        let (service, _) = service();

        let result = service
            .register("casey@example.com", "weak", None, Role::Member)
            .await;
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::InvalidPassword(_)))
        ));
    }

    #[tokio::test]
    async fn test_register_and_verify() {
        let (service, _) = service();

        let principal = service
            .register("casey@example.com", "validpass123", None, Role::Member)
            .await
            .unwrap();

        let verified = service
            .verify_credentials("casey@example.com", "validpass123")
            .await
            .unwrap();
        assert_eq!(verified.id, principal.id);
    }

    #[tokio::test]
    async fn test_unknown_and_wrong_password_look_identical() {
        let (service, _) = service();

        service
            .register("casey@example.com", "validpass123", None, Role::Member)
            .await
            .unwrap();

        let wrong = service
            .verify_credentials("casey@example.com", "notthepassword")
            .await
            .unwrap_err();
        let unknown = service
            .verify_credentials("ghost@example.com", "whatever123")
            .await
            .unwrap_err();

        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(
            wrong,
            Error::Authentication(AuthenticationError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_verify_normalizes_email() {
        let (service, _) = service();

        service
            .register("casey@example.com", "validpass123", None, Role::Member)
            .await
            .unwrap();

        assert!(
            service
                .verify_credentials("  Casey@Example.COM ", "validpass123")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_change_password_stamps_changed_at() {
        let (service, principals) = service();

        let principal = service
            .register("casey@example.com", "original_pass1", None, Role::Member)
            .await
            .unwrap();
        assert!(principal.password_changed_at.is_none());

        service
            .change_password(&principal.id, "original_pass1", "new_password2")
            .await
            .unwrap();

        let updated = principals
            .find_by_id(&principal.id)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.password_changed_at.is_some());

        // Old password no longer verifies, new one does.
        assert!(
            service
                .verify_credentials("casey@example.com", "original_pass1")
                .await
                .is_err()
        );
        assert!(
            service
                .verify_credentials("casey@example.com", "new_password2")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_change_password_requires_old_password() {
        let (service, _) = service();

        let principal = service
            .register("casey@example.com", "original_pass1", None, Role::Member)
            .await
            .unwrap();

        let result = service
            .change_password(&principal.id, "wrong_old_pass", "new_password2")
            .await;
        assert!(matches!(
            result,
            Err(Error::Authentication(
                AuthenticationError::InvalidCredentials
            ))
        ));
    }
}
