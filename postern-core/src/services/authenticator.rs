//! Bearer-token authentication.
//!
//! Resolves a request's bearer credential to a [`Principal`] or fails with a
//! precise [`AuthenticationError`]. A token that was valid when minted can
//! still be rejected here: validity is a function of the token *and* the
//! principal's current state (a later password change revokes every earlier
//! token without any token ever being stored).

use std::sync::Arc;

use crate::{
    Error,
    clock::Clock,
    error::{AuthenticationError, AuthorizationError},
    principal::Principal,
    repositories::PrincipalRepository,
    token::{AccessToken, TokenClaims, TokenConfig},
};

#[derive(Debug, Clone)]
pub struct AuthenticatorConfig {
    /// Upper bound on the identity lookup; past it the request fails with
    /// `unavailable` rather than hanging.
    pub lookup_timeout: std::time::Duration,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: std::time::Duration::from_secs(5),
        }
    }
}

pub struct TokenAuthenticator<P: PrincipalRepository> {
    principals: Arc<P>,
    token_config: TokenConfig,
    config: AuthenticatorConfig,
    clock: Arc<dyn Clock>,
}

impl<P: PrincipalRepository> TokenAuthenticator<P> {
    pub fn new(
        principals: Arc<P>,
        token_config: TokenConfig,
        config: AuthenticatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            principals,
            token_config,
            config,
            clock,
        }
    }

    pub fn token_config(&self) -> &TokenConfig {
        &self.token_config
    }

    /// Authenticate a bearer credential.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Principal, Error> {
        let token = bearer.ok_or(AuthenticationError::Missing)?;

        let claims = AccessToken::new(token).verify(&self.token_config)?;

        let principal = self.load_principal(&claims).await?;

        // A password change after the token was minted revokes it, even
        // though the token's own expiry has not passed.
        if let Some(changed_at) = principal.password_changed_at {
            if changed_at > claims.issued_at() {
                tracing::debug!(
                    principal = %principal.id,
                    "Rejecting credential minted before password change"
                );
                return Err(AuthenticationError::StaleCredential.into());
            }
        }

        if !principal.is_active() {
            return Err(
                AuthorizationError::AccountStatus(principal.status.as_str().to_string()).into(),
            );
        }

        self.touch_last_activity(&principal);

        Ok(principal)
    }

    async fn load_principal(&self, claims: &TokenClaims) -> Result<Principal, Error> {
        let principal_id = claims.principal_id();

        let lookup = self.principals.find_by_id(&principal_id);
        let found = tokio::time::timeout(self.config.lookup_timeout, lookup)
            .await
            .map_err(|_| {
                tracing::warn!(principal = %principal_id, "Identity lookup timed out");
                AuthenticationError::Unavailable
            })??;

        found.ok_or_else(|| AuthenticationError::UnknownPrincipal.into())
    }

    /// Stamp `last_activity_at` off the request path. Failures are logged
    /// and never affect the request.
    fn touch_last_activity(&self, principal: &Principal) {
        let principals = self.principals.clone();
        let id = principal.id.clone();
        let now = self.clock.now();

        tokio::spawn(async move {
            if let Err(e) = principals.touch_last_activity(&id, now).await {
                tracing::debug!(principal = %id, error = %e, "Failed to stamp last activity");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::principal::{AccountStatus, PrincipalId, Role};
    use crate::storage::MemoryPrincipalRepository;
    use chrono::{Duration, Utc};

    const TEST_SECRET: &[u8] = b"authenticator_test_secret_key_not_for_production_use";

    fn authenticator(
        principals: Arc<MemoryPrincipalRepository>,
    ) -> TokenAuthenticator<MemoryPrincipalRepository> {
        TokenAuthenticator::new(
            principals,
            TokenConfig::new_hs256(TEST_SECRET.to_vec()),
            AuthenticatorConfig::default(),
            Arc::new(SystemClock),
        )
    }

    async fn seeded_principal(principals: &MemoryPrincipalRepository) -> Principal {
        principals
            .create(
                Principal::builder()
                    .email("casey@example.com")
                    .role(Role::Member)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let auth = authenticator(Arc::new(MemoryPrincipalRepository::new()));

        let result = auth.authenticate(None).await;
        assert!(matches!(
            result,
            Err(Error::Authentication(AuthenticationError::Missing))
        ));
    }

    #[tokio::test]
    async fn test_malformed_token_rejected() {
        let auth = authenticator(Arc::new(MemoryPrincipalRepository::new()));

        let result = auth.authenticate(Some("garbage")).await;
        assert!(matches!(
            result,
            Err(Error::Authentication(AuthenticationError::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_valid_token_resolves_principal() {
        let principals = Arc::new(MemoryPrincipalRepository::new());
        let principal = seeded_principal(&principals).await;
        let auth = authenticator(principals);

        let token = AccessToken::mint(
            &principal.id,
            principal.role,
            Utc::now(),
            auth.token_config(),
        )
        .unwrap();

        let resolved = auth.authenticate(Some(token.as_str())).await.unwrap();
        assert_eq!(resolved.id, principal.id);
    }

    #[tokio::test]
    async fn test_unknown_principal_rejected() {
        let auth = authenticator(Arc::new(MemoryPrincipalRepository::new()));

        let token = AccessToken::mint(
            &PrincipalId::new_random(),
            Role::Member,
            Utc::now(),
            auth.token_config(),
        )
        .unwrap();

        let result = auth.authenticate(Some(token.as_str())).await;
        assert!(matches!(
            result,
            Err(Error::Authentication(AuthenticationError::UnknownPrincipal))
        ));
    }

    #[tokio::test]
    async fn test_password_change_revokes_earlier_tokens() {
        let principals = Arc::new(MemoryPrincipalRepository::new());
        let principal = seeded_principal(&principals).await;
        let auth = authenticator(principals.clone());

        // Minted well before the change so validation leeway cannot blur the
        // comparison.
        let token = AccessToken::mint(
            &principal.id,
            principal.role,
            Utc::now() - Duration::minutes(10),
            auth.token_config(),
        )
        .unwrap();

        principals
            .set_password_changed_at(&principal.id, Utc::now())
            .await
            .unwrap();

        let result = auth.authenticate(Some(token.as_str())).await;
        assert!(matches!(
            result,
            Err(Error::Authentication(AuthenticationError::StaleCredential))
        ));

        // A token minted after the change is accepted again.
        let fresh = AccessToken::mint(
            &principal.id,
            principal.role,
            Utc::now() + Duration::seconds(1),
            auth.token_config(),
        )
        .unwrap();
        assert!(auth.authenticate(Some(fresh.as_str())).await.is_ok());
    }

    #[tokio::test]
    async fn test_inactive_account_rejected_with_status() {
        let principals = Arc::new(MemoryPrincipalRepository::new());
        let mut principal = seeded_principal(&principals).await;
        principal.status = AccountStatus::Suspended;
        principals.update(&principal).await.unwrap();

        let auth = authenticator(principals);
        let token = AccessToken::mint(
            &principal.id,
            principal.role,
            Utc::now(),
            auth.token_config(),
        )
        .unwrap();

        let result = auth.authenticate(Some(token.as_str())).await;
        match result {
            Err(Error::Authorization(AuthorizationError::AccountStatus(status))) => {
                assert_eq!(status, "suspended");
            }
            other => panic!("Expected account-status rejection, got {:?}", other.map(|p| p.id)),
        }
    }
}
