//! Builder for [`Postern`](crate::Postern).

use std::sync::Arc;

use postern_core::{
    Clock, MaintenanceFlag, SystemClock, TokenConfig,
    repositories::RepositoryProvider,
    services::{
        AuditConfig, AuditTrail, AuthenticatorConfig, CacheConfig, LockoutConfig, LockoutGuard,
        PasswordService, RateLimitConfig, RateLimiter, ResponseCache, TokenAuthenticator,
    },
};

use crate::Postern;

/// Configures the pipeline services before wiring them over a repository
/// provider.
///
/// Every setting has a default; `token_config` defaults to a process-local
/// random HS256 secret, which is fine for development but means tokens do
/// not survive a restart; production deployments should supply their own.
pub struct PosternBuilder<R: RepositoryProvider> {
    repositories: Arc<R>,
    token_config: Option<TokenConfig>,
    lockout_config: LockoutConfig,
    rate_limit_config: RateLimitConfig,
    cache_config: CacheConfig,
    audit_config: AuditConfig,
    authenticator_config: AuthenticatorConfig,
    maintenance: Option<MaintenanceFlag>,
    clock: Option<Arc<dyn Clock>>,
}

impl<R: RepositoryProvider> PosternBuilder<R> {
    pub fn new(repositories: Arc<R>) -> Self {
        Self {
            repositories,
            token_config: None,
            lockout_config: LockoutConfig::default(),
            rate_limit_config: RateLimitConfig::default(),
            cache_config: CacheConfig::default(),
            audit_config: AuditConfig::default(),
            authenticator_config: AuthenticatorConfig::default(),
            maintenance: None,
            clock: None,
        }
    }

    pub fn token_config(mut self, config: TokenConfig) -> Self {
        self.token_config = Some(config);
        self
    }

    pub fn lockout_config(mut self, config: LockoutConfig) -> Self {
        self.lockout_config = config;
        self
    }

    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit_config = config;
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn audit_config(mut self, config: AuditConfig) -> Self {
        self.audit_config = config;
        self
    }

    pub fn authenticator_config(mut self, config: AuthenticatorConfig) -> Self {
        self.authenticator_config = config;
        self
    }

    pub fn maintenance(mut self, flag: MaintenanceFlag) -> Self {
        self.maintenance = Some(flag);
        self
    }

    /// Override the time source. Tests pass a
    /// [`ManualClock`](postern_core::ManualClock) here.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Postern<R> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let token_config = self.token_config.unwrap_or_else(|| {
            tracing::warn!(
                "No token config supplied; using a process-local random secret. \
                 Tokens will not survive a restart."
            );
            TokenConfig::new_hs256(random_secret())
        });

        let authenticator = TokenAuthenticator::new(
            self.repositories.principals(),
            token_config.clone(),
            self.authenticator_config,
            clock.clone(),
        );
        let password = PasswordService::new(self.repositories.principals(), clock.clone());
        let lockout = LockoutGuard::new(
            self.repositories.lockouts(),
            self.lockout_config,
            clock.clone(),
        );
        let rate_limiter = RateLimiter::new(
            self.repositories.rate_windows(),
            self.rate_limit_config,
            clock.clone(),
        );
        let cache = ResponseCache::new(
            self.repositories.response_cache(),
            self.cache_config,
            clock.clone(),
        );
        let audit = AuditTrail::new(self.repositories.audit(), self.audit_config, clock.clone());

        Postern::from_parts(
            self.repositories,
            authenticator,
            password,
            lockout,
            rate_limiter,
            cache,
            audit,
            self.maintenance.unwrap_or_default(),
            token_config,
            clock,
        )
    }
}

fn random_secret() -> Vec<u8> {
    use rand::{TryRngCore, rngs::OsRng};

    let mut secret = vec![0u8; 32];
    OsRng.try_fill_bytes(&mut secret).unwrap();
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use postern_core::storage::MemoryRepositoryProvider;

    #[tokio::test]
    async fn test_builder_defaults() {
        let postern = Postern::builder(Arc::new(MemoryRepositoryProvider::new())).build();
        assert!(postern.lockout().config().enabled);
        assert_eq!(postern.rate_limiter().config().max_requests, 120);
        assert!(!postern.maintenance().is_enabled());
    }

    #[tokio::test]
    async fn test_builder_overrides() {
        let postern = Postern::builder(Arc::new(MemoryRepositoryProvider::new()))
            .lockout_config(LockoutConfig::disabled())
            .rate_limit_config(RateLimitConfig {
                enabled: true,
                max_requests: 5,
                window: chrono::Duration::seconds(10),
            })
            .build();

        assert!(!postern.lockout().config().enabled);
        assert_eq!(postern.rate_limiter().config().max_requests, 5);
    }
}
