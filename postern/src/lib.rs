//! # Postern
//!
//! Postern is the request-security and observability pipeline for a
//! club-management service. It owns the cross-cutting concerns that sit
//! between the listener and the business handlers:
//!
//! - Bearer-token authentication with server-held security state: a token is
//!   stateless, but a later password change revokes every token minted
//!   before it.
//! - Account lockout: a self-healing cooldown after repeated failed logins,
//!   opaque to account-enumeration probes.
//! - Per-client sliding-window rate limiting.
//! - A read-through response cache with coarse per-family invalidation.
//! - A fire-and-forget audit trail with filtered retrieval, statistics,
//!   export, and retention-based purging.
//!
//! Business CRUD is an external collaborator: it sees only the request
//! context postern attaches after authentication, and it reports state
//! changes through the audit recorder.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use postern::Postern;
//! use postern_core::storage::MemoryRepositoryProvider;
//!
//! #[tokio::main]
//! async fn main() {
//!     let repositories = Arc::new(MemoryRepositoryProvider::new());
//!     let postern = Postern::builder(repositories).build();
//!
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     postern.start_background_tasks(shutdown_rx).await;
//!
//!     // hand `postern` to postern-axum, or drive it directly:
//!     let result = postern.login("casey@example.com", "password", None).await;
//!     let _ = (result, shutdown_tx);
//! }
//! ```

mod builder;

pub use builder::PosternBuilder;

/// Re-export core types commonly used alongside the facade.
pub use postern_core::{
    AccessToken, AccountStatus, AuditFilter, AuditOutcome, AuditRecord, AuditStats, Clock, Error,
    MaintenanceFlag, ManualClock, Principal, PrincipalId, RequestContext, Role, SecurityState,
    SystemClock, TokenClaims, TokenConfig,
    error::{AuthenticationError, AuthorizationError, RateLimitError},
    repositories::{PrincipalRepository, RateDecision, RepositoryProvider},
    services::{
        AuditConfig, AuditRecorder, AuditTrail, AuthenticatorConfig, CacheConfig, LockoutConfig,
        LockoutGuard, PasswordService, RateLimitConfig, RateLimiter, ResponseCache,
        TokenAuthenticator,
    },
    storage::MemoryRepositoryProvider,
};

pub use postern_core::services::audit::ExportFormat;

use std::sync::Arc;

/// The central coordinator wiring the pipeline services over a repository
/// provider.
pub struct Postern<R: RepositoryProvider> {
    repositories: Arc<R>,
    authenticator: Arc<TokenAuthenticator<R::PrincipalRepo>>,
    password: Arc<PasswordService<R::PrincipalRepo>>,
    lockout: Arc<LockoutGuard<R::LockoutRepo>>,
    rate_limiter: Arc<RateLimiter<R::RateStore>>,
    cache: Arc<ResponseCache<R::CacheStore>>,
    audit: Arc<AuditTrail<R::AuditRepo>>,
    maintenance: MaintenanceFlag,
    token_config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl<R: RepositoryProvider> Postern<R> {
    /// Start building a Postern instance over `repositories`.
    pub fn builder(repositories: Arc<R>) -> PosternBuilder<R> {
        PosternBuilder::new(repositories)
    }

    pub(crate) fn from_parts(
        repositories: Arc<R>,
        authenticator: TokenAuthenticator<R::PrincipalRepo>,
        password: PasswordService<R::PrincipalRepo>,
        lockout: LockoutGuard<R::LockoutRepo>,
        rate_limiter: RateLimiter<R::RateStore>,
        cache: ResponseCache<R::CacheStore>,
        audit: AuditTrail<R::AuditRepo>,
        maintenance: MaintenanceFlag,
        token_config: TokenConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repositories,
            authenticator: Arc::new(authenticator),
            password: Arc::new(password),
            lockout: Arc::new(lockout),
            rate_limiter: Arc::new(rate_limiter),
            cache: Arc::new(cache),
            audit: Arc::new(audit),
            maintenance,
            token_config,
            clock,
        }
    }

    /// Start the audit writer and retention tasks. Call once at startup.
    pub async fn start_background_tasks(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.audit.start_writer_task(shutdown.clone()).await,
            self.audit.start_retention_task(shutdown),
        ]
    }

    /// Authenticate login credentials and mint a bearer token.
    ///
    /// The lockout guard runs before the credential is consulted; while the
    /// identifier is cooling down the credential is never checked, and the
    /// rejection is indistinguishable from a wrong password at the body
    /// level. Every attempt, either way, produces one audit record.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<String>,
    ) -> Result<(Principal, AccessToken), Error> {
        let identifier = email.trim().to_lowercase();
        let started = std::time::Instant::now();

        let ticket = match self.lockout.begin_attempt(&identifier).await {
            Ok(ticket) => ticket,
            Err(e) => {
                // Rejected inside the cooldown: the credential was never
                // consulted, but the attempt is still audited.
                self.audit_login(
                    None,
                    AuditOutcome::Failure,
                    ip,
                    started.elapsed().as_millis() as u64,
                );
                return Err(e);
            }
        };

        match self.password.verify_credentials(&identifier, password).await {
            Ok(principal) => {
                self.lockout.record_success(&identifier).await?;

                let token = AccessToken::mint(
                    &principal.id,
                    principal.role,
                    self.clock.now(),
                    &self.token_config,
                )?;

                self.audit_login(
                    Some(principal.id.clone()),
                    AuditOutcome::Success,
                    ip,
                    started.elapsed().as_millis() as u64,
                );

                Ok((principal, token))
            }
            Err(e) => {
                if matches!(
                    e,
                    Error::Authentication(AuthenticationError::InvalidCredentials)
                ) {
                    if let Err(record_err) =
                        self.lockout.record_failure(&identifier, ticket).await
                    {
                        tracing::warn!(error = %record_err, "Failed to record login failure");
                    }
                }

                self.audit_login(
                    None,
                    AuditOutcome::Failure,
                    ip,
                    started.elapsed().as_millis() as u64,
                );

                Err(e)
            }
        }
    }

    /// Resolve a bearer credential to a principal.
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Principal, Error> {
        self.authenticator.authenticate(bearer).await
    }

    /// Register a new principal.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
        role: Role,
    ) -> Result<Principal, Error> {
        let principal = self.password.register(email, password, name, role).await?;

        self.recorder().record(
            AuditRecord::builder()
                .actor_id(Some(principal.id.clone()))
                .action("member.register")
                .resource_type("member")
                .resource_id(Some(principal.id.to_string()))
                .resource_name(principal.name.clone())
                .outcome(AuditOutcome::Success)
                .recorded_at(self.clock.now())
                .build()?,
        );

        Ok(principal)
    }

    /// Change a principal's password. Revokes every token minted before the
    /// change and audits the operation.
    pub async fn change_password(
        &self,
        principal_id: &PrincipalId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), Error> {
        let started = std::time::Instant::now();
        let result = self
            .password
            .change_password(principal_id, old_password, new_password)
            .await;

        let outcome = if result.is_ok() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.recorder().record(
            AuditRecord::builder()
                .actor_id(Some(principal_id.clone()))
                .action("member.change_password")
                .resource_type("member")
                .resource_id(Some(principal_id.to_string()))
                .outcome(outcome)
                .recorded_at(self.clock.now())
                .duration_ms(Some(started.elapsed().as_millis() as u64))
                .build()?,
        );

        result
    }

    /// Look up a principal by id.
    pub async fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>, Error> {
        self.repositories.principals().find_by_id(id).await
    }

    /// Admit or reject a request for a client key; carries the header
    /// metadata either way.
    pub async fn check_rate_limit(&self, client_key: &str) -> Result<RateDecision, Error> {
        self.rate_limiter.check(client_key).await
    }

    /// Query the audit trail.
    pub async fn audit_query(
        &self,
        filter: &AuditFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<AuditRecord>, u64), Error> {
        self.audit.query(filter, page, limit).await
    }

    pub async fn audit_stats(&self, filter: &AuditFilter) -> Result<AuditStats, Error> {
        self.audit.stats(filter).await
    }

    pub async fn audit_export(
        &self,
        filter: &AuditFilter,
        format: ExportFormat,
    ) -> Result<String, Error> {
        self.audit.export(filter, format).await
    }

    pub async fn audit_purge(
        &self,
        days: i64,
        actor: Option<PrincipalId>,
    ) -> Result<u64, Error> {
        self.audit.purge_older_than(days, actor).await
    }

    /// Handle for business collaborators to report their state changes.
    pub fn recorder(&self) -> AuditRecorder {
        self.audit.recorder()
    }

    pub fn rate_limiter(&self) -> &RateLimiter<R::RateStore> {
        &self.rate_limiter
    }

    pub fn cache(&self) -> &ResponseCache<R::CacheStore> {
        &self.cache
    }

    pub fn lockout(&self) -> &LockoutGuard<R::LockoutRepo> {
        &self.lockout
    }

    pub fn maintenance(&self) -> &MaintenanceFlag {
        &self.maintenance
    }

    pub fn token_config(&self) -> &TokenConfig {
        &self.token_config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    fn audit_login(
        &self,
        actor: Option<PrincipalId>,
        outcome: AuditOutcome,
        ip: Option<String>,
        duration_ms: u64,
    ) {
        let record = AuditRecord::builder()
            .actor_id(actor)
            .action("auth.login")
            .resource_type("auth")
            .outcome(outcome)
            .ip(ip)
            .recorded_at(self.clock.now())
            .duration_ms(Some(duration_ms))
            .build();

        match record {
            Ok(record) => self.recorder().record(record),
            Err(e) => tracing::warn!(error = %e, "Failed to build login audit record"),
        }
    }
}
