//! # Postern Axum Integration
//!
//! Axum middleware and routes for the postern security pipeline. Mounting
//! the router gives an application the full request flow:
//!
//! rate limit → api-key check → authentication → CSRF → maintenance gate →
//! response cache → handler, with `X-Request-ID`, `X-Response-Time`,
//! `X-RateLimit-*`, and `X-Cache` stamped on responses.
//!
//! Business routes merged through the builder sit behind the same pipeline
//! and see the authenticated [`RequestContext`](postern::RequestContext) as
//! a request extension.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use postern::Postern;
//! use postern_core::storage::MemoryRepositoryProvider;
//! use postern_axum::{routes, CookieConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let repositories = Arc::new(MemoryRepositoryProvider::new());
//!     let postern = Arc::new(Postern::builder(repositories).build());
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     postern.start_background_tasks(shutdown_rx).await;
//!
//!     let app: Router = routes(postern)
//!         .with_cookie_config(CookieConfig::development())
//!         .merge(Router::new().route("/courses", get(|| async { "[]" })))
//!         .build();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
//!         .await
//!         .unwrap();
//! }
//! ```

mod cache;
mod error;
mod extractors;
mod middleware;
mod routes;
mod types;

pub use cache::cache_middleware;
pub use error::{ApiError, Result};
pub use extractors::{AdminPrincipal, Ctx, CurrentPrincipal, OptionalPrincipal};
pub use middleware::{
    PipelineState, api_key_middleware, auth_middleware, context_middleware, csrf_middleware,
    maintenance_middleware, rate_limit_middleware,
};
pub use routes::create_router;
pub use types::{
    AuditListResponse, AuditQueryParams, CacheClearResponse, CacheInspectResponse,
    ChangePasswordRequest, CookieConfig, CookieSameSite, HealthResponse, LoginRequest,
    LoginResponse, MaintenanceRequest, MaintenanceResponse, MessageResponse, Pagination,
    PrincipalResponse, PurgeRequest, PurgeResponse, RateLimitResetRequest,
    RateLimitResetResponse, RegisterRequest, SessionResponse,
};

use axum::Router;
use std::sync::Arc;

use postern::{Postern, RepositoryProvider};

/// Start building the pipeline router for an Axum application.
pub fn routes<R>(postern: Arc<Postern<R>>) -> PipelineRouterBuilder<R>
where
    R: RepositoryProvider + 'static,
{
    PipelineRouterBuilder {
        postern,
        cookie_config: CookieConfig::default(),
        api_key: None,
        business_routes: Vec::new(),
    }
}

/// Builder for the pipeline router.
pub struct PipelineRouterBuilder<R: RepositoryProvider> {
    postern: Arc<Postern<R>>,
    cookie_config: CookieConfig,
    api_key: Option<String>,
    business_routes: Vec<Router>,
}

impl<R: RepositoryProvider + 'static> PipelineRouterBuilder<R> {
    /// Set custom cookie configuration
    pub fn with_cookie_config(mut self, config: CookieConfig) -> Self {
        self.cookie_config = config;
        self
    }

    /// Require a static `X-API-Key` header on every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Merge business routes behind the pipeline.
    pub fn merge(mut self, router: Router) -> Self {
        self.business_routes.push(router);
        self
    }

    /// Build the router with the configured options
    pub fn build(self) -> Router {
        create_router(
            self.postern,
            self.cookie_config,
            self.api_key,
            self.business_routes,
        )
    }
}

impl<R: RepositoryProvider + 'static> From<PipelineRouterBuilder<R>> for Router {
    fn from(builder: PipelineRouterBuilder<R>) -> Self {
        builder.build()
    }
}
