use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};

use postern::{
    AuditOutcome, AuditRecord, ExportFormat, Postern, RepositoryProvider, Role,
};
use postern_core::id::generate_prefixed_id;

use crate::{
    cache::cache_middleware,
    error::{ApiError, Result},
    extractors::{AdminPrincipal, Ctx, CurrentPrincipal},
    middleware::{
        PipelineState, api_key_middleware, auth_middleware, context_middleware, csrf_middleware,
        maintenance_middleware, rate_limit_middleware,
    },
    types::*,
};

pub fn create_router<R>(
    postern: Arc<Postern<R>>,
    cookie_config: CookieConfig,
    api_key: Option<String>,
    business_routes: Vec<Router>,
) -> Router
where
    R: RepositoryProvider + 'static,
{
    let state = PipelineState {
        postern,
        cookie_config,
        api_key,
    };

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/session", get(session_handler))
        .route("/auth/password", post(change_password_handler))
        .route("/admin/audit", get(list_audit_handler))
        .route("/admin/audit/stats", get(audit_stats_handler))
        .route("/admin/audit/export", get(audit_export_handler))
        .route("/admin/audit/purge", post(audit_purge_handler))
        .route(
            "/admin/cache",
            get(cache_inspect_handler).delete(cache_clear_handler),
        )
        .route("/admin/maintenance", post(maintenance_handler))
        .route("/admin/rate-limit/reset", post(rate_limit_reset_handler))
        .with_state(state.clone());

    for extra in business_routes {
        router = router.merge(extra);
    }

    // Layer order is inside-out: the last layer added runs first. Request
    // flow: context → rate limit → api key → auth → csrf → maintenance →
    // cache → handler.
    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            cache_middleware::<R>,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            maintenance_middleware::<R>,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            csrf_middleware::<R>,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<R>,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware::<R>,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state,
            rate_limit_middleware::<R>,
        ))
        .layer(axum::middleware::from_fn(context_middleware))
}

async fn health_handler<R>(State(state): State<PipelineState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state
        .postern
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn register_handler<R>(
    State(state): State<PipelineState<R>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let principal = state
        .postern
        .register(&payload.email, &payload.password, payload.name, Role::Member)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            principal: PrincipalResponse::from(&principal),
        }),
    ))
}

async fn login_handler<R>(
    State(state): State<PipelineState<R>>,
    Ctx(ctx): Ctx,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let (principal, token) = state
        .postern
        .login(&payload.email, &payload.password, ctx.client_ip.clone())
        .await?;

    let config = &state.cookie_config;
    let same_site = match config.same_site {
        CookieSameSite::Strict => SameSite::Strict,
        CookieSameSite::Lax => SameSite::Lax,
        CookieSameSite::None => SameSite::None,
    };

    let session_cookie = Cookie::build((config.name.clone(), token.to_string()))
        .path(config.path.clone())
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(same_site);

    // Double-submit cookie: readable by the frontend, echoed back in
    // X-CSRF-Token on non-safe methods.
    let csrf_cookie = Cookie::build((config.csrf_name.clone(), generate_prefixed_id("csrf")))
        .path(config.path.clone())
        .http_only(false)
        .secure(config.secure)
        .same_site(same_site);

    Ok((
        StatusCode::OK,
        AppendHeaders([
            (header::SET_COOKIE, session_cookie.to_string()),
            (header::SET_COOKIE, csrf_cookie.to_string()),
        ]),
        Json(LoginResponse {
            principal: PrincipalResponse::from(&principal),
            token,
        }),
    ))
}

async fn logout_handler<R>(
    State(state): State<PipelineState<R>>,
    jar: CookieJar,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    // Tokens are stateless: logging out is the client discarding its
    // credential, so clearing the cookies is all there is to do.
    let jar = jar
        .remove(Cookie::from(state.cookie_config.name.clone()))
        .remove(Cookie::from(state.cookie_config.csrf_name.clone()));

    Ok((
        jar,
        Json(MessageResponse {
            message: "Successfully logged out".to_string(),
        }),
    ))
}

async fn session_handler(
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<impl IntoResponse> {
    Ok(Json(SessionResponse {
        principal: PrincipalResponse::from(&principal),
    }))
}

async fn change_password_handler<R>(
    State(state): State<PipelineState<R>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state
        .postern
        .change_password(&principal.id, &payload.old_password, &payload.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed; existing tokens are no longer valid".to_string(),
    }))
}

async fn list_audit_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(_admin): AdminPrincipal,
    Query(params): Query<AuditQueryParams>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let (records, total) = state
        .postern
        .audit_query(&params.filter(), params.page(), params.limit())
        .await?;

    Ok(Json(AuditListResponse {
        records,
        pagination: Pagination::new(params.page(), params.limit(), total),
    }))
}

async fn audit_stats_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(_admin): AdminPrincipal,
    Query(params): Query<AuditQueryParams>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let stats = state.postern.audit_stats(&params.filter()).await?;
    Ok(Json(stats))
}

async fn audit_export_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(_admin): AdminPrincipal,
    Query(params): Query<AuditQueryParams>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let format = match params.format.as_deref() {
        None => ExportFormat::Json,
        Some(raw) => ExportFormat::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown export format: {raw}")))?,
    };

    let body = state.postern.audit_export(&params.filter(), format).await?;

    Ok(([(header::CONTENT_TYPE, format.content_type())], body))
}

async fn audit_purge_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(payload): Json<PurgeRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    if payload.days < 0 {
        return Err(ApiError::BadRequest(
            "Retention days must not be negative".to_string(),
        ));
    }

    let purged = state
        .postern
        .audit_purge(payload.days, Some(admin.id))
        .await?;

    Ok(Json(PurgeResponse { purged }))
}

async fn cache_inspect_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(_admin): AdminPrincipal,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let cache = state.postern.cache();
    Ok(Json(CacheInspectResponse {
        entries: cache.entries().await,
        len: cache.len().await,
    }))
}

async fn cache_clear_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(admin): AdminPrincipal,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let cleared = state.postern.cache().clear().await;

    record_admin_action(&state, &admin.id, "cache.clear", "cache", None);

    Ok(Json(CacheClearResponse { cleared }))
}

async fn maintenance_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(payload): Json<MaintenanceRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.postern.maintenance().set(payload.enabled);

    record_admin_action(
        &state,
        &admin.id,
        "maintenance.toggle",
        "maintenance",
        Some(serde_json::json!({ "enabled": payload.enabled })),
    );

    Ok(Json(MaintenanceResponse {
        enabled: payload.enabled,
    }))
}

async fn rate_limit_reset_handler<R>(
    State(state): State<PipelineState<R>>,
    AdminPrincipal(admin): AdminPrincipal,
    Json(payload): Json<RateLimitResetRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let reset = state
        .postern
        .rate_limiter()
        .reset_client(&payload.client_key)
        .await?;

    record_admin_action(
        &state,
        &admin.id,
        "rate_limit.reset",
        "rate_limit",
        Some(serde_json::json!({ "client_key": payload.client_key })),
    );

    Ok(Json(RateLimitResetResponse { reset }))
}

fn record_admin_action<R>(
    state: &PipelineState<R>,
    actor: &postern::PrincipalId,
    action: &str,
    resource_type: &str,
    after: Option<serde_json::Value>,
) where
    R: RepositoryProvider,
{
    let record = AuditRecord::builder()
        .actor_id(Some(actor.clone()))
        .action(action)
        .resource_type(resource_type)
        .after(after)
        .outcome(AuditOutcome::Success)
        .build();

    match record {
        Ok(record) => state.postern.recorder().record(record),
        Err(e) => tracing::warn!(error = %e, "Failed to build admin audit record"),
    }
}
