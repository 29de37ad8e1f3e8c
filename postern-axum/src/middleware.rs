use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use postern::{Postern, RepositoryProvider, RequestContext};

use crate::{error::ApiError, types::CookieConfig};

pub struct PipelineState<R: RepositoryProvider> {
    pub postern: Arc<Postern<R>>,
    pub cookie_config: CookieConfig,
    /// When set, every request must carry a matching `X-API-Key` header.
    pub api_key: Option<String>,
}

impl<R: RepositoryProvider> Clone for PipelineState<R> {
    fn clone(&self) -> Self {
        Self {
            postern: self.postern.clone(),
            cookie_config: self.cookie_config.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

/// Outermost layer: mints the request id, inserts the [`RequestContext`],
/// and stamps `X-Request-ID` / `X-Response-Time` on the way out.
pub async fn context_middleware(mut request: Request, next: Next) -> Response {
    let client_ip = client_ip_of(&request);
    let ctx = RequestContext::new(client_ip, Utc::now());
    let request_id = ctx.request_id.clone();

    request.extensions_mut().insert(ctx);

    let started = Instant::now();
    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_millis();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed_ms}ms")) {
        response.headers_mut().insert("X-Response-Time", value);
    }

    response
}

/// Rejects over-budget clients before anything else runs; stamps the
/// `X-RateLimit-*` headers on every response, rejections included.
pub async fn rate_limit_middleware<R>(
    State(state): State<PipelineState<R>>,
    request: Request,
    next: Next,
) -> Response
where
    R: RepositoryProvider,
{
    let client_key = request
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.client_ip.clone())
        .unwrap_or_else(|| "unknown".to_string());

    match state.postern.check_rate_limit(&client_key).await {
        Ok(decision) => {
            let mut response = next.run(request).await;
            set_rate_headers(
                &mut response,
                decision.limit,
                decision.remaining,
                decision.reset_at.timestamp(),
            );
            response
        }
        Err(e) => {
            let api_error: ApiError = e.into();
            let reset = match &api_error {
                ApiError::RateLimited { reset_at, .. } => reset_at.timestamp(),
                _ => 0,
            };
            let limit = match &api_error {
                ApiError::RateLimited { limit, .. } => *limit,
                _ => 0,
            };
            let mut response = api_error.into_response();
            set_rate_headers(&mut response, limit, 0, reset);
            response
        }
    }
}

/// Optional source validation: when an API key is configured, every request
/// must present it.
pub async fn api_key_middleware<R>(
    State(state): State<PipelineState<R>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    if let Some(expected) = &state.api_key {
        let presented = request
            .headers()
            .get("X-API-Key")
            .and_then(|value| value.to_str().ok());

        if presented != Some(expected.as_str()) {
            return Err(ApiError::Unauthenticated("Invalid API key".to_string()));
        }
    }

    Ok(next.run(request).await)
}

/// Resolves the bearer credential (header first, session cookie as the
/// browser fallback) and extends the request context with the principal.
///
/// Anonymous requests pass through; a *presented* credential that fails
/// verification is rejected here, at the boundary.
pub async fn auth_middleware<R>(
    State(state): State<PipelineState<R>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let (token, from_cookie) = if let Some(token) = extract_bearer_token(&request) {
        (Some(token), false)
    } else {
        let cookie_token = jar
            .get(&state.cookie_config.name)
            .map(|cookie| cookie.value().to_string());
        (cookie_token, true)
    };

    if let Some(token) = token {
        match state.postern.authenticate(Some(&token)).await {
            Ok(principal) => {
                if let Some(ctx) = request.extensions().get::<RequestContext>() {
                    let extended = ctx.with_principal(principal, from_cookie);
                    request.extensions_mut().insert(extended);
                }
            }
            // A bad bearer credential is an explicit API claim: fail fast.
            Err(e) if !from_cookie => return Err(e.into()),
            // A bad session cookie is browser leftovers (expired, or revoked
            // by a password change): proceed anonymous so the login path
            // stays usable.
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring invalid session cookie");
            }
        }
    }

    Ok(next.run(request).await)
}

/// Double-submit CSRF check for cookie-authenticated browser flows: a
/// non-safe method must echo the csrf cookie in `X-CSRF-Token`.
pub async fn csrf_middleware<R>(
    State(state): State<PipelineState<R>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let method = request.method();
    let safe_method = method == Method::GET || method == Method::HEAD || method == Method::OPTIONS;
    let cookie_auth = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(|ctx| ctx.cookie_auth && ctx.principal.is_some());

    if cookie_auth && !safe_method {
        let cookie_value = jar
            .get(&state.cookie_config.csrf_name)
            .map(|cookie| cookie.value().to_string());
        let header_value = request
            .headers()
            .get("X-CSRF-Token")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        match (cookie_value, header_value) {
            (Some(cookie), Some(header)) if cookie == header => {}
            _ => {
                return Err(ApiError::Forbidden(
                    "CSRF token missing or invalid".to_string(),
                ));
            }
        }
    }

    Ok(next.run(request).await)
}

/// Runs after authentication so admins pass; everything else outside the
/// allow-list gets a 503 while the flag is on.
pub async fn maintenance_middleware<R>(
    State(state): State<PipelineState<R>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let is_admin = request
        .extensions()
        .get::<RequestContext>()
        .is_some_and(|ctx| ctx.is_admin());

    if state
        .postern
        .maintenance()
        .blocks(request.uri().path(), is_admin)
    {
        return Err(ApiError::Maintenance);
    }

    Ok(next.run(request).await)
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

fn client_ip_of(request: &Request) -> Option<String> {
    // Prefer the proxy-reported address, fall back to the peer address.
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

fn set_rate_headers(response: &mut Response, limit: u32, remaining: u32, reset: i64) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&reset.to_string()) {
        headers.insert("X-RateLimit-Reset", value);
    }
}
