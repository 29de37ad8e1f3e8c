//! Response-cache middleware.
//!
//! Read-through for GET/HEAD: a hit short-circuits the handler entirely; a
//! miss invokes it and stores successful responses. Mutating methods never
//! read the cache, but a successful mutation sweeps the resource family it
//! touched so no family serves stale data past its own mutation.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use postern::RepositoryProvider;
use postern_core::services::CacheLookup;

use crate::{error::ApiError, middleware::PipelineState};

/// GET/HEAD bodies participate in the cache key; anything bigger than this
/// is not worth caching.
const REQUEST_BODY_LIMIT: usize = 64 * 1024;

pub async fn cache_middleware<R>(
    State(state): State<PipelineState<R>>,
    request: Request,
    next: Next,
) -> Response
where
    R: RepositoryProvider,
{
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(|q| q.to_string());

    let cache = state.postern.cache();

    // Mutations bypass the cache on the way in and invalidate on the way
    // out.
    if matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE") {
        let response = next.run(request).await;
        if response.status().is_success() {
            cache.invalidate_path(&path).await;
        }
        return response;
    }

    let principal = request
        .extensions()
        .get::<postern::RequestContext>()
        .and_then(|ctx| ctx.principal().cloned());

    if cache.bypasses(&method, principal.as_ref()) {
        return next.run(request).await;
    }

    // The body is part of the key, so buffer and replay it.
    let (parts, body) = request.into_parts();
    let body_bytes = match to_bytes(body, REQUEST_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return ApiError::BadRequest("Request body too large to cache".to_string())
                .into_response();
        }
    };
    let request = Request::from_parts(parts, Body::from(body_bytes.clone()));

    let key = cache.key_for(
        &method,
        &path,
        query.as_deref(),
        &body_bytes,
        principal.as_ref(),
    );

    if let CacheLookup::Hit(entry) = cache.lookup(&key).await {
        let remaining = cache.remaining_ttl(&entry);
        return cached_response(entry.status, entry.content_type, entry.body, remaining);
    }

    let response = next.run(request).await;

    if !response.status().is_success() {
        return annotated(response, "MISS", None);
    }

    // Buffer the successful response so it can be stored and replayed.
    let (parts, body) = response.into_parts();
    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer response for caching");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let content_type = parts
        .headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    cache
        .store(
            &key,
            parts.status.as_u16(),
            content_type,
            body_bytes.to_vec(),
        )
        .await;

    let ttl = cache.config().ttl.num_seconds();
    let response = Response::from_parts(parts, Body::from(body_bytes));
    annotated(response, "MISS", Some(ttl))
}

fn cached_response(
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
    remaining_ttl: i64,
) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);

    if let Some(content_type) = content_type {
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            response.headers_mut().insert("content-type", value);
        }
    }

    annotated(response, "HIT", Some(remaining_ttl))
}

fn annotated(mut response: Response, state: &'static str, ttl: Option<i64>) -> Response {
    response
        .headers_mut()
        .insert("X-Cache", HeaderValue::from_static(state));
    if let Some(ttl) = ttl {
        if let Ok(value) = HeaderValue::from_str(&ttl.to_string()) {
            response.headers_mut().insert("X-Cache-TTL", value);
        }
    }
    response
}
