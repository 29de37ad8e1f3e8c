use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

use postern::{Principal, RequestContext};

use crate::error::ApiError;

/// The pipeline's request context, inserted by the context middleware.
pub struct Ctx(pub RequestContext);

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(Ctx)
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Request context missing; is the context middleware installed?",
            ))
    }
}

/// The authenticated principal. Rejects with 401 when the request is
/// anonymous.
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.principal().cloned())
            .ok_or_else(|| ApiError::Unauthenticated("Missing credential".to_string()))?;

        Ok(CurrentPrincipal(principal))
    }
}

/// The authenticated principal, required to hold the admin role.
pub struct AdminPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AdminPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentPrincipal(principal) =
            CurrentPrincipal::from_request_parts(parts, state).await?;

        if !principal.is_admin() {
            return Err(ApiError::Forbidden("Insufficient role".to_string()));
        }

        Ok(AdminPrincipal(principal))
    }
}

/// The principal if one authenticated, `None` otherwise.
pub struct OptionalPrincipal(pub Option<Principal>);

impl<S> FromRequestParts<S> for OptionalPrincipal
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.principal().cloned());

        Ok(OptionalPrincipal(principal))
    }
}
