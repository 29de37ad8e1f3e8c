use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use postern::{AuthenticationError, AuthorizationError, Error as PosternError, RateLimitError};

/// Body shown for any credential-shaped failure. Wrong password, unknown
/// account, and locked account all present this exact message so the login
/// surface cannot be used to enumerate accounts.
pub(crate) const OPAQUE_CREDENTIAL_MESSAGE: &str = "invalid credentials";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Locked account. Same body as `InvalidCredentials`, different status.
    #[error("invalid credentials")]
    Locked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("Service temporarily unavailable for maintenance")]
    Maintenance,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<PosternError> for ApiError {
    fn from(err: PosternError) -> Self {
        match err {
            PosternError::Authentication(e) => match e {
                AuthenticationError::Missing => {
                    ApiError::Unauthenticated("Missing credential".to_string())
                }
                AuthenticationError::Invalid(_) => {
                    ApiError::Unauthenticated("Invalid credential".to_string())
                }
                AuthenticationError::Expired => {
                    ApiError::Unauthenticated("Credential expired".to_string())
                }
                AuthenticationError::StaleCredential => {
                    ApiError::Unauthenticated("Credential no longer valid".to_string())
                }
                AuthenticationError::UnknownPrincipal => {
                    ApiError::Unauthenticated("Unknown principal".to_string())
                }
                AuthenticationError::Unavailable => {
                    ApiError::Unauthenticated("Authentication unavailable".to_string())
                }
                AuthenticationError::InvalidCredentials => ApiError::InvalidCredentials,
            },
            PosternError::Authorization(e) => match e {
                AuthorizationError::AccountLocked { .. } => ApiError::Locked,
                AuthorizationError::MaintenanceMode => ApiError::Maintenance,
                other => ApiError::Forbidden(other.to_string()),
            },
            PosternError::RateLimit(RateLimitError::Exceeded { limit, reset_at }) => {
                ApiError::RateLimited { limit, reset_at }
            }
            PosternError::Validation(e) => ApiError::BadRequest(e.to_string()),
            PosternError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Unauthenticated(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": msg, "code": 401 }),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": OPAQUE_CREDENTIAL_MESSAGE, "code": 401 }),
            ),
            ApiError::Locked => (
                StatusCode::FORBIDDEN,
                json!({ "error": OPAQUE_CREDENTIAL_MESSAGE, "code": 403 }),
            ),
            ApiError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, json!({ "error": msg, "code": 403 }))
            }
            ApiError::RateLimited { limit, reset_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "rate limit exceeded",
                    "code": 429,
                    "limit": limit,
                    "reset_at": reset_at.to_rfc3339(),
                }),
            ),
            ApiError::Maintenance => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "service under maintenance", "code": 503 }),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg, "code": 400 }))
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error", "code": 500 }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_and_invalid_credentials_share_a_body() {
        // Only the status code may differ; the message must not leak which
        // case occurred.
        assert_eq!(
            ApiError::InvalidCredentials.to_string(),
            ApiError::Locked.to_string()
        );
    }

    #[test]
    fn test_locked_maps_to_403() {
        let err: ApiError = PosternError::Authorization(AuthorizationError::AccountLocked {
            locked_until: None,
        })
        .into();
        assert!(matches!(err, ApiError::Locked));
    }

    #[test]
    fn test_rate_limit_carries_reset_time() {
        let reset_at = Utc::now();
        let err: ApiError = PosternError::RateLimit(RateLimitError::Exceeded {
            limit: 10,
            reset_at,
        })
        .into();
        match err {
            ApiError::RateLimited { limit, reset_at: r } => {
                assert_eq!(limit, 10);
                assert_eq!(r, reset_at);
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }
}
