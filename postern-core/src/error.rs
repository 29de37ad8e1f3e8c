use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Failures establishing who the caller is. Always surfaced as 401.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("Missing credential")]
    Missing,

    #[error("Invalid credential: {0}")]
    Invalid(String),

    #[error("Credential expired")]
    Expired,

    #[error("Credential predates a password change")]
    StaleCredential,

    #[error("Unknown principal")]
    UnknownPrincipal,

    #[error("Identity store unavailable")]
    Unavailable,

    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// Failures of an authenticated caller to access a resource. Surfaced as 403.
#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("Insufficient role")]
    RoleMismatch,

    #[error("Account is {0}")]
    AccountStatus(String),

    /// Presented with the same body as a failed credential so callers cannot
    /// probe which accounts exist or are locked.
    #[error("Account temporarily locked")]
    AccountLocked {
        locked_until: Option<DateTime<Utc>>,
    },

    #[error("Service is in maintenance mode")]
    MaintenanceMode,

    #[error("CSRF token missing or invalid")]
    CsrfMismatch,
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, resets at {reset_at}")]
    Exceeded {
        limit: u32,
        reset_at: DateTime<Utc>,
    },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl Error {
    /// True for failures that must fail fast at the boundary, before any
    /// business logic runs.
    pub fn is_security_error(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_) | Error::Authorization(_) | Error::RateLimit(_)
        )
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}
