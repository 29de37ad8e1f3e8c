//! Service layer
//!
//! Services hold the pipeline's behavior; repositories hold its state. Each
//! service is generic over its repository trait and safe to share across
//! tasks behind an `Arc`.

pub mod audit;
pub mod authenticator;
pub mod cache;
pub mod lockout;
pub mod password;
pub mod rate_limit;

pub use audit::{AuditConfig, AuditRecorder, AuditTrail};
pub use authenticator::{AuthenticatorConfig, TokenAuthenticator};
pub use cache::{CacheConfig, CacheLookup, ResponseCache};
pub use lockout::{LockoutConfig, LockoutGuard};
pub use password::PasswordService;
pub use rate_limit::{RateLimitConfig, RateLimiter};
