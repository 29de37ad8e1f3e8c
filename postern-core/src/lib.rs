//! Core functionality for the postern request-security pipeline
//!
//! This crate holds the pieces every other postern crate builds on: the
//! principal and credential types, the error taxonomy, the repository traits
//! with their in-memory implementations, and the services that make up the
//! pipeline (authentication, lockout, rate limiting, response caching, and
//! the audit trail).
//!
//! It is designed as a dependency for the `postern` facade and the
//! `postern-axum` integration, not for direct use by application handlers.

pub mod audit;
pub mod clock;
pub mod context;
pub mod error;
pub mod id;
pub mod maintenance;
pub mod principal;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod token;
pub mod validation;

pub use audit::{AuditFilter, AuditOutcome, AuditRecord, AuditStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::RequestContext;
pub use error::Error;
pub use maintenance::MaintenanceFlag;
pub use principal::{AccountStatus, Principal, PrincipalId, Role, SecurityState};
pub use repositories::RepositoryProvider;
pub use token::{AccessToken, TokenClaims, TokenConfig};
