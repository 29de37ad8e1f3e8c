//! Request context
//!
//! One immutable value describing the request in flight. The pipeline builds
//! it up by returning extended copies (`with_principal`) rather than
//! mutating in place, and business handlers receive it as their only view of
//! the security layer.

use chrono::{DateTime, Utc};

use crate::{id::generate_prefixed_id, principal::Principal};

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id (`req_…`), echoed back as `X-Request-ID`.
    pub request_id: String,

    /// Client address as seen by the listener.
    pub client_ip: Option<String>,

    pub received_at: DateTime<Utc>,

    /// Set once authentication succeeds; `None` on anonymous routes.
    pub principal: Option<Principal>,

    /// True when the credential arrived via cookie rather than a bearer
    /// header; cookie flows require CSRF proof on non-safe methods.
    pub cookie_auth: bool,
}

impl RequestContext {
    pub fn new(client_ip: Option<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            request_id: generate_prefixed_id("req"),
            client_ip,
            received_at,
            principal: None,
            cookie_auth: false,
        }
    }

    /// Return a copy carrying the authenticated principal.
    pub fn with_principal(&self, principal: Principal, cookie_auth: bool) -> Self {
        Self {
            principal: Some(principal),
            cookie_auth,
            ..self.clone()
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.principal.as_ref().is_some_and(|p| p.is_admin())
    }
}
