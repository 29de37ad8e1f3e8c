use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postern::{AccessToken, AccountStatus, AuditFilter, AuditOutcome, Principal, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Wire view of a principal; never exposes security counters.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
}

impl From<&Principal> for PrincipalResponse {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id.to_string(),
            email: p.email.clone(),
            name: p.name.clone(),
            role: p.role,
            status: p.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub principal: PrincipalResponse,
    pub token: AccessToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub principal: PrincipalResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Query parameters for audit listing and export.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQueryParams {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// `success` or `failure`
    pub outcome: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    /// Export only: `json` (default) or `csv`
    pub format: Option<String>,
}

impl AuditQueryParams {
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            actor_id: self.actor_id.clone(),
            action: self.action.clone(),
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            outcome: match self.outcome.as_deref() {
                Some("success") => Some(AuditOutcome::Success),
                Some("failure") => Some(AuditOutcome::Failure),
                _ => None,
            },
            from: self.from,
            to: self.to,
            search: self.search.clone(),
        }
    }

    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            has_next: (page as u64) * (limit as u64) < total,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditListResponse {
    pub records: Vec<postern::AuditRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurgeRequest {
    pub days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInspectResponse {
    pub entries: Vec<postern_core::repositories::CacheEntry>,
    pub len: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheClearResponse {
    pub cleared: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResponse {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResetRequest {
    pub client_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResetResponse {
    pub reset: bool,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Session cookie carrying the bearer token for browser flows.
    pub name: String,
    /// Double-submit CSRF cookie, readable by the frontend.
    pub csrf_name: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: CookieSameSite,
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "session_token".to_string(),
            csrf_name: "csrf_token".to_string(),
            http_only: true,
            secure: true,
            same_site: CookieSameSite::Lax,
            path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum CookieSameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl CookieConfig {
    pub fn development() -> Self {
        Self {
            secure: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_flags() {
        let p = Pagination::new(1, 10, 25);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let p = Pagination::new(3, 10, 25);
        assert!(!p.has_next);
        assert!(p.has_prev);
    }

    #[test]
    fn test_audit_params_defaults() {
        let params = AuditQueryParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), 50);
        assert!(params.filter().outcome.is_none());
    }

    #[test]
    fn test_audit_params_outcome_parse() {
        let params = AuditQueryParams {
            outcome: Some("failure".to_string()),
            ..Default::default()
        };
        assert_eq!(params.filter().outcome, Some(AuditOutcome::Failure));

        let params = AuditQueryParams {
            outcome: Some("bogus".to_string()),
            ..Default::default()
        };
        assert!(params.filter().outcome.is_none());
    }
}
