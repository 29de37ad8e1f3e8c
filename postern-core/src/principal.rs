//! Principals
//!
//! A principal is an authenticated identity with a role. The record is owned
//! by the identity store; the authenticator reads it on every request, and
//! the password service mutates `password_changed_at` to revoke credentials
//! issued before a password change.
//!
//! | Field                 | Type               | Description                                       |
//! | --------------------- | ------------------ | ------------------------------------------------- |
//! | `id`                  | `PrincipalId`      | Unique identifier (`mbr_…`).                      |
//! | `email`               | `String`           | Login identifier, stored normalized.              |
//! | `name`                | `Option<String>`   | Display name.                                     |
//! | `role`                | `Role`             | `admin` or `member`.                              |
//! | `status`              | `AccountStatus`    | Active / suspended / pending.                     |
//! | `password_changed_at` | `Option<DateTime>` | Set on every password change; revokes older tokens. |
//! | `last_activity_at`    | `Option<DateTime>` | Best-effort, updated off the request path.        |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::ValidationError,
    id::{generate_prefixed_id, validate_prefixed_id},
};

/// A unique, stable identifier for a principal.
/// Treat the value as opaque; the `mbr_` prefix exists for log readability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: &str) -> Self {
        PrincipalId(id.to_string())
    }

    pub fn new_random() -> Self {
        PrincipalId(generate_prefixed_id("mbr"))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, "mbr")
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<String> for PrincipalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PrincipalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role carried inside the credential and checked at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Pending,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Pending => "pending",
        }
    }
}

/// Lockout counters for one login identifier.
///
/// Keyed by normalized email rather than by principal so attempts against
/// identifiers that do not exist are tracked and rejected identically.
/// Invariant: `locked_until` is only ever set while `failed_attempts` has
/// reached the lockout threshold; both reset together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityState {
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl SecurityState {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,

    pub email: String,

    pub name: Option<String>,

    pub role: Role,

    pub status: AccountStatus,

    /// When set, any credential minted before this instant is rejected as
    /// stale even if its own expiry has not passed.
    pub password_changed_at: Option<DateTime<Utc>>,

    pub last_activity_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn builder() -> PrincipalBuilder {
        PrincipalBuilder::default()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[derive(Default)]
pub struct PrincipalBuilder {
    id: Option<PrincipalId>,
    email: Option<String>,
    name: Option<String>,
    role: Option<Role>,
    status: Option<AccountStatus>,
    password_changed_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

impl PrincipalBuilder {
    pub fn id(mut self, id: PrincipalId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn status(mut self, status: AccountStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn password_changed_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.password_changed_at = at;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> Result<Principal, Error> {
        let now = Utc::now();
        let email = self.email.ok_or(ValidationError::MissingField(
            "Email is required".to_string(),
        ))?;

        Ok(Principal {
            id: self.id.unwrap_or_default(),
            email: email.trim().to_lowercase(),
            name: self.name,
            role: self.role.unwrap_or(Role::Member),
            status: self.status.unwrap_or(AccountStatus::Active),
            password_changed_at: self.password_changed_at,
            last_activity_at: None,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.created_at.unwrap_or(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_principal_id_prefixed() {
        let id = PrincipalId::new_random();
        assert!(id.as_str().starts_with("mbr_"));
        assert!(id.is_valid());

        let other = PrincipalId::new_random();
        assert_ne!(id, other);

        assert!(!PrincipalId::new("plain").is_valid());
    }

    #[test]
    fn test_builder_requires_email() {
        let result = Principal::builder().role(Role::Member).build();
        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::MissingField(_)))
        ));
    }

    #[test]
    fn test_builder_normalizes_email() {
        let principal = Principal::builder()
            .email("  Casey@Example.COM ")
            .build()
            .unwrap();
        assert_eq!(principal.email, "casey@example.com");
        assert_eq!(principal.role, Role::Member);
        assert_eq!(principal.status, AccountStatus::Active);
    }

    #[test]
    fn test_security_state_lock_window() {
        let now = Utc::now();
        let state = SecurityState {
            failed_attempts: 5,
            locked_until: Some(now + Duration::minutes(15)),
        };
        assert!(state.is_locked(now));
        assert!(!state.is_locked(now + Duration::minutes(15)));
        assert!(!SecurityState::default().is_locked(now));
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("member"), Some(Role::Member));
        assert_eq!(Role::parse("owner"), None);
        assert_eq!(Role::Admin.to_string(), "admin");
    }
}
