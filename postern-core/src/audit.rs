//! Audit records
//!
//! Every state-changing action produces exactly one record: who did what to
//! which resource, the before/after snapshots, the outcome, and how long it
//! took. Records are immutable once written and are purged after a
//! configurable retention window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::ValidationError,
    id::generate_prefixed_id,
    principal::PrincipalId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier (`aud_…`).
    pub id: String,

    /// Who performed the action. `None` for unauthenticated actions such as
    /// failed logins.
    pub actor_id: Option<PrincipalId>,

    /// Dotted action kind, e.g. `auth.login`, `course.update`.
    pub action: String,

    /// Resource family, e.g. `course`, `member`, `audit`.
    pub resource_type: String,

    pub resource_id: Option<String>,

    /// Human-readable name, searchable via the free-text filter.
    pub resource_name: Option<String>,

    /// Snapshot before the mutation, when the caller captured one.
    pub before: Option<serde_json::Value>,

    /// Snapshot after the mutation.
    pub after: Option<serde_json::Value>,

    pub outcome: AuditOutcome,

    pub ip: Option<String>,

    pub recorded_at: DateTime<Utc>,

    pub duration_ms: Option<u64>,
}

impl AuditRecord {
    pub fn builder() -> AuditRecordBuilder {
        AuditRecordBuilder::default()
    }
}

#[derive(Default)]
pub struct AuditRecordBuilder {
    actor_id: Option<PrincipalId>,
    action: Option<String>,
    resource_type: Option<String>,
    resource_id: Option<String>,
    resource_name: Option<String>,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
    outcome: Option<AuditOutcome>,
    ip: Option<String>,
    recorded_at: Option<DateTime<Utc>>,
    duration_ms: Option<u64>,
}

impl AuditRecordBuilder {
    pub fn actor_id(mut self, actor_id: Option<PrincipalId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn resource_id(mut self, resource_id: Option<String>) -> Self {
        self.resource_id = resource_id;
        self
    }

    pub fn resource_name(mut self, resource_name: Option<String>) -> Self {
        self.resource_name = resource_name;
        self
    }

    pub fn before(mut self, before: Option<serde_json::Value>) -> Self {
        self.before = before;
        self
    }

    pub fn after(mut self, after: Option<serde_json::Value>) -> Self {
        self.after = after;
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    pub fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(recorded_at);
        self
    }

    pub fn duration_ms(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn build(self) -> Result<AuditRecord, Error> {
        Ok(AuditRecord {
            id: generate_prefixed_id("aud"),
            actor_id: self.actor_id,
            action: self.action.ok_or(ValidationError::MissingField(
                "Action is required".to_string(),
            ))?,
            resource_type: self.resource_type.ok_or(ValidationError::MissingField(
                "Resource type is required".to_string(),
            ))?,
            resource_id: self.resource_id,
            resource_name: self.resource_name,
            before: self.before,
            after: self.after,
            outcome: self.outcome.unwrap_or(AuditOutcome::Success),
            ip: self.ip,
            recorded_at: self.recorded_at.unwrap_or_else(Utc::now),
            duration_ms: self.duration_ms,
        })
    }
}

/// Filter for audit queries. All fields combine with AND; `None` matches
/// everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub outcome: Option<AuditOutcome>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring match against `resource_name`.
    pub search: Option<String>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(actor_id) = &self.actor_id {
            if record.actor_id.as_ref().map(|a| a.as_str()) != Some(actor_id.as_str()) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &record.action != action {
                return false;
            }
        }
        if let Some(resource_type) = &self.resource_type {
            if &record.resource_type != resource_type {
                return false;
            }
        }
        if let Some(resource_id) = &self.resource_id {
            if record.resource_id.as_deref() != Some(resource_id.as_str()) {
                return false;
            }
        }
        if let Some(outcome) = &self.outcome {
            if &record.outcome != outcome {
                return false;
            }
        }
        if let Some(from) = &self.from {
            if record.recorded_at < *from {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if record.recorded_at > *to {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = record
                .resource_name
                .as_ref()
                .is_some_and(|name| name.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Aggregated view over a set of audit records.
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub total: u64,
    pub by_action: Vec<(String, u64)>,
    pub by_resource_type: Vec<(String, u64)>,
    pub by_outcome: Vec<(String, u64)>,
    /// Fraction of records with a success outcome, 0.0 when empty.
    pub success_rate: f64,
    pub average_duration_ms: f64,
    /// Hours of day (0-23) ranked by record count, busiest first.
    pub busiest_hours: Vec<(u32, u64)>,
    /// Actor ids ranked by record count, most active first.
    pub most_active_actors: Vec<(String, u64)>,
}
