//! Repository trait for the audit trail.
//!
//! The log is append-only: records are never updated, only appended, queried,
//! and eventually purged once they age past the retention horizon.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    audit::{AuditFilter, AuditRecord},
};

#[async_trait]
pub trait AuditRepository: Send + Sync + 'static {
    async fn append(&self, record: AuditRecord) -> Result<(), Error>;

    /// Filtered, newest-first page of records plus the total match count.
    /// `page` is 1-based.
    async fn query(
        &self,
        filter: &AuditFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<AuditRecord>, u64), Error>;

    /// Delete records older than `cutoff`. Returns the count removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error>;
}
