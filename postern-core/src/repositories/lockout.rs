//! Repository trait for lockout state.
//!
//! Every method is a complete read-modify-write transition that must be
//! atomic per key: two concurrent failed attempts for the same identifier
//! must both count toward the threshold. Attempts are keyed by login
//! identifier (normalized email), not by principal row, so identifiers that
//! do not correspond to any account are tracked identically.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{Error, principal::SecurityState};

/// Result of opening a login attempt against the current lockout state.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The account is open; a subsequent failure should be counted.
    Proceed,
    /// A previous lock has just expired. The state was reset and this
    /// attempt already counted as failure number one, so a subsequent
    /// failure must not increment again.
    ProceedCounted,
    /// Still inside the cooldown; the credential must not be consulted.
    Locked { locked_until: DateTime<Utc> },
}

#[async_trait]
pub trait LockoutRepository: Send + Sync + 'static {
    /// Open an attempt: reject while locked, reset to one counted failure
    /// when the lock has expired, otherwise pass through.
    async fn begin_attempt(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome, Error>;

    /// Count a failed attempt; transition to locked when the new count
    /// reaches `threshold`. Returns the state after the transition.
    async fn record_failure(
        &self,
        key: &str,
        threshold: u32,
        lock_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<SecurityState, Error>;

    /// Clear the counter and any lock after a successful authentication.
    async fn record_success(&self, key: &str) -> Result<(), Error>;

    async fn get(&self, key: &str) -> Result<SecurityState, Error>;
}
