//! Account lockout guard.
//!
//! Tracks consecutive authentication failures per login identifier and
//! enforces a temporary cooldown once they reach a threshold. The lock is a
//! cooldown, not a ban: it self-heals when the window elapses, with no
//! administrator involvement.
//!
//! The guard is consulted only on the login path, and it answers identically
//! whether or not the identifier belongs to a real account, so callers
//! cannot use it to probe which accounts exist.

use std::sync::Arc;

use chrono::Duration;

use crate::{
    Error,
    clock::Clock,
    error::AuthorizationError,
    principal::SecurityState,
    repositories::{AttemptOutcome, LockoutRepository},
};

#[derive(Debug, Clone)]
pub struct LockoutConfig {
    pub enabled: bool,
    /// Consecutive failures that trigger the lock.
    pub max_failed_attempts: u32,
    /// Cooldown applied once the threshold is reached.
    pub lock_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failed_attempts: 5,
            lock_duration: Duration::minutes(15),
        }
    }
}

impl LockoutConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Tracks failed logins and rejects attempts while an identifier is cooling
/// down.
pub struct LockoutGuard<R: LockoutRepository> {
    repository: Arc<R>,
    config: LockoutConfig,
    clock: Arc<dyn Clock>,
}

/// What `begin_attempt` learned before the credential check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptTicket {
    /// True when the attempt was already counted as failure number one
    /// because it reset an expired lock; a subsequent failure must not be
    /// counted a second time.
    already_counted: bool,
}

impl<R: LockoutRepository> LockoutGuard<R> {
    pub fn new(repository: Arc<R>, config: LockoutConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Gate a login attempt.
    ///
    /// While the identifier is locked and the cooldown has not elapsed, this
    /// rejects immediately; the credential is never consulted. Once the
    /// cooldown has elapsed the state resets and the attempt proceeds,
    /// counting as failure number one if it goes on to fail.
    pub async fn begin_attempt(&self, key: &str) -> Result<AttemptTicket, Error> {
        if !self.config.enabled {
            return Ok(AttemptTicket {
                already_counted: true,
            });
        }

        let now = self.clock.now();
        match self.repository.begin_attempt(key, now).await? {
            AttemptOutcome::Locked { locked_until } => {
                tracing::warn!(identifier = %key, "Login attempt against locked identifier");
                Err(AuthorizationError::AccountLocked {
                    locked_until: Some(locked_until),
                }
                .into())
            }
            AttemptOutcome::ProceedCounted => Ok(AttemptTicket {
                already_counted: true,
            }),
            AttemptOutcome::Proceed => Ok(AttemptTicket {
                already_counted: false,
            }),
        }
    }

    /// Count a failed credential check for an attempt previously admitted by
    /// [`begin_attempt`](Self::begin_attempt).
    pub async fn record_failure(
        &self,
        key: &str,
        ticket: AttemptTicket,
    ) -> Result<SecurityState, Error> {
        if !self.config.enabled || ticket.already_counted {
            return self.repository.get(key).await;
        }

        let now = self.clock.now();
        let state = self
            .repository
            .record_failure(
                key,
                self.config.max_failed_attempts,
                self.config.lock_duration,
                now,
            )
            .await?;

        if state.locked_until.is_some() {
            tracing::warn!(
                identifier = %key,
                failed_attempts = state.failed_attempts,
                "Identifier locked after repeated failures"
            );
        }

        Ok(state)
    }

    /// Reset the counter after a successful authentication.
    pub async fn record_success(&self, key: &str) -> Result<(), Error> {
        self.repository.record_success(key).await
    }

    /// Current state, for inspection.
    pub async fn state(&self, key: &str) -> Result<SecurityState, Error> {
        self.repository.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryLockoutRepository;
    use chrono::Utc;

    fn guard(config: LockoutConfig) -> (LockoutGuard<MemoryLockoutRepository>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let guard = LockoutGuard::new(
            Arc::new(MemoryLockoutRepository::new()),
            config,
            Arc::new(clock.clone()),
        );
        (guard, clock)
    }

    async fn fail_once(guard: &LockoutGuard<MemoryLockoutRepository>, key: &str) {
        let ticket = guard.begin_attempt(key).await.unwrap();
        guard.record_failure(key, ticket).await.unwrap();
    }

    #[tokio::test]
    async fn test_locks_after_threshold() {
        let (guard, _clock) = guard(LockoutConfig::default());

        for _ in 0..5 {
            fail_once(&guard, "a@example.com").await;
        }

        let result = guard.begin_attempt("a@example.com").await;
        assert!(matches!(
            result,
            Err(Error::Authorization(AuthorizationError::AccountLocked { .. }))
        ));
    }

    #[tokio::test]
    async fn test_below_threshold_stays_open() {
        let (guard, _clock) = guard(LockoutConfig::default());

        for _ in 0..4 {
            fail_once(&guard, "a@example.com").await;
        }

        assert!(guard.begin_attempt("a@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_self_heals_and_attempt_counts_once() {
        let (guard, clock) = guard(LockoutConfig::default());

        for _ in 0..5 {
            fail_once(&guard, "a@example.com").await;
        }

        clock.advance(Duration::minutes(15));

        // The cooldown has elapsed: the attempt proceeds and counts as one.
        let ticket = guard.begin_attempt("a@example.com").await.unwrap();
        let state = guard.record_failure("a@example.com", ticket).await.unwrap();
        assert_eq!(state.failed_attempts, 1);
        assert!(state.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let (guard, _clock) = guard(LockoutConfig::default());

        for _ in 0..3 {
            fail_once(&guard, "a@example.com").await;
        }

        guard.begin_attempt("a@example.com").await.unwrap();
        guard.record_success("a@example.com").await.unwrap();

        let state = guard.state("a@example.com").await.unwrap();
        assert_eq!(state.failed_attempts, 0);
        assert!(state.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_identifiers_tracked_separately() {
        let (guard, _clock) = guard(LockoutConfig::default());

        for _ in 0..5 {
            fail_once(&guard, "a@example.com").await;
        }

        assert!(guard.begin_attempt("b@example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_identifier_locks_the_same_way() {
        // The guard never consults the identity store, so an identifier with
        // no account behind it behaves exactly like a real one.
        let (guard, _clock) = guard(LockoutConfig::default());

        for _ in 0..5 {
            fail_once(&guard, "ghost@example.com").await;
        }

        let result = guard.begin_attempt("ghost@example.com").await;
        assert!(matches!(
            result,
            Err(Error::Authorization(AuthorizationError::AccountLocked { .. }))
        ));
    }

    #[tokio::test]
    async fn test_disabled_guard_never_locks() {
        let (guard, _clock) = guard(LockoutConfig::disabled());

        for _ in 0..10 {
            let ticket = guard.begin_attempt("a@example.com").await.unwrap();
            guard.record_failure("a@example.com", ticket).await.unwrap();
        }

        assert!(guard.begin_attempt("a@example.com").await.is_ok());
    }
}
