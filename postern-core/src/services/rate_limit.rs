//! Per-client sliding-window rate limiter.
//!
//! The first stage of the pipeline: over-budget clients are rejected before
//! any credential or business work happens. Each client gets an ordered
//! window of request timestamps; the window is pruned on every check, so the
//! quota frees up continuously rather than at fixed boundaries.

use std::sync::Arc;

use chrono::Duration;

use crate::{
    Error,
    clock::Clock,
    error::RateLimitError,
    repositories::{RateDecision, RateWindowStore},
};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests allowed per client within one window.
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 120,
            window: Duration::minutes(1),
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

pub struct RateLimiter<S: RateWindowStore> {
    store: Arc<S>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl<S: RateWindowStore> RateLimiter<S> {
    pub fn new(store: Arc<S>, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or reject one request for `client_key`.
    ///
    /// The decision carries the header metadata either way; rejection also
    /// surfaces as [`RateLimitError::Exceeded`] with the reset time.
    pub async fn check(&self, client_key: &str) -> Result<RateDecision, Error> {
        if !self.config.enabled {
            let now = self.clock.now();
            return Ok(RateDecision {
                allowed: true,
                limit: self.config.max_requests,
                remaining: self.config.max_requests,
                reset_at: now + self.config.window,
            });
        }

        let decision = self
            .store
            .hit(
                client_key,
                self.config.window,
                self.config.max_requests,
                self.clock.now(),
            )
            .await?;

        if !decision.allowed {
            tracing::debug!(
                client = %client_key,
                limit = decision.limit,
                reset_at = %decision.reset_at,
                "Rate limit exceeded"
            );
            return Err(RateLimitError::Exceeded {
                limit: decision.limit,
                reset_at: decision.reset_at,
            }
            .into());
        }

        Ok(decision)
    }

    /// Drop a client's window (admin reset).
    pub async fn reset_client(&self, client_key: &str) -> Result<bool, Error> {
        self.store.reset(client_key).await
    }

    /// Number of clients currently tracked.
    pub async fn tracked_clients(&self) -> Result<usize, Error> {
        self.store.len().await
    }
}
