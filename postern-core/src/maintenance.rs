//! Maintenance mode
//!
//! A process-wide flag that, while set, short-circuits all non-admin traffic
//! outside an allow-list with a 503-equivalent rejection. The flag sits in
//! core so the facade and the HTTP layer share one source of truth.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

#[derive(Debug, Clone)]
pub struct MaintenanceFlag {
    enabled: Arc<AtomicBool>,
    /// Path prefixes that stay reachable during maintenance, so an
    /// administrator can still sign in and turn the flag off.
    allowed_prefixes: Arc<Vec<String>>,
}

impl MaintenanceFlag {
    pub fn new(allowed_prefixes: Vec<String>) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            allowed_prefixes: Arc::new(allowed_prefixes),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if enabled {
            tracing::warn!("Maintenance mode enabled");
        } else {
            tracing::info!("Maintenance mode disabled");
        }
    }

    pub fn is_path_allowed(&self, path: &str) -> bool {
        self.allowed_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// True when this request should be rejected: flag on, caller not an
    /// admin, path not allow-listed.
    pub fn blocks(&self, path: &str, is_admin: bool) -> bool {
        self.is_enabled() && !is_admin && !self.is_path_allowed(path)
    }
}

impl Default for MaintenanceFlag {
    fn default() -> Self {
        Self::new(vec!["/auth/login".to_string(), "/health".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_off_blocks_nothing() {
        let flag = MaintenanceFlag::default();
        assert!(!flag.blocks("/courses", false));
    }

    #[test]
    fn test_flag_on_blocks_members_not_admins() {
        let flag = MaintenanceFlag::default();
        flag.set(true);

        assert!(flag.blocks("/courses", false));
        assert!(!flag.blocks("/courses", true));
    }

    #[test]
    fn test_allow_list_stays_reachable() {
        let flag = MaintenanceFlag::default();
        flag.set(true);

        assert!(!flag.blocks("/auth/login", false));
        assert!(!flag.blocks("/health", false));
    }

    #[test]
    fn test_clones_share_state() {
        let flag = MaintenanceFlag::default();
        let other = flag.clone();
        flag.set(true);
        assert!(other.is_enabled());
    }
}
