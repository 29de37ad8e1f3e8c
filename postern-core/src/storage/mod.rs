//! Storage implementations
//!
//! The in-memory provider is the default backend: map-backed, per-key
//! atomic, suitable for a single-instance deployment and for tests (one
//! isolated instance per test).

pub mod memory;

pub use memory::{
    MemoryAuditRepository, MemoryLockoutRepository, MemoryPrincipalRepository,
    MemoryRateWindowStore, MemoryRepositoryProvider, MemoryResponseCacheStore,
};
