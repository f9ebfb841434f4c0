//! Shared stores backing admission control
//!
//! Usage counters and API keys live outside the worker process so every worker
//! sees the same quota state. `redis` is the production backend; `memory` keeps
//! the same contract inside one process for development and tests.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::{MemoryCounterStore, MemoryKeyStore};
pub use redis_store::RedisStore;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Counter state right after an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Post-increment count within the current window
    pub count: u64,
    /// Time left until the window's counter expires
    pub ttl: Duration,
}

/// Atomically incrementing, self-expiring counters
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, creating it with `window` as its time-to-live when absent,
    /// and return the post-increment count with the remaining time-to-live.
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError>;

    /// Drop counters whose window has elapsed; returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Check the store is reachable
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Lookup of issued API keys
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// True iff `key` exists and its stored value is truthy
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;
}

/// Truthiness of a stored key document
pub(crate) fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty()
        || value == "0"
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("null"))
}
