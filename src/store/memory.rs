//! In-process counter and key stores
//!
//! Only correct for a single worker process; a multi-process deployment must
//! use the Redis backend. Expired counters linger until the next increment
//! or the cleanup loop purges them.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::time::{Duration, Instant};

use super::{CounterSnapshot, CounterStore, KeyStore, StoreError};

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    expires_at: Instant,
}

/// Fixed-window counters kept in a sharded map
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, Counter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counters currently held, expired or not
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Current count for `key`, ignoring expired windows
    #[cfg(test)]
    pub fn count(&self, key: &str) -> u64 {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|counter| counter.expires_at > now)
            .map(|counter| counter.count)
            .unwrap_or(0)
    }
}

/// Round a remaining duration up to whole seconds, never below one
fn remaining_ttl(expires_at: Instant, now: Instant) -> Duration {
    let remaining = expires_at.saturating_duration_since(now);
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    Duration::from_secs(secs.max(1))
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        let now = Instant::now();

        // The entry guard holds the shard lock, so read-modify-write is atomic per key
        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: now + window,
        });

        if entry.expires_at <= now {
            *entry = Counter {
                count: 0,
                expires_at: now + window,
            };
        }

        entry.count += 1;

        Ok(CounterSnapshot {
            count: entry.count,
            ttl: remaining_ttl(entry.expires_at, now),
        })
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| counter.expires_at > now);
        Ok(before.saturating_sub(self.counters.len()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// API keys held in process, seeded from configuration
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: DashSet<String>,
}

impl MemoryKeyStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        for key in keys {
            store.insert(key);
        }
        store
    }

    pub fn insert(&self, key: impl Into<String>) {
        let key = key.into();
        if !key.is_empty() {
            self.keys.insert(key);
        }
    }

    #[cfg(test)]
    pub fn revoke(&self, key: &str) -> bool {
        self.keys.remove(key).is_some()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keys.contains(key))
    }
}
