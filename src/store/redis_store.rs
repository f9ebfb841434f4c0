//! Redis-backed counter and key store
//!
//! Counters are plain integer keys with a native TTL. The increment, the
//! expiry and the TTL read run in one Lua script so concurrent workers never
//! observe a counter without an expiry.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

use super::{is_truthy, CounterSnapshot, CounterStore, KeyStore, StoreError};

const INCREMENT_SCRIPT: &str = r#"
    local count = redis.call("INCR", KEYS[1])
    local window = tonumber(ARGV[1])

    if count == 1 then
        redis.call("EXPIRE", KEYS[1], window)
        return {count, window}
    end

    local ttl = redis.call("TTL", KEYS[1])
    if ttl < 0 then
        redis.call("EXPIRE", KEYS[1], window)
        ttl = window
    end

    return {count, ttl}
"#;

/// Store holding usage counters and API keys in Redis
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
    prefix: String,
    increment_script: redis::Script,
}

impl RedisStore {
    /// Connect to Redis; every key this store touches is namespaced under `prefix`
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection_manager = ConnectionManager::new(client).await?;

        info!(prefix = %prefix, "Connected to Redis store");

        Ok(Self {
            connection_manager,
            prefix: prefix.to_string(),
            increment_script: redis::Script::new(INCREMENT_SCRIPT),
        })
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn api_key_key(&self, api_key: &str) -> String {
        format!("{}:keys:{}", self.prefix, api_key)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<CounterSnapshot, StoreError> {
        let mut connection_manager = self.connection_manager.clone();
        let window_secs = window.as_secs().max(1);

        let (count, ttl): (u64, u64) = self
            .increment_script
            .key(self.counter_key(key))
            .arg(window_secs)
            .invoke_async(&mut connection_manager)
            .await?;

        debug!(key = %key, count, ttl, "Incremented Redis counter");

        Ok(CounterSnapshot {
            count,
            ttl: Duration::from_secs(ttl),
        })
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        // Redis expires counters on its own
        Ok(0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut connection_manager = self.connection_manager.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut connection_manager)
            .await?;
        if reply != "PONG" {
            return Err(StoreError::Unavailable(format!("unexpected PING reply: {}", reply)));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for RedisStore {
    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        if key.is_empty() {
            return Ok(false);
        }

        let mut connection_manager = self.connection_manager.clone();
        let value: Option<String> = connection_manager.get(self.api_key_key(key)).await?;

        Ok(value.as_deref().is_some_and(is_truthy))
    }
}
