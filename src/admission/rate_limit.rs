//! Fixed-window rate limiting
//!
//! Each (API key, endpoint) pair owns one counter whose TTL is the window
//! length. The counter is incremented before it is compared with the limit,
//! so the request that crosses the limit is both counted and rejected.

use actix_web::{
    http::header::{HeaderName, HeaderValue},
    HttpResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::auth::key_fingerprint;
use crate::store::{CounterStore, StoreError};

/// Rate limit headers
pub const RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
pub const RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
pub const RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
pub const RETRY_AFTER: &str = "Retry-After";

/// Outcome of one quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limit: u32,
    /// Requests left in the window; `-1` once the limit is exceeded
    pub remaining: i64,
    /// Unix timestamp at which the window expires
    pub reset: i64,
    /// Seconds to wait before retrying, set only on rejection
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    /// Build a decision from the post-increment count and the window's remaining TTL
    pub fn from_count(max_usage: u32, count: u64, ttl: Duration, now: i64) -> Self {
        let ttl_secs = ttl.as_secs();
        let reset = now + ttl_secs as i64;

        if count > u64::from(max_usage) {
            Self {
                limit: max_usage,
                remaining: -1,
                reset,
                retry_after: Some(ttl_secs),
            }
        } else {
            Self {
                limit: max_usage,
                remaining: i64::from(max_usage) - count as i64,
                reset,
                retry_after: None,
            }
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.remaining < 0
    }
}

/// Per-key, per-endpoint quota enforcement over a shared counter store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    fn counter_key(key: &str, endpoint: &str) -> String {
        format!("ratelimit:{}:{}", endpoint, key_fingerprint(key))
    }

    /// Count one request against `(key, endpoint)` and decide admission
    pub async fn check_and_increment(
        &self,
        key: &str,
        endpoint: &str,
        max_usage: u32,
        window_seconds: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        let window = Duration::from_secs(window_seconds.max(1));
        let snapshot = self
            .store
            .increment(&Self::counter_key(key, endpoint), window)
            .await?;

        let decision = RateLimitDecision::from_count(
            max_usage,
            snapshot.count,
            snapshot.ttl,
            chrono::Utc::now().timestamp(),
        );

        if decision.is_rejected() {
            warn!(
                key = %key_fingerprint(key),
                endpoint = %endpoint,
                count = snapshot.count,
                limit = max_usage,
                retry_after = ?decision.retry_after,
                "Rate limit exceeded"
            );
        } else {
            debug!(
                key = %key_fingerprint(key),
                endpoint = %endpoint,
                remaining = decision.remaining,
                "Request admitted"
            );
        }

        Ok(decision)
    }

    /// Sweep expired counters; no-op on stores with native expiry
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.store.purge_expired().await
    }

    /// Check that the counter store is reachable
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

/// Add rate limit headers to a successful response
pub fn add_rate_limit_headers(response: &mut HttpResponse, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    let remaining = decision.remaining.max(0);

    headers.insert(
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(remaining),
    );
    headers.insert(
        HeaderName::from_static("x-ratelimit-reset"),
        HeaderValue::from(decision.reset),
    );
}
