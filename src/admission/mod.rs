//! Request admission
//!
//! Authorization against the key store followed by fixed-window quota
//! accounting per (API key, endpoint).

pub mod auth;
pub mod rate_limit;

pub use auth::{extract_api_key, key_fingerprint, AuthorizationGate};
pub use rate_limit::{
    add_rate_limit_headers, RateLimitDecision, RateLimiter,
    RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RETRY_AFTER,
};
