//! API Key Authorization
//!
//! Keys are opaque strings passed verbatim in the `Authorization` header.
//! Presence of a truthy key document in the key store is the only
//! authorization level; restricted endpoints additionally demand the
//! configured shared secret.

use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::KeyStore;

/// Extract the API key from request headers
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Short, non-reversible identifier for a key, safe to log and to use in store keys
pub fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}

/// Validates callers against the key store
#[derive(Clone)]
pub struct AuthorizationGate {
    keys: Arc<dyn KeyStore>,
    restricted_token: Option<String>,
}

impl AuthorizationGate {
    pub fn new(keys: Arc<dyn KeyStore>, restricted_token: Option<String>) -> Self {
        Self {
            keys,
            restricted_token: restricted_token.filter(|token| !token.is_empty()),
        }
    }

    /// True iff the key exists in the store. Store failures fail closed.
    pub async fn authorize(&self, key: Option<&str>) -> bool {
        let Some(key) = key.filter(|key| !key.is_empty()) else {
            debug!("No API key supplied");
            return false;
        };

        match self.keys.contains(key).await {
            Ok(true) => {
                debug!(key = %key_fingerprint(key), "API key validated");
                true
            }
            Ok(false) => {
                warn!(key = %key_fingerprint(key), "API key not found");
                false
            }
            Err(e) => {
                warn!(error = %e, "Key store lookup failed, denying request");
                false
            }
        }
    }

    /// Shared-secret check for restricted endpoints; never passes when no secret is configured
    pub fn is_privileged(&self, key: Option<&str>) -> bool {
        match (&self.restricted_token, key) {
            (Some(token), Some(key)) => token == key,
            _ => false,
        }
    }
}
