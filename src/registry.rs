//! Endpoint registry
//!
//! Built once at startup and shared read-only afterwards.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

use crate::engine::Generator;

pub const DEFAULT_RATE: u32 = 5;
pub const DEFAULT_PER_SECONDS: u64 = 1;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Endpoint {0} is already registered")]
    Duplicate(String),
}

/// Hit count and cumulative generation time for one endpoint
#[derive(Debug, Default)]
pub struct EndpointStats {
    hits: AtomicU64,
    total_gen_micros: AtomicU64,
}

impl EndpointStats {
    pub fn record(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_gen_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Mean generation time in milliseconds, 0 before the first hit
    pub fn avg_gen_time_ms(&self) -> f64 {
        let hits = self.hits();
        if hits == 0 {
            return 0.0;
        }
        self.total_gen_micros.load(Ordering::Relaxed) as f64 / hits as f64 / 1000.0
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            avg_gen_time: self.avg_gen_time_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatsSnapshot {
    pub hits: u64,
    /// Milliseconds
    pub avg_gen_time: f64,
}

/// One registered meme endpoint
pub struct Endpoint {
    pub name: String,
    pub rate: u32,
    pub per: u64,
    pub restricted: bool,
    pub generator: Arc<dyn Generator>,
    pub stats: EndpointStats,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, generator: impl Generator + 'static) -> Self {
        Self {
            name: name.into(),
            rate: DEFAULT_RATE,
            per: DEFAULT_PER_SECONDS,
            restricted: false,
            generator: Arc::new(generator),
            stats: EndpointStats::default(),
        }
    }

    /// Override the default `rate` requests per `per` seconds
    pub fn with_rate(mut self, rate: u32, per: u64) -> Self {
        self.rate = rate;
        self.per = per.max(1);
        self
    }

    /// Require the privileged token in addition to a valid key
    pub fn restricted(mut self) -> Self {
        self.restricted = true;
        self
    }

    pub fn params(&self) -> &'static [&'static str] {
        self.generator.params()
    }

    /// `"<rate>/<per>s"`
    pub fn ratelimit_label(&self) -> String {
        format!("{}/{}s", self.rate, self.per)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("rate", &self.rate)
            .field("per", &self.per)
            .field("restricted", &self.restricted)
            .finish()
    }
}

/// Name to endpoint table, enumerated in registration order
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<Arc<Endpoint>>,
    index: HashMap<String, usize>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, endpoint: Endpoint) -> Result<(), RegistryError> {
        if self.index.contains_key(&endpoint.name) {
            return Err(RegistryError::Duplicate(endpoint.name));
        }
        self.index.insert(endpoint.name.clone(), self.endpoints.len());
        self.endpoints.push(Arc::new(endpoint));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.index.get(name).map(|&i| self.endpoints[i].clone())
    }

    pub fn list(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.endpoints.iter()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
