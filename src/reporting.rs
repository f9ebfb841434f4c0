//! Error tracking
//!
//! Failures are always logged; when a collector DSN is configured they are
//! also shipped there as JSON events on a background task.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// One reportable failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub endpoint: String,
    pub status: u16,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(endpoint: &str, status: u16, message: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            environment: String::new(),
            endpoint: endpoint.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Sink for server-side failures
pub trait ErrorReporter: Send + Sync {
    /// Must not block the caller
    fn report(&self, event: &ErrorEvent);
}

/// Reports through the tracing pipeline
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, event: &ErrorEvent) {
        error!(
            event_id = %event.event_id,
            endpoint = %event.endpoint,
            status = event.status,
            message = %event.message,
            "Request failed"
        );
    }
}

/// Ships events to an HTTP collector
pub struct HttpReporter {
    http_client: reqwest::Client,
    dsn: String,
    environment: String,
}

impl HttpReporter {
    pub fn new(dsn: String, environment: String) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http_client,
            dsn,
            environment,
        })
    }
}

impl ErrorReporter for HttpReporter {
    fn report(&self, event: &ErrorEvent) {
        let mut event = event.clone();
        event.environment = self.environment.clone();

        let client = self.http_client.clone();
        let dsn = self.dsn.clone();

        tokio::spawn(async move {
            match client.post(&dsn).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(event_id = %event.event_id, "Error event delivered");
                }
                Ok(response) => {
                    warn!(status = response.status().as_u16(), "Error collector rejected event");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to deliver error event");
                }
            }
        });
    }
}

/// Fans an event out to several reporters
#[derive(Default)]
pub struct CompositeReporter {
    reporters: Vec<Arc<dyn ErrorReporter>>,
}

impl CompositeReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }
}

impl ErrorReporter for CompositeReporter {
    fn report(&self, event: &ErrorEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
