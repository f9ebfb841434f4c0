//! Meme Forge
//!
//! Meme image generation API using Rust + Actix-Web.
//! Every endpoint is gated by an API key and a fixed-window quota per
//! (key, endpoint) kept in a shared counter store.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

mod admission;
mod api;
mod config;
mod dispatch;
mod engine;
mod error;
mod lifecycle;
mod registry;
mod reporting;
mod store;

use crate::admission::{AuthorizationGate, RateLimiter};
use crate::config::{Settings, StoreBackend};
use crate::dispatch::Dispatcher;
use crate::engine::{AssetProvider, HttpAvatarSource};
use crate::lifecycle::Lifecycle;
use crate::registry::EndpointRegistry;
use crate::reporting::{CompositeReporter, ErrorReporter, HttpReporter, LogReporter};
use crate::store::{CounterStore, KeyStore, MemoryCounterStore, MemoryKeyStore, RedisStore};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Settings,
    pub dispatcher: Dispatcher,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings, dispatcher: Dispatcher) -> Self {
        Self {
            settings,
            dispatcher,
            started_at: Instant::now(),
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meme_forge=info".parse()?)
                .add_directive("actix_web=info".parse()?),
        )
        .json()
        .init();

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting Meme Forge v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    let (counters, keys) = build_stores(&settings).await?;

    // Load all template images into memory at startup
    let assets = Arc::new(AssetProvider::new(settings.assets.path.clone()));
    let preloaded = assets.load_all().await.context("Failed to load assets")?;
    info!("Loaded {} template images", preloaded);

    let mut registry = EndpointRegistry::new();
    engine::plugins::register_all(&mut registry).context("Failed to register endpoints")?;
    if registry.is_empty() {
        anyhow::bail!("No endpoints registered");
    }
    info!("Registered {} endpoints", registry.len());

    let avatars = HttpAvatarSource::new(
        Duration::from_secs(settings.fetch.timeout_secs),
        settings.fetch.max_bytes,
    )
    .context("Failed to build avatar HTTP client")?;

    let limiter = RateLimiter::new(counters);
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        AuthorizationGate::new(keys, settings.auth.memer_token.clone()),
        limiter.clone(),
        Arc::new(avatars),
        assets,
        build_reporter(&settings)?,
    );

    let lifecycle = Lifecycle::new();
    lifecycle.start_cleanup(limiter, Duration::from_secs(settings.cleanup.interval_secs));

    // Create shared application state
    let workers = settings.workers();
    let app_state = web::Data::new(AppState::new(settings, dispatcher));

    // Configure and start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "meme-forge"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION"))),
            )
            .configure(api::configure_routes)
    })
    .workers(workers)
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await?;

    lifecycle.shutdown().await;
    info!("Server stopped");
    Ok(())
}

/// Counter and key stores for the configured backend
async fn build_stores(
    settings: &Settings,
) -> anyhow::Result<(Arc<dyn CounterStore>, Arc<dyn KeyStore>)> {
    match settings.store.backend {
        StoreBackend::Redis => {
            let store = Arc::new(
                RedisStore::connect(&settings.store.redis_url, &settings.store.key_prefix)
                    .await
                    .context("Failed to connect to Redis")?,
            );
            info!("Using Redis counter and key store");
            let counters: Arc<dyn CounterStore> = store.clone();
            let keys: Arc<dyn KeyStore> = store;
            Ok((counters, keys))
        }
        StoreBackend::Memory => {
            if settings.store.static_keys.is_empty() {
                warn!("In-memory key store has no keys; every request will be rejected");
            }
            info!(
                keys = settings.store.static_keys.len(),
                "Using in-memory counter and key store"
            );
            let counters: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
            let keys: Arc<dyn KeyStore> =
                Arc::new(MemoryKeyStore::new(settings.store.static_keys.iter().cloned()));
            Ok((counters, keys))
        }
    }
}

/// Log reporter, plus the HTTP collector when a DSN is configured
fn build_reporter(settings: &Settings) -> anyhow::Result<Arc<dyn ErrorReporter>> {
    let mut reporter = CompositeReporter::new().with(Arc::new(LogReporter));

    if let Some(dsn) = settings.error_tracking.dsn.as_ref().filter(|dsn| !dsn.is_empty()) {
        let http = HttpReporter::new(dsn.clone(), settings.error_tracking.environment.clone())
            .context("Failed to build error reporter")?;
        reporter = reporter.with(Arc::new(http));
        info!("Error events are shipped to the configured collector");
    }

    Ok(Arc::new(reporter))
}
