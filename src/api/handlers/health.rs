//! Health check and service banner

use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub uptime_seconds: u64,
    pub endpoints: usize,
    pub assets_loaded: usize,
    /// `ok` or `unavailable`
    pub store: &'static str,
}

#[derive(Serialize, ToSchema)]
pub struct IndexResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub documentation: &'static str,
    pub endpoints: &'static str,
}

/// GET /health - Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Counter store unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store_ok = match state.dispatcher.limiter().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health check: counter store unreachable");
            false
        }
    };

    let response = HealthResponse {
        status: if store_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.settings.error_tracking.environment.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        endpoints: state.dispatcher.registry().len(),
        assets_loaded: state.dispatcher.assets().image_count(),
        store: if store_ok { "ok" } else { "unavailable" },
    };

    if store_ok {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

/// GET / - Service banner
#[utoipa::path(
    get,
    path = "/",
    tag = "system",
    responses(
        (status = 200, description = "Service information", body = IndexResponse)
    )
)]
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(IndexResponse {
        service: "meme-forge",
        version: env!("CARGO_PKG_VERSION"),
        documentation: "/documentation/",
        endpoints: "/endpoints.json",
    })
}
