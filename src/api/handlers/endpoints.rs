//! Endpoint discovery and usage statistics

use actix_web::{web, HttpResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::registry::StatsSnapshot;
use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct EndpointInfo {
    pub name: String,
    pub parameters: Vec<String>,
    /// `"<rate>/<per>s"`
    pub ratelimit: String,
}

#[derive(Serialize, ToSchema)]
pub struct EndpointsResponse {
    pub endpoints: Vec<EndpointInfo>,
}

/// GET /endpoints.json - List registered endpoints
#[utoipa::path(
    get,
    path = "/endpoints.json",
    tag = "discovery",
    responses(
        (status = 200, description = "Registered endpoints in registration order", body = EndpointsResponse)
    )
)]
pub async fn list_endpoints(state: web::Data<AppState>) -> HttpResponse {
    let endpoints = state
        .dispatcher
        .registry()
        .list()
        .map(|endpoint| EndpointInfo {
            name: endpoint.name.clone(),
            parameters: endpoint.params().iter().map(|p| p.to_string()).collect(),
            ratelimit: endpoint.ratelimit_label(),
        })
        .collect();

    HttpResponse::Ok().json(EndpointsResponse { endpoints })
}

/// GET /stats - Hits and mean generation time per endpoint
#[utoipa::path(
    get,
    path = "/stats",
    tag = "discovery",
    responses(
        (status = 200, description = "Per-endpoint statistics keyed by endpoint name", body = BTreeMap<String, StatsSnapshot>)
    )
)]
pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    let stats: BTreeMap<String, StatsSnapshot> = state
        .dispatcher
        .registry()
        .list()
        .map(|endpoint| (endpoint.name.clone(), endpoint.stats.snapshot()))
        .collect();

    HttpResponse::Ok().json(stats)
}
