//! OpenAPI 3 document served under /documentation

use utoipa::OpenApi;

use crate::api::handlers::{
    endpoints::{EndpointInfo, EndpointsResponse},
    health::{HealthResponse, IndexResponse},
    memes::MemeRequest,
};
use crate::error::ErrorBody;
use crate::registry::StatsSnapshot;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Meme Forge API",
        version = "1.0.0",
        description = "Meme image generation with per-key, per-endpoint rate limiting",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "memes", description = "Meme generation endpoints"),
        (name = "discovery", description = "Endpoint listing and statistics")
    ),
    paths(
        crate::api::handlers::health::health_check,
        crate::api::handlers::health::index,
        crate::api::handlers::memes::get_meme,
        crate::api::handlers::memes::post_meme,
        crate::api::handlers::endpoints::list_endpoints,
        crate::api::handlers::endpoints::stats,
    ),
    components(
        schemas(
            HealthResponse,
            IndexResponse,
            MemeRequest,
            EndpointInfo,
            EndpointsResponse,
            StatsSnapshot,
            ErrorBody,
        )
    )
)]
pub struct ApiDoc;
