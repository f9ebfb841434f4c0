//! API module - HTTP routes and handlers

pub mod handlers;
pub mod openapi;

use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;

/// Configure all API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api").service(
            web::resource("/{endpoint}")
                .route(web::get().to(handlers::memes::get_meme))
                .route(web::post().to(handlers::memes::post_meme)),
        ),
    )
    .route("/endpoints.json", web::get().to(handlers::endpoints::list_endpoints))
    .route("/stats", web::get().to(handlers::endpoints::stats))
    .route("/health", web::get().to(handlers::health::health_check))
    .route("/", web::get().to(handlers::health::index))
    // Swagger UI and OpenAPI spec
    .service(
        SwaggerUi::new("/documentation/{_:.*}")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
}
