//! Meme generation endpoints

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::dispatch::RawRequest;
use crate::AppState;

/// JSON body accepted by `POST /api/{endpoint}`
///
/// Keys other than the ones below are passed to the endpoint as extra options.
/// The body is parsed by the dispatcher; this type only documents it.
#[derive(Debug, Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct MemeRequest {
    pub text: Option<String>,
    /// Avatar URLs or `data:image/...;base64,` references
    pub avatars: Option<Vec<String>>,
    /// Alias for `avatars`
    pub images: Option<Vec<String>>,
    pub usernames: Option<Vec<String>>,
}

/// GET /api/{endpoint} - Generate a meme from query parameters
#[utoipa::path(
    get,
    path = "/api/{endpoint}",
    tag = "memes",
    params(
        ("endpoint" = String, Path, description = "Endpoint name, see /endpoints.json"),
        ("Authorization" = String, Header, description = "API key"),
        ("text" = Option<String>, Query, description = "Caption text"),
        ("avatar1" = Option<String>, Query, description = "First avatar (alias: image)"),
        ("avatar2" = Option<String>, Query, description = "Second avatar"),
        ("username1" = Option<String>, Query, description = "First username"),
        ("username2" = Option<String>, Query, description = "Second username"),
    ),
    responses(
        (status = 200, description = "Generated image (image/png, image/jpeg or image/gif)"),
        (status = 400, description = "Bad or missing parameter", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or unknown API key", body = crate::error::ErrorBody),
        (status = 403, description = "Restricted endpoint", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown endpoint", body = crate::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::error::ErrorBody),
        (status = 500, description = "Generation failed", body = crate::error::ErrorBody)
    )
)]
pub async fn get_meme(
    state: web::Data<AppState>,
    endpoint: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let request = RawRequest::from_http(&req, web::Bytes::new());
    state.dispatcher.handle(&endpoint, request).await
}

/// POST /api/{endpoint} - Generate a meme from a JSON body
#[utoipa::path(
    post,
    path = "/api/{endpoint}",
    tag = "memes",
    params(
        ("endpoint" = String, Path, description = "Endpoint name, see /endpoints.json"),
        ("Authorization" = String, Header, description = "API key"),
    ),
    request_body = MemeRequest,
    responses(
        (status = 200, description = "Generated image (image/png, image/jpeg or image/gif)"),
        (status = 400, description = "Body is not JSON, or a bad or missing parameter", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or unknown API key", body = crate::error::ErrorBody),
        (status = 403, description = "Restricted endpoint", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown endpoint", body = crate::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::error::ErrorBody),
        (status = 500, description = "Generation failed", body = crate::error::ErrorBody)
    )
)]
pub async fn post_meme(
    state: web::Data<AppState>,
    endpoint: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let request = RawRequest::from_http(&req, body);
    state.dispatcher.handle(&endpoint, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::dispatch::tests::harness;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn test_routes_reach_dispatcher() {
        let h = harness();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(Default::default(), h.dispatcher)))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/caption?text=hello")
            .insert_header(("Authorization", "abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), "2");

        let req = test::TestRequest::post()
            .uri("/api/caption")
            .insert_header(("Authorization", "abc"))
            .set_json(serde_json::json!({"text": "hi"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("Content-Type").unwrap(), "image/png");

        let req = test::TestRequest::get().uri("/api/unknown").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_post_plain_text_is_rejected() {
        let h = harness();
        let counters = h.counters.clone();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(Default::default(), h.dispatcher)))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/caption")
            .insert_header(("Authorization", "abc"))
            .insert_header(("Content-Type", "text/plain"))
            .set_payload("hello")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(counters.len(), 0);
    }
}
