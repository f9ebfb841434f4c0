//! Request dispatch
//!
//! Turns one `/api/{endpoint}` call into either an encoded image or a JSON
//! error. The order of checks is fixed:
//!
//! 1. unknown endpoint (404)
//! 2. request parsing (400)
//! 3. API key (401)
//! 4. privileged token for restricted endpoints (403)
//! 5. quota (429)
//! 6. avatar retrieval and generation (400 / 500)
//!
//! Steps 1 to 4 never touch the usage counters.

use actix_web::{
    http::{header, Method},
    web::Bytes,
    HttpRequest, HttpResponse, ResponseError,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::admission::{
    add_rate_limit_headers, extract_api_key, key_fingerprint, AuthorizationGate, RateLimiter,
};
use crate::engine::{fetch_all, AssetProvider, AvatarSource, GenerationError, GeneratorInput};
use crate::error::{ApiError, MALFORMED_JSON_MESSAGE};
use crate::registry::{Endpoint, EndpointRegistry};
use crate::reporting::{ErrorEvent, ErrorReporter};

const MISSING_PARAMETER_HINT: &str = ". Are you missing a parameter?";

/// The parts of an HTTP request the dispatcher reads
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub api_key: Option<String>,
    pub content_type: Option<String>,
    pub query: String,
    pub body: Bytes,
}

impl RawRequest {
    pub fn from_http(req: &HttpRequest, body: Bytes) -> Self {
        Self {
            method: req.method().clone(),
            api_key: extract_api_key(req.headers()),
            content_type: req
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            query: req.query_string().to_string(),
            body,
        }
    }
}

/// Parsed, per-request generator parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestEnvelope {
    pub text: String,
    /// Avatar references (URLs or data URIs), in slot order
    pub avatars: Vec<String>,
    pub usernames: Vec<String>,
    pub kwargs: BTreeMap<String, String>,
}

impl RequestEnvelope {
    pub fn parse(request: &RawRequest) -> Result<Self, ApiError> {
        if request.method == Method::POST {
            Self::from_json(request.content_type.as_deref(), &request.body)
        } else {
            Ok(Self::from_query(&request.query))
        }
    }

    /// `text`, `avatar1`/`image`, `avatar2`, `username1`, `username2`; anything else is a kwarg
    pub fn from_query(query: &str) -> Self {
        let mut params: BTreeMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let text = params.remove("text").unwrap_or_default();
        let image = non_empty(params.remove("image"));
        let first_avatar = non_empty(params.remove("avatar1")).or(image);
        let second_avatar = params.remove("avatar2");
        let first_username = params.remove("username1");
        let second_username = params.remove("username2");

        Self {
            text,
            avatars: present_slots(first_avatar, second_avatar),
            usernames: present_slots(first_username, second_username),
            kwargs: params,
        }
    }

    /// JSON object with optional `text`, `avatars` (or `images`) and `usernames`
    ///
    /// The request must declare a JSON media type.
    pub fn from_json(content_type: Option<&str>, body: &[u8]) -> Result<Self, ApiError> {
        let malformed = || ApiError::BadRequest(MALFORMED_JSON_MESSAGE.to_string());

        if !content_type.is_some_and(is_json_media_type) {
            return Err(malformed());
        }

        let mut object: Map<String, Value> = match serde_json::from_slice(body) {
            Ok(Value::Object(object)) => object,
            _ => return Err(malformed()),
        };

        let text = object.remove("text").map(value_to_string).unwrap_or_default();
        let images = object.remove("images");
        let avatars = object
            .remove("avatars")
            .filter(|value| !value.is_null())
            .or(images)
            .map(string_list)
            .unwrap_or_default();
        let usernames = object.remove("usernames").map(string_list).unwrap_or_default();

        let kwargs = object
            .into_iter()
            .map(|(key, value)| (key, value_to_string(value)))
            .collect();

        Ok(Self {
            text,
            avatars,
            usernames,
            kwargs,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Supplied, non-empty slots in order; a later slot moves up to fill a gap
fn present_slots(first: Option<String>, second: Option<String>) -> Vec<String> {
    [first, second]
        .into_iter()
        .flatten()
        .filter(|value| !value.is_empty())
        .collect()
}

/// `application/json` or any `+json` / `json` subtype, parameters ignored
fn is_json_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.split_once('/') {
        Some((_, subtype)) => subtype == "json" || subtype.ends_with("+json"),
        None => false,
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(value_to_string)
            .collect(),
        Value::Null => Vec::new(),
        single => vec![value_to_string(single)],
    }
}

/// Admission, generation and response assembly for meme endpoints
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    gate: AuthorizationGate,
    limiter: RateLimiter,
    avatars: Arc<dyn AvatarSource>,
    assets: Arc<AssetProvider>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        gate: AuthorizationGate,
        limiter: RateLimiter,
        avatars: Arc<dyn AvatarSource>,
        assets: Arc<AssetProvider>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            registry,
            gate,
            limiter,
            avatars,
            assets,
            reporter,
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn assets(&self) -> &Arc<AssetProvider> {
        &self.assets
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Handle one call to `name`; every outcome is a complete response
    pub async fn handle(&self, name: &str, request: RawRequest) -> HttpResponse {
        match self.dispatch(name, request).await {
            Ok(response) => response,
            Err(e) => e.error_response(),
        }
    }

    async fn dispatch(&self, name: &str, request: RawRequest) -> Result<HttpResponse, ApiError> {
        let endpoint = self
            .registry
            .resolve(name)
            .ok_or_else(|| ApiError::NotFound(name.to_string()))?;

        let envelope = RequestEnvelope::parse(&request)?;
        let key = request.api_key.as_deref();

        if !self.gate.authorize(key).await {
            return Err(ApiError::Unauthorized);
        }
        let key = key.unwrap_or_default();

        if endpoint.restricted && !self.gate.is_privileged(Some(key)) {
            warn!(
                key = %key_fingerprint(key),
                endpoint = %endpoint.name,
                "Restricted endpoint denied"
            );
            return Err(ApiError::Forbidden);
        }

        let decision = self
            .limiter
            .check_and_increment(key, &endpoint.name, endpoint.rate, endpoint.per)
            .await
            .map_err(|e| self.reported(&endpoint, ApiError::Internal(e.to_string())))?;

        if decision.is_rejected() {
            return Err(ApiError::RateLimited(decision));
        }

        let mut response = self.generate(&endpoint, envelope).await?;
        add_rate_limit_headers(&mut response, &decision);
        Ok(response)
    }

    async fn generate(
        &self,
        endpoint: &Arc<Endpoint>,
        envelope: RequestEnvelope,
    ) -> Result<HttpResponse, ApiError> {
        let slots = endpoint.generator.avatar_slots();
        let references: Vec<String> = envelope.avatars.into_iter().take(slots).collect();

        let avatars = fetch_all(self.avatars.as_ref(), &references)
            .await
            .map_err(|e| self.reported(endpoint, ApiError::BadRequest(e.to_string())))?;

        let input = GeneratorInput {
            text: envelope.text,
            avatars,
            usernames: envelope.usernames,
            kwargs: envelope.kwargs,
            assets: self.assets.clone(),
        };

        // CPU-bound; keep it off the async workers
        let generator = endpoint.generator.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let result = generator.generate(&input);
            (result, start.elapsed())
        })
        .await;

        let (result, elapsed) = outcome.map_err(|e| {
            self.reported(endpoint, ApiError::Internal(format!("Generation task failed: {}", e)))
        })?;

        let image = result.map_err(|e| {
            let err = match e {
                GenerationError::MissingParameter(_) => {
                    ApiError::BadRequest(format!("{}{}", e, MISSING_PARAMETER_HINT))
                }
                GenerationError::InvalidInput(msg) => ApiError::BadRequest(msg),
                GenerationError::Internal(msg) => ApiError::Internal(msg),
            };
            self.reported(endpoint, err)
        })?;

        endpoint.stats.record(elapsed);
        info!(
            endpoint = %endpoint.name,
            generation_time_ms = elapsed.as_millis() as u64,
            size_bytes = image.bytes.len(),
            "Meme generated"
        );

        Ok(HttpResponse::Ok()
            .content_type(image.format.content_type())
            .body(image.bytes))
    }

    fn reported(&self, endpoint: &Endpoint, err: ApiError) -> ApiError {
        let status = err.status_code().as_u16();
        self.reporter
            .report(&ErrorEvent::new(&endpoint.name, status, err.to_string()));
        err
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::admission::{RATE_LIMIT_REMAINING, RETRY_AFTER};
    use crate::engine::plugins::{Profile, Slap};
    use crate::engine::{FetchError, Generator, ImageResult};
    use crate::reporting::tests::RecordingReporter;
    use crate::store::{MemoryCounterStore, MemoryKeyStore};
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::path::PathBuf;

    /// Resolves every reference to a small solid image; `bad` references fail
    pub(crate) struct StubAvatars;

    #[async_trait]
    impl AvatarSource for StubAvatars {
        async fn fetch(&self, reference: &str) -> Result<DynamicImage, FetchError> {
            if reference.contains("bad") {
                return Err(FetchError::UnsupportedReference(reference.to_string()));
            }
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                32,
                32,
                Rgba([10, 20, 30, 255]),
            )))
        }
    }

    /// Text-only endpoint that renders a blank PNG
    pub(crate) struct Caption;

    impl Generator for Caption {
        fn params(&self) -> &'static [&'static str] {
            &["text"]
        }

        fn generate(&self, input: &GeneratorInput) -> Result<ImageResult, GenerationError> {
            let text = input.text()?;
            if text == "explode" {
                return Err(GenerationError::Internal("renderer exploded".to_string()));
            }
            ImageResult::png(&DynamicImage::new_rgba8(4, 4))
        }
    }

    pub(crate) struct Harness {
        pub dispatcher: Dispatcher,
        pub counters: Arc<MemoryCounterStore>,
        pub reporter: Arc<RecordingReporter>,
    }

    pub(crate) fn harness() -> Harness {
        let mut registry = EndpointRegistry::new();
        registry.register(Endpoint::new("slap", Slap).with_rate(5, 60)).unwrap();
        registry.register(Endpoint::new("caption", Caption).with_rate(3, 60)).unwrap();
        registry.register(Endpoint::new("profile", Profile).restricted()).unwrap();
        registry.register(Endpoint::new("vip", Caption).restricted()).unwrap();

        let assets = AssetProvider::new(PathBuf::from("/nonexistent"));
        assets.insert_image("petpet/hand.png", DynamicImage::new_rgba8(20, 20));

        let counters = Arc::new(MemoryCounterStore::new());
        let keys = Arc::new(MemoryKeyStore::new(["abc", "xyz", "secret"]));
        let reporter = Arc::new(RecordingReporter::default());

        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            AuthorizationGate::new(keys, Some("secret".to_string())),
            RateLimiter::new(counters.clone()),
            Arc::new(StubAvatars),
            Arc::new(assets),
            reporter.clone(),
        );

        Harness {
            dispatcher,
            counters,
            reporter,
        }
    }

    fn get(key: Option<&str>, query: &str) -> RawRequest {
        RawRequest {
            method: Method::GET,
            api_key: key.map(str::to_string),
            content_type: None,
            query: query.to_string(),
            body: Bytes::new(),
        }
    }

    fn post(key: Option<&str>, content_type: &str, body: &str) -> RawRequest {
        RawRequest {
            method: Method::POST,
            api_key: key.map(str::to_string),
            content_type: Some(content_type.to_string()),
            query: String::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    async fn error_body(response: HttpResponse) -> Value {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn remaining(response: &HttpResponse) -> String {
        response.headers().get(RATE_LIMIT_REMAINING).unwrap().to_str().unwrap().to_string()
    }

    #[test]
    fn test_query_envelope() {
        let envelope = RequestEnvelope::from_query(
            "text=hello%20world&image=http://x/a.png&avatar2=http://x/b.png&username1=bob&color=%23ff0000",
        );
        assert_eq!(envelope.text, "hello world");
        assert_eq!(envelope.avatars, vec!["http://x/a.png", "http://x/b.png"]);
        assert_eq!(envelope.usernames, vec!["bob"]);
        assert_eq!(envelope.kwargs.get("color").map(String::as_str), Some("#ff0000"));
        assert!(!envelope.kwargs.contains_key("image"));

        // avatar1 wins over image
        let envelope = RequestEnvelope::from_query("avatar1=http://x/1.png&image=http://x/i.png");
        assert_eq!(envelope.avatars, vec!["http://x/1.png"]);
    }

    #[test]
    fn test_query_envelope_skips_absent_and_empty_slots() {
        let lone_second = RequestEnvelope::from_query("avatar2=http://x/b.png");
        assert_eq!(lone_second.avatars, vec!["http://x/b.png"]);

        let empty_first = RequestEnvelope::from_query("avatar1=&avatar2=http://x/b.png");
        assert_eq!(empty_first.avatars, vec!["http://x/b.png"]);

        // An empty avatar1 falls back to image
        let fallback = RequestEnvelope::from_query("avatar1=&image=http://x/i.png");
        assert_eq!(fallback.avatars, vec!["http://x/i.png"]);

        let usernames = RequestEnvelope::from_query("username1=&username2=bob");
        assert_eq!(usernames.usernames, vec!["bob"]);

        let blank = RequestEnvelope::from_query("avatar1=&avatar2=");
        assert!(blank.avatars.is_empty());
    }

    #[test]
    fn test_json_envelope() {
        let envelope = RequestEnvelope::from_json(
            Some("application/json"),
            br#"{"text": "hi", "images": ["http://x/a.png"], "usernames": ["bob"], "size": 3, "mode": "dark"}"#,
        )
        .unwrap();
        assert_eq!(envelope.text, "hi");
        assert_eq!(envelope.avatars, vec!["http://x/a.png"]);
        assert_eq!(envelope.usernames, vec!["bob"]);
        assert_eq!(envelope.kwargs.get("size").map(String::as_str), Some("3"));
        assert_eq!(envelope.kwargs.get("mode").map(String::as_str), Some("dark"));

        let preferred = RequestEnvelope::from_json(
            Some("application/json; charset=utf-8"),
            br#"{"avatars": ["http://x/a.png"], "images": ["http://x/b.png"]}"#,
        )
        .unwrap();
        assert_eq!(preferred.avatars, vec!["http://x/a.png"]);
    }

    #[test]
    fn test_json_envelope_rejects_non_json() {
        assert!(matches!(
            RequestEnvelope::from_json(Some("text/plain"), br#"{"text": "hi"}"#),
            Err(ApiError::BadRequest(msg)) if msg == MALFORMED_JSON_MESSAGE
        ));
        assert!(matches!(
            RequestEnvelope::from_json(None, br#"{"text": "hi"}"#),
            Err(ApiError::BadRequest(msg)) if msg == MALFORMED_JSON_MESSAGE
        ));
        assert!(RequestEnvelope::from_json(Some("application/jsonp"), br#"{"text": "hi"}"#).is_err());
        assert!(RequestEnvelope::from_json(Some("application/json"), b"text=hi").is_err());
        assert!(RequestEnvelope::from_json(Some("application/json"), b"[1, 2]").is_err());
    }

    #[actix_web::test]
    async fn test_slap_quota_counts_down_then_rejects() {
        let h = harness();
        let query = "avatar1=http://x/a.png&avatar2=http://x/b.png";

        for expected in ["4", "3", "2", "1", "0"] {
            let response = h.dispatcher.handle("slap", get(Some("abc"), query)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "image/gif");
            assert_eq!(remaining(&response), expected);
        }

        let response = h.dispatcher.handle("slap", get(Some("abc"), query)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response
            .headers()
            .get(RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after <= 60);

        let body = error_body(response).await;
        assert_eq!(body["status"], 429);
        assert_eq!(body["error"], "You are being ratelimited");

        // Another key is unaffected
        let response = h.dispatcher.handle("slap", get(Some("xyz"), query)).await;
        assert_eq!(remaining(&response), "4");
    }

    #[actix_web::test]
    async fn test_unknown_endpoint_is_404_without_auth() {
        let h = harness();
        let response = h.dispatcher.handle("nope", get(None, "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = error_body(response).await;
        assert_eq!(body["error"], "Endpoint nope not found!");
        assert_eq!(h.counters.len(), 0);
    }

    #[actix_web::test]
    async fn test_unknown_endpoint_is_404_when_quota_exhausted() {
        let h = harness();
        let query = "avatar1=http://x/a.png&avatar2=http://x/b.png";
        for _ in 0..6 {
            h.dispatcher.handle("slap", get(Some("abc"), query)).await;
        }
        let exhausted = h.dispatcher.handle("slap", get(Some("abc"), query)).await;
        assert_eq!(exhausted.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = h.dispatcher.handle("nope", get(Some("abc"), "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_body(response).await["status"], 404);
    }

    #[actix_web::test]
    async fn test_privileged_key_passes_restricted_endpoint() {
        let h = harness();
        let response = h.dispatcher.handle("vip", get(Some("secret"), "text=hi")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(remaining(&response), "4");
        assert_eq!(h.counters.len(), 1);

        // A plain key is still refused
        let response = h.dispatcher.handle("vip", get(Some("abc"), "text=hi")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.counters.len(), 1);
    }

    #[actix_web::test]
    async fn test_unauthorized_calls_leave_quota_untouched() {
        let h = harness();

        for key in [None, Some("wrong")] {
            let response = h.dispatcher.handle("caption", get(key, "text=hi")).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = error_body(response).await;
            assert_eq!(body["status"], 401);
        }
        assert_eq!(h.counters.len(), 0);

        let response = h.dispatcher.handle("caption", get(Some("abc"), "text=hi")).await;
        assert_eq!(remaining(&response), "2");
    }

    #[actix_web::test]
    async fn test_restricted_endpoint_requires_privileged_key() {
        let h = harness();
        let response = h
            .dispatcher
            .handle("profile", get(Some("abc"), "avatar1=http://x/a.png&username1=bob"))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_body(response).await["status"], 403);
        assert_eq!(h.counters.len(), 0);
    }

    #[actix_web::test]
    async fn test_post_text_succeeds() {
        let h = harness();
        let response = h
            .dispatcher
            .handle("caption", post(Some("abc"), "application/json", r#"{"text": "hi"}"#))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
        assert_eq!(remaining(&response), "2");

        let endpoint = h.dispatcher.registry().resolve("caption").unwrap();
        assert_eq!(endpoint.stats.hits(), 1);
    }

    #[actix_web::test]
    async fn test_malformed_post_has_no_counter_effect() {
        let h = harness();
        let response = h
            .dispatcher
            .handle("caption", post(Some("abc"), "text/plain", "text=hi"))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await["error"], MALFORMED_JSON_MESSAGE);
        assert_eq!(h.counters.len(), 0);
    }

    #[actix_web::test]
    async fn test_missing_parameter_is_reported_400() {
        let h = harness();
        let response = h.dispatcher.handle("caption", get(Some("abc"), "")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = error_body(response).await;
        assert_eq!(body["error"], "Missing parameter: text. Are you missing a parameter?");

        let events = h.reporter.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, 400);

        // The failed generation still consumed quota
        assert_eq!(h.counters.len(), 1);
    }

    #[actix_web::test]
    async fn test_generator_failure_is_reported_500() {
        let h = harness();
        let response = h.dispatcher.handle("caption", get(Some("abc"), "text=explode")).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = error_body(response).await;
        assert_eq!(body["status"], 500);
        assert_eq!(body["error"], "renderer exploded");
        assert_eq!(h.reporter.events.lock()[0].status, 500);
    }

    #[actix_web::test]
    async fn test_bad_avatar_reference_is_400() {
        let h = harness();
        let response = h
            .dispatcher
            .handle("slap", get(Some("abc"), "avatar1=http://x/bad.png&avatar2=http://x/b.png"))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.reporter.events.lock().len(), 1);
    }

    #[actix_web::test]
    async fn test_repeated_requests_each_consume_one_unit() {
        let h = harness();
        let first = h.dispatcher.handle("caption", get(Some("abc"), "text=same")).await;
        let second = h.dispatcher.handle("caption", get(Some("abc"), "text=same")).await;

        assert_eq!(remaining(&first), "2");
        assert_eq!(remaining(&second), "1");
    }
}
