//! HTTP error taxonomy
//!
//! Every failure leaves the service as `{"status": <code>, "error": <message>}`
//! with the status mirrored in the body.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::admission::{RateLimitDecision, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RETRY_AFTER};

pub const UNAUTHORIZED_MESSAGE: &str = "You are not authorized to access this endpoint";
pub const RATE_LIMITED_MESSAGE: &str = "You are being ratelimited";
pub const FORBIDDEN_MESSAGE: &str = "This endpoint is limited to a privileged client";
pub const MALFORMED_JSON_MESSAGE: &str =
    "when submitting a POST request you must provide data in the JSON format";

/// Errors surfaced to API callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Endpoint {0} not found!")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{}", UNAUTHORIZED_MESSAGE)]
    Unauthorized,
    #[error("{}", FORBIDDEN_MESSAGE)]
    Forbidden,
    #[error("{}", RATE_LIMITED_MESSAGE)]
    RateLimited(RateLimitDecision),
    #[error("{0}")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub status: u16,
    pub error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);

        if let ApiError::RateLimited(decision) = self {
            builder
                .insert_header((RATE_LIMIT_LIMIT, decision.limit.to_string()))
                .insert_header((RATE_LIMIT_REMAINING, "0"))
                .insert_header((RATE_LIMIT_RESET, decision.reset.to_string()))
                .insert_header((
                    RETRY_AFTER,
                    decision.retry_after.unwrap_or_default().to_string(),
                ));
        }

        builder.json(ErrorBody {
            status: status.as_u16(),
            error: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_not_found_body_mirrors_status() {
        let response = ApiError::NotFound("nope".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["status"], 404);
        assert_eq!(body["error"], "Endpoint nope not found!");
    }

    #[actix_web::test]
    async fn test_rate_limited_carries_headers() {
        let decision = RateLimitDecision {
            limit: 5,
            remaining: -1,
            reset: 1_700_000_060,
            retry_after: Some(42),
        };
        let response = ApiError::RateLimited(decision).error_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers.get(RATE_LIMIT_LIMIT).unwrap(), "5");
        assert_eq!(headers.get(RATE_LIMIT_REMAINING).unwrap(), "0");
        assert_eq!(headers.get(RATE_LIMIT_RESET).unwrap(), "1700000060");
        assert_eq!(headers.get(RETRY_AFTER).unwrap(), "42");

        let body = body_json(response).await;
        assert_eq!(body["status"], 429);
        assert_eq!(body["error"], RATE_LIMITED_MESSAGE);
    }

    #[actix_web::test]
    async fn test_forbidden_body() {
        let response = ApiError::Forbidden.error_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["status"], 403);
        assert_eq!(body["error"], FORBIDDEN_MESSAGE);
    }

    #[actix_web::test]
    async fn test_unauthorized_message() {
        let body = body_json(ApiError::Unauthorized.error_response()).await;
        assert_eq!(body["status"], 401);
        assert_eq!(body["error"], UNAUTHORIZED_MESSAGE);
    }
}
