//! Custom error types for the API service

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use common::error::StorageError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Message shared by every failed login, whatever the cause
pub const INVALID_CREDENTIALS: &str = "Email and password combination wrong!";

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing, invalid, expired or revoked session token
    #[error("Unauthorized")]
    Unauthorized,

    /// Login with an unknown email or a wrong password
    #[error("{}", INVALID_CREDENTIALS)]
    InvalidCredentials,

    /// Bad request with message
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Catalog entry, user or blob not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflicting state, e.g. an email that is already registered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested byte range lies outside the media object
    #[error("Range not satisfiable for {total} bytes")]
    RangeNotSatisfiable { total: u64 },

    /// Too many login attempts
    #[error("Too many requests")]
    TooManyRequests,

    /// The third-party service rejected the request
    #[error("Upstream rejected the request: {0}")]
    UpstreamRejected(String),

    /// The third-party service failed
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// The third-party service did not answer in time
    #[error("Upstream timeout")]
    UpstreamTimeout,

    /// Feature not configured on this deployment
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,
}

impl ApiError {
    /// Log an unexpected failure and hide its details from the client
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, err);
        ApiError::InternalServerError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) | ApiError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::InvalidCredentials => INVALID_CREDENTIALS.to_string(),
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) | ApiError::Conflict(msg) => {
                msg.clone()
            }
            ApiError::RangeNotSatisfiable { .. } => "Requested range not satisfiable".to_string(),
            ApiError::TooManyRequests => {
                "Too many login attempts, please try again later".to_string()
            }
            ApiError::UpstreamRejected(_) => "Music service rejected the request".to_string(),
            ApiError::Upstream(_) => "Music service unavailable".to_string(),
            ApiError::UpstreamTimeout => "Music service did not respond in time".to_string(),
            ApiError::ServiceUnavailable(msg) => msg.clone(),
            ApiError::InternalServerError => "Internal server error".to_string(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) | StorageError::InvalidName(name) => {
                ApiError::NotFound(format!("Media {} not found", name))
            }
            other => ApiError::internal("Media storage failure", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": { "message": self.message() },
        }));

        let mut response = (status, body).into_response();

        if let ApiError::RangeNotSatisfiable { total } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_errors_render_structured_body() {
        let response = ApiError::NotFound("Video not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({"error": {"message": "Video not found"}})
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = ApiError::internal("Failed to load user", "connection reset").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"error": {"message": "Internal server error"}})
        );
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_carries_total() {
        let response = ApiError::RangeNotSatisfiable { total: 1000 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }

    #[test]
    fn test_missing_blob_maps_to_not_found() {
        let err: ApiError = StorageError::NotFound("flow.mp4".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = StorageError::Backend("throttled".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
