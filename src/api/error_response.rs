//! HTTP error response handling for the API
//!
//! Converts domain errors to HTTP responses with appropriate status codes
//! and JSON error bodies.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Implement IntoResponse for Error to automatically convert errors to HTTP responses
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

/// Implement IntoResponse for ApiError for explicit error responses
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // errors with a known status go through Error::into_response
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> ApiError {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn not_found_into_response() {
        let response = Error::NotFound("task BV1ab_x".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "not_found");
        assert!(api_error.error.message.contains("BV1ab_x"));
    }

    #[tokio::test]
    async fn already_running_is_conflict() {
        let response = Error::TaskAlreadyRunning("BV1ab_x".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "task_already_running");
    }

    #[tokio::test]
    async fn invalid_collection_is_bad_request() {
        let response = Error::InvalidCollectionId("hello".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn explicit_api_error_is_internal() {
        let api_error: ApiError = Error::Other("boom".to_string()).into();
        assert_eq!(
            api_error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
