//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the bili-archiver REST API using
//! utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the bili-archiver REST API
///
/// Served as JSON at `/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "bili-archiver REST API",
        version = "0.2.0",
        description = "Resumable multi-part audio archiving of Bilibili collections",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local server")
    ),
    paths(
        // Downloads
        crate::api::routes::check_playlist,
        crate::api::routes::download,
        crate::api::routes::stop_task,

        // Tasks
        crate::api::routes::task_status,
        crate::api::routes::download_history,
        crate::api::routes::update_task_status,
        crate::api::routes::latest_task,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(
        schemas(
            // Core types
            crate::types::CollectionId,
            crate::types::TaskId,
            crate::types::Task,
            crate::types::TaskStatus,
            crate::types::PartOutcome,
            crate::types::OutcomeStatus,
            crate::types::TaskSummary,
            crate::types::RunOutcome,

            // Request/response types
            crate::api::routes::CheckPlaylistRequest,
            crate::api::routes::CheckPlaylistResponse,
            crate::api::routes::StopTaskRequest,
            crate::api::routes::UpdateTaskStatusRequest,
            crate::api::routes::TaskListResponse,
            crate::api::routes::SuccessResponse,

            // Error types
            crate::error::ApiError,
            crate::error::ErrorDetail,
        )
    ),
    tags(
        (name = "downloads", description = "Collection probing and streaming downloads"),
        (name = "tasks", description = "Task history"),
        (name = "system", description = "Health and API documentation"),
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_route() {
        let spec = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = spec["paths"].as_object().unwrap();

        for route in [
            "/check_playlist",
            "/download",
            "/stop_task",
            "/task_status",
            "/download_history",
            "/update_task_status",
            "/latest_task",
            "/health",
            "/openapi.json",
        ] {
            assert!(paths.contains_key(route), "missing {route}");
        }
        assert!(spec["components"]["schemas"]["PartOutcome"].is_object());
    }
}
