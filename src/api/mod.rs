//! REST API server module
//!
//! Exposes collection probing, streaming downloads and the task history over
//! HTTP. Download progress is delivered as server-sent events.

use crate::{Archiver, Config, Result};
use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Downloads
/// - `POST /check_playlist` - Count the parts of a collection
/// - `GET /download` - Download a collection, streaming progress as SSE
/// - `POST /stop_task` - Stop a running task between parts
///
/// ## Tasks
/// - `GET /task_status` - Last known state of a task
/// - `GET /download_history` - Tasks that have not completed
/// - `POST /update_task_status` - Overwrite a task's status
/// - `GET /latest_task` - Most recently modified task
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(archiver: Arc<Archiver>, config: Arc<Config>) -> Router {
    let state = AppState::new(archiver, config.clone());

    let router = Router::new()
        // Downloads
        .route("/check_playlist", post(routes::check_playlist))
        .route("/download", get(routes::download))
        .route("/stop_task", post(routes::stop_task))
        // Tasks
        .route("/task_status", get(routes::task_status))
        .route("/download_history", get(routes::download_history))
        .route("/update_task_status", post(routes::update_task_status))
        .route("/latest_task", get(routes::latest_task))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until `shutdown` resolves; in-flight requests (including open
/// download streams) are allowed to finish.
///
/// # Example
///
/// ```no_run
/// use bili_archiver::{Archiver, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let archiver = Arc::new(Archiver::new((*config).clone()).await?);
///
/// bili_archiver::api::start_api_server(archiver, config, bili_archiver::shutdown_signal()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server<F>(
    archiver: Arc<Archiver>,
    config: Arc<Config>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(archiver, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
