//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`] — Collection probing, streaming downloads, stop requests
//! - [`tasks`] — Task history queries and manual status updates
//! - [`system`] — Health and OpenAPI

use crate::types::{Task, TaskStatus};
use serde::{Deserialize, Deserializer, Serialize};

mod downloads;
mod system;
mod tasks;

// Re-export all handlers so `routes::function_name` works
pub use downloads::*;
pub use system::*;
pub use tasks::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /check_playlist
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CheckPlaylistRequest {
    /// Collection id or any URL containing one
    pub bvid: String,
}

/// Response body for POST /check_playlist
///
/// Failures are reported in the body (`success: false`) rather than through
/// the HTTP status.
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CheckPlaylistResponse {
    /// Whether the collection could be resolved
    pub success: bool,
    /// Number of parts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Reason for failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Query parameters for GET /download
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// Collection id or any URL containing one
    pub bvid: Option<String>,
    /// Directory under the output base to write into
    pub output_dir: Option<String>,
    /// Rename finished parts to `{output_dir}-{part}.mp3` (`true`/`false`, default false)
    #[serde(default, deserialize_with = "lenient_bool")]
    pub rename: bool,
}

/// Query parameters for GET /task_status
#[derive(Debug, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskQuery {
    /// Task id (`{bvid}_{output_dir}`)
    pub task_id: Option<String>,
}

/// Request body for POST /stop_task
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StopTaskRequest {
    /// Task id (`{bvid}_{output_dir}`)
    pub task_id: String,
}

/// Request body for POST /update_task_status
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct UpdateTaskStatusRequest {
    /// Task id (`{bvid}_{output_dir}`)
    pub task_id: String,
    /// New status
    pub status: TaskStatus,
    /// New progress (0.0 to 100.0); unchanged when absent
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Response body for GET /download_history
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct TaskListResponse {
    /// Tasks that have not completed
    pub tasks: Vec<Task>,
}

/// Acknowledgement for state-changing requests
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SuccessResponse {
    /// Always true; failures use the error envelope
    pub success: bool,
}

impl SuccessResponse {
    pub(crate) fn ok() -> Self {
        Self { success: true }
    }
}

/// Accepts `true`/`false` in any case, plus `1`/`0`; anything else is false
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1"))
}
