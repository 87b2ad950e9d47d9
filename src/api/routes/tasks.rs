//! Task history handlers.

use super::{SuccessResponse, TaskListResponse, TaskQuery, UpdateTaskStatusRequest};
use crate::api::AppState;
use crate::error::{Error, Result};
use crate::types::{Task, TaskId};
use axum::{
    Json,
    extract::{Query, State},
};

/// GET /task_status - Last known state of a task
#[utoipa::path(
    get,
    path = "/task_status",
    tag = "tasks",
    params(TaskQuery),
    responses(
        (status = 200, description = "Task state", body = Task),
        (status = 400, description = "task_id missing", body = crate::error::ApiError),
        (status = 404, description = "Unknown task", body = crate::error::ApiError)
    )
)]
pub async fn task_status(
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Task>> {
    let task_id = query
        .task_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::InvalidRequest("task_id is required".to_string()))?;
    Ok(Json(state.archiver.task_status(&TaskId::from(task_id)).await?))
}

/// GET /download_history - Tasks that have not completed
#[utoipa::path(
    get,
    path = "/download_history",
    tag = "tasks",
    responses(
        (status = 200, description = "Unfinished tasks", body = TaskListResponse)
    )
)]
pub async fn download_history(State(state): State<AppState>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        tasks: state.archiver.unfinished_tasks().await,
    })
}

/// POST /update_task_status - Overwrite a task's status
#[utoipa::path(
    post,
    path = "/update_task_status",
    tag = "tasks",
    request_body = UpdateTaskStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = SuccessResponse),
        (status = 404, description = "Unknown task", body = crate::error::ApiError)
    )
)]
pub async fn update_task_status(
    State(state): State<AppState>,
    Json(request): Json<UpdateTaskStatusRequest>,
) -> Result<Json<SuccessResponse>> {
    state
        .archiver
        .update_task_status(
            &TaskId::from(request.task_id),
            request.status,
            request.progress,
        )
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// GET /latest_task - Most recently modified task
#[utoipa::path(
    get,
    path = "/latest_task",
    tag = "tasks",
    responses(
        (status = 200, description = "Most recently modified task", body = Task),
        (status = 404, description = "No tasks recorded yet", body = crate::error::ApiError)
    )
)]
pub async fn latest_task(State(state): State<AppState>) -> Result<Json<Task>> {
    state
        .archiver
        .latest_task()
        .await
        .map(Json)
        .ok_or_else(|| Error::NotFound("no tasks recorded".to_string()))
}
