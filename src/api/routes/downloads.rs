//! Download handlers: collection probing, streaming downloads, stop requests.

use super::{CheckPlaylistRequest, CheckPlaylistResponse, DownloadQuery, StopTaskRequest, SuccessResponse};
use crate::api::AppState;
use crate::downloader::DownloadRequest;
use crate::error::{Error, Result};
use crate::types::{CollectionId, DownloadEvent, TaskId};
use axum::{
    Json,
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use std::convert::Infallible;
use tokio_stream::{Stream, StreamExt};

/// POST /check_playlist - Count the parts of a collection
#[utoipa::path(
    post,
    path = "/check_playlist",
    tag = "downloads",
    request_body = CheckPlaylistRequest,
    responses(
        (status = 200, description = "Part count, or success=false with the reason", body = CheckPlaylistResponse)
    )
)]
pub async fn check_playlist(
    State(state): State<AppState>,
    Json(request): Json<CheckPlaylistRequest>,
) -> Json<CheckPlaylistResponse> {
    tracing::info!(bvid = %request.bvid, "checking playlist");
    match state.archiver.check_playlist(&request.bvid).await {
        Ok(count) => {
            tracing::info!(count, "playlist checked");
            Json(CheckPlaylistResponse {
                success: true,
                count: Some(count),
                error: None,
            })
        }
        Err(e) => {
            tracing::warn!(bvid = %request.bvid, error = %e, "playlist check failed");
            Json(CheckPlaylistResponse {
                success: false,
                count: None,
                error: Some(e.to_string()),
            })
        }
    }
}

/// GET /download - Download a collection, streaming progress
///
/// Each part event is sent as a `data:` line holding a PartOutcome JSON
/// object. The stream ends with one `event: done` carrying the run summary.
#[utoipa::path(
    get,
    path = "/download",
    tag = "downloads",
    params(DownloadQuery),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
        (status = 400, description = "Missing or invalid parameters", body = crate::error::ApiError),
        (status = 409, description = "Task already running", body = crate::error::ApiError)
    )
)]
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>>> {
    let (Some(bvid), Some(output_dir)) = (query.bvid, query.output_dir) else {
        return Err(Error::InvalidRequest(
            "bvid and output_dir are required".to_string(),
        ));
    };

    let request = DownloadRequest {
        collection: CollectionId::parse(&bvid)?,
        output_dir,
        rename: query.rename,
    };
    let events = state.archiver.start_download(request).await?;

    let sse_stream = events.filter_map(|event| {
        let (name, json) = match &event {
            DownloadEvent::Part(outcome) => (None, serde_json::to_string(outcome)),
            DownloadEvent::Finished(summary) => (Some("done"), serde_json::to_string(summary)),
        };
        match json {
            Ok(data) => {
                let sse = SseEvent::default().data(data);
                Some(Ok(match name {
                    Some(name) => sse.event(name),
                    None => sse,
                }))
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize download event");
                None
            }
        }
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

/// POST /stop_task - Stop a running task between parts
#[utoipa::path(
    post,
    path = "/stop_task",
    tag = "downloads",
    request_body = StopTaskRequest,
    responses(
        (status = 200, description = "Stop requested", body = SuccessResponse),
        (status = 404, description = "No running task with this id", body = crate::error::ApiError)
    )
)]
pub async fn stop_task(
    State(state): State<AppState>,
    Json(request): Json<StopTaskRequest>,
) -> Result<Json<SuccessResponse>> {
    state.archiver.stop_task(&TaskId::from(request.task_id)).await?;
    Ok(Json(SuccessResponse::ok()))
}
