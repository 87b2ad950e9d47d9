use super::*;
use crate::downloader::test_helpers::{Fakes, create_test_archiver};
use crate::types::{TaskId, TaskStatus};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use std::time::Duration;
use tower::ServiceExt;


/// Archiver over fakes for a collection of `parts` parts, wrapped in Arc
async fn create_test_app(parts: u32) -> (Router, Arc<Archiver>, tempfile::TempDir) {
    let fakes = Fakes::new(parts);
    let (archiver, temp_dir) = create_test_archiver(&fakes).await;
    let archiver = Arc::new(archiver);
    let app = create_router(archiver.clone(), archiver.config.clone());
    (app, archiver, temp_dir)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Send a request and decode the JSON response body
async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = body_text(response).await;
    let json = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn server_serves_health_and_shuts_down() {
    let fakes = Fakes::new(1);
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;

    let mut config = (*archiver.config).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(start_api_server(
        Arc::new(archiver),
        Arc::new(config),
        async move {
            let _ = stop_rx.await;
        },
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    stop_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop after the shutdown signal")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn cors_headers_follow_config() {
    let fakes = Fakes::new(1);
    let (archiver, _temp_dir) = create_test_archiver(&fakes).await;
    let archiver = Arc::new(archiver);

    let preflight = || {
        Request::builder()
            .method("OPTIONS")
            .uri("/health")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .unwrap()
    };

    let mut config = (*archiver.config).clone();
    config.api.cors_enabled = true;
    let app = create_router(archiver.clone(), Arc::new(config.clone()));
    let response = app.oneshot(preflight()).await.unwrap();
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );

    config.api.cors_enabled = false;
    let app = create_router(archiver, Arc::new(config));
    let response = app.oneshot(preflight()).await.unwrap();
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}
