use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use matchcut_api::background::AutosaveQueue;
use matchcut_api::config::ServerConfig;
use matchcut_api::engine::RenderEngine;
use matchcut_api::router::build_app_router;
use matchcut_api::state::AppState;
use matchcut_api::ws::WsManager;
use matchcut_encoder::FfmpegTranscoder;
use matchcut_events::ProgressHub;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout. Storage lands in a per-test temp dir.
pub fn test_config(storage_root: PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        storage_root,
        encoder_slots: 1,
        render_target_fps: 30.0,
        autosave_debounce_ms: 50,
        stall_window_secs: 120,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery) that production uses. The returned tempdir keeps the
/// storage root alive for the duration of the test.
pub fn build_test_app(pool: PgPool) -> (Router, tempfile::TempDir) {
    let root = tempfile::tempdir().expect("tempdir");
    let config = test_config(root.path().to_path_buf());

    let ws_manager = Arc::new(WsManager::new());
    let progress = Arc::new(ProgressHub::new());
    let engine = Arc::new(RenderEngine::new(
        pool.clone(),
        Arc::clone(&progress),
        Arc::new(FfmpegTranscoder::new()),
        config.storage_root.clone(),
        config.encoder_slots,
        config.render_target_fps,
    ));
    let autosave = AutosaveQueue::new(
        pool.clone(),
        Duration::from_millis(config.autosave_debounce_ms),
    );

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager,
        progress,
        engine,
        autosave,
    };

    (build_app_router(state, &config), root)
}

/// Issue a GET request against the app.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request builds"),
    )
    .await
    .expect("request executes")
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Assert a response carries the standard `{error, code}` error envelope.
#[allow(dead_code)]
pub async fn assert_error_code(response: Response<Body>, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["code"], code);
}
