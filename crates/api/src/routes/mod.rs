pub mod assets;
pub mod clips;
pub mod exports;
pub mod health;
pub mod jobs;
pub mod render;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                  progress WebSocket (subscribe by job id)
///
/// /assets                              content-addressed upload (POST raw bytes)
/// /assets/{id}                         asset metadata (GET), release (DELETE)
///
/// /clips                               register clip over a stored asset (POST)
/// /clips/{id}                          get (GET), delete (DELETE)
/// /clips/{id}/transform                debounced transform save (PUT)
/// /clips/{id}/highlight/detections     seed highlight keyframes (POST)
///
/// /render                              single-clip render (POST)
/// /render/multi-clip                   multipart multi-clip render (POST)
/// /render/overlay                      highlight overlay pass (POST)
///
/// /jobs                                list render jobs (GET)
/// /jobs/{id}                           job snapshot, poll fallback (GET)
///
/// /exports/{export_id}/asset           final asset of an export (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/assets", assets::router())
        .nest("/clips", clips::router())
        .nest("/render", render::router())
        .nest("/jobs", jobs::router())
        .nest("/exports", exports::router())
}
