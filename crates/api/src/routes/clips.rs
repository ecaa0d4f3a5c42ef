//! Route definitions for working clips.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::clips;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(clips::create_clip))
        .route("/{id}", get(clips::get_clip).delete(clips::delete_clip))
        .route("/{id}/transform", put(clips::save_transform))
        .route("/{id}/highlight/detections", post(clips::seed_highlight_detections))
}
