//! Route definitions for render requests.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::render;
use crate::state::AppState;

/// Upload ceiling for multi-clip multipart bodies (2 GiB).
const MULTI_CLIP_BODY_LIMIT: usize = 2 * 1024 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(render::render_single))
        .route(
            "/multi-clip",
            post(render::render_multi_clip).layer(DefaultBodyLimit::max(MULTI_CLIP_BODY_LIMIT)),
        )
        .route("/overlay", post(render::render_overlay))
}
