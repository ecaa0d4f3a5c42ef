//! Route definitions for the content-addressed asset store.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::assets;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(assets::store_asset))
        .route("/{id}", get(assets::get_asset).delete(assets::release_asset))
}
