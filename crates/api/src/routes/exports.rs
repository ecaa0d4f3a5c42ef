//! Route definitions for export-scoped lookups.

use axum::routing::get;
use axum::Router;

use crate::handlers::render;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/{export_id}/asset", get(render::export_asset))
}
