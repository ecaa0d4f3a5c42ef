use std::sync::Arc;

use matchcut_events::ProgressHub;

use crate::background::AutosaveQueue;
use crate::config::ServerConfig;
use crate::engine::RenderEngine;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: matchcut_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Per-job progress hub feeding both push and poll adapters.
    pub progress: Arc<ProgressHub>,
    /// Render job orchestration engine.
    pub engine: Arc<RenderEngine>,
    /// Debounced write-behind queue for editor transform saves.
    pub autosave: AutosaveQueue,
}
