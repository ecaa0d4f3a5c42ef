//! WebSocket infrastructure for real-time render progress.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler used by Axum routes. Clients subscribe to individual
//! job streams by sending `{"type": "subscribe", "job_id": N}` after the
//! upgrade; the handler replays the job's event log and then forwards
//! live events until the terminal event.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
