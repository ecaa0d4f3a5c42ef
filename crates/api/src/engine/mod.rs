//! Render job orchestration.
//!
//! [`RenderEngine`] accepts render requests, creates job records, and runs
//! each render as an independent background task bounded by a semaphore
//! sized to the available encoder slots. Progress flows through
//! [`crate::engine::progress`] into both the database row and the
//! [`matchcut_events::ProgressHub`].

pub mod cache;
pub mod progress;
mod renderer;

pub use cache::RenderCache;
pub use renderer::{OverlayRenderRequest, RenderEngine, SingleRenderRequest};
