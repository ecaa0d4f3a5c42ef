//! Frame/time conversion helpers.
//!
//! Editor state is stored frame-indexed so keyframe positions survive
//! repeated edits without floating-point drift; conversion to seconds
//! happens once, at the encoder boundary. These two functions are the only
//! place that conversion lives.

use crate::types::FrameIndex;

/// Convert a 0-based frame index to a timestamp in seconds.
pub fn frame_to_time(frame: FrameIndex, framerate: f64) -> f64 {
    frame as f64 / framerate
}

/// Convert a timestamp in seconds to the nearest frame index.
pub fn time_to_frame(time: f64, framerate: f64) -> FrameIndex {
    (time * framerate).round() as FrameIndex
}

/// Half a frame, in seconds. Used as the tolerance when matching a
/// time-derived position against stored frame indices.
pub fn half_frame_secs(framerate: f64) -> f64 {
    0.5 / framerate
}
