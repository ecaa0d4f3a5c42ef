//! Frame-indexed keyframe timeline with piecewise-linear interpolation.
//!
//! The timeline is the storage form of every animated clip property (crop
//! rectangle, highlight ellipse). Keyframes are indexed by frame, never by
//! time: time-based export happens exactly once, at the encoder boundary
//! ([`KeyframeTimeline::export_time_based`]), so repeated edits never
//! accumulate floating-point drift.
//!
//! The timeline itself never auto-heals its boundary keyframes. Callers
//! that delete a range (trim coordination in [`crate::clip`]) are
//! responsible for re-inserting a `Permanent` boundary keyframe afterward.

use serde::{Deserialize, Serialize};

use crate::frames::frame_to_time;
use crate::types::FrameIndex;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimelineError {
    /// `interpolate` was called on a timeline with no keyframes.
    #[error("timeline has no keyframes")]
    NoKeyframes,

    /// A keyframe frame index fell outside the clip's frame range.
    #[error("frame {frame} is outside the clip range 0..={max}")]
    OutOfRange { frame: FrameIndex, max: FrameIndex },
}

// ---------------------------------------------------------------------------
// Keyframe
// ---------------------------------------------------------------------------

/// Who placed a keyframe.
///
/// `Permanent` marks the invariant boundary keyframes that must exist at
/// the first and last visible frame of the clip's current trim window;
/// `User` marks interior edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyframeOrigin {
    Permanent,
    User,
}

/// A single frame-indexed control point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe<T> {
    pub frame: FrameIndex,
    pub data: T,
    pub origin: KeyframeOrigin,
}

/// A keyframe converted to time-based form for the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedKeyframe<T> {
    /// Seconds from the start of the source clip.
    pub time: f64,
    pub data: T,
}

/// Values that can be linearly interpolated between two keyframes.
pub trait Interpolate: Clone {
    /// Blend between `a` (at `t = 0`) and `b` (at `t = 1`).
    fn lerp(a: &Self, b: &Self, t: f64) -> Self;
}

// ---------------------------------------------------------------------------
// Crop data
// ---------------------------------------------------------------------------

/// A rectangular region of interest used to reframe a clip.
///
/// Coordinates are pixels in the source video's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropData {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Interpolate for CropData {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        Self {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            width: a.width + (b.width - a.width) * t,
            height: a.height + (b.height - a.height) * t,
        }
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Ordered set of keyframes over a fixed clip frame range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeTimeline<T> {
    /// Sorted by `frame`, unique frames.
    keyframes: Vec<Keyframe<T>>,
    /// Highest valid frame index (inclusive) for this clip.
    frame_count: FrameIndex,
}

impl<T: Interpolate> KeyframeTimeline<T> {
    /// Create an empty timeline for a clip with `frame_count` frames.
    pub fn new(frame_count: FrameIndex) -> Self {
        Self {
            keyframes: Vec::new(),
            frame_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Highest valid frame index (inclusive).
    pub fn frame_count(&self) -> FrameIndex {
        self.frame_count
    }

    /// All keyframes in frame order.
    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    pub fn first(&self) -> Option<&Keyframe<T>> {
        self.keyframes.first()
    }

    pub fn last(&self) -> Option<&Keyframe<T>> {
        self.keyframes.last()
    }

    /// Insert a keyframe, or replace the data/origin of an existing one at
    /// the same frame.
    pub fn add_or_update(
        &mut self,
        frame: FrameIndex,
        data: T,
        origin: KeyframeOrigin,
    ) -> Result<(), TimelineError> {
        if frame < 0 || frame > self.frame_count {
            return Err(TimelineError::OutOfRange {
                frame,
                max: self.frame_count,
            });
        }

        match self.keyframes.binary_search_by_key(&frame, |k| k.frame) {
            Ok(i) => {
                self.keyframes[i].data = data;
                self.keyframes[i].origin = origin;
            }
            Err(i) => self.keyframes.insert(i, Keyframe { frame, data, origin }),
        }
        Ok(())
    }

    /// Remove the keyframe at exactly `frame`. Returns whether one existed.
    pub fn remove(&mut self, frame: FrameIndex) -> bool {
        match self.keyframes.binary_search_by_key(&frame, |k| k.frame) {
            Ok(i) => {
                self.keyframes.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// The keyframe at exactly `frame`, if any.
    pub fn get(&self, frame: FrameIndex) -> Option<&Keyframe<T>> {
        self.keyframes
            .binary_search_by_key(&frame, |k| k.frame)
            .ok()
            .map(|i| &self.keyframes[i])
    }

    /// The first keyframe whose frame lies within `tolerance` frames of
    /// `frame`. An exact match wins over a near match.
    pub fn get_within(&self, frame: FrameIndex, tolerance: FrameIndex) -> Option<&Keyframe<T>> {
        if let Some(exact) = self.get(frame) {
            return Some(exact);
        }
        self.keyframes
            .iter()
            .find(|k| (k.frame - frame).abs() <= tolerance)
    }

    /// The first keyframe whose frame falls in `[start, end]`.
    pub fn first_in_range(&self, start: FrameIndex, end: FrameIndex) -> Option<&Keyframe<T>> {
        self.keyframes
            .iter()
            .find(|k| k.frame >= start && k.frame <= end)
    }

    /// Piecewise-linear interpolation at `frame`.
    ///
    /// Below the first or above the last keyframe the value clamps to the
    /// nearest endpoint. Fails only on an empty timeline.
    pub fn interpolate(&self, frame: FrameIndex) -> Result<T, TimelineError> {
        let first = self.keyframes.first().ok_or(TimelineError::NoKeyframes)?;
        if frame <= first.frame {
            return Ok(first.data.clone());
        }
        let last = self.keyframes.last().expect("non-empty checked above");
        if frame >= last.frame {
            return Ok(last.data.clone());
        }

        // `frame` lies strictly between first and last: find the bracketing pair.
        let upper = self
            .keyframes
            .iter()
            .position(|k| k.frame >= frame)
            .expect("frame < last.frame");
        let hi = &self.keyframes[upper];
        if hi.frame == frame {
            return Ok(hi.data.clone());
        }
        let lo = &self.keyframes[upper - 1];
        let t = (frame - lo.frame) as f64 / (hi.frame - lo.frame) as f64;
        Ok(T::lerp(&lo.data, &hi.data, t))
    }

    /// Remove every keyframe whose frame lies in `[start_frame, end_frame]`,
    /// `Permanent` ones included. Returns how many were removed.
    ///
    /// Callers are responsible for re-inserting a `Permanent` boundary
    /// keyframe afterward; the timeline never does it for them.
    pub fn delete_range(&mut self, start_frame: FrameIndex, end_frame: FrameIndex) -> usize {
        let before = self.keyframes.len();
        self.keyframes
            .retain(|k| k.frame < start_frame || k.frame > end_frame);
        before - self.keyframes.len()
    }

    /// Convert to time-based keyframes for the encoder.
    pub fn export_time_based(&self, framerate: f64) -> Vec<TimedKeyframe<T>> {
        self.keyframes
            .iter()
            .map(|k| TimedKeyframe {
                time: frame_to_time(k.frame, framerate),
                data: k.data.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn crop(x: f64, w: f64) -> CropData {
        CropData {
            x,
            y: 0.0,
            width: w,
            height: 540.0,
        }
    }

    fn timeline_with(frames: &[(FrameIndex, f64)]) -> KeyframeTimeline<CropData> {
        let mut tl = KeyframeTimeline::new(900);
        for &(f, x) in frames {
            tl.add_or_update(f, crop(x, 960.0), KeyframeOrigin::User)
                .unwrap();
        }
        tl
    }

    // -- add_or_update ---------------------------------------------------------

    #[test]
    fn insert_keeps_frame_order() {
        let tl = timeline_with(&[(300, 30.0), (0, 0.0), (600, 60.0)]);
        let frames: Vec<_> = tl.keyframes().iter().map(|k| k.frame).collect();
        assert_eq!(frames, vec![0, 300, 600]);
    }

    #[test]
    fn update_replaces_data_and_origin() {
        let mut tl = timeline_with(&[(100, 10.0)]);
        tl.add_or_update(100, crop(99.0, 960.0), KeyframeOrigin::Permanent)
            .unwrap();
        assert_eq!(tl.len(), 1);
        let k = tl.get(100).unwrap();
        assert_eq!(k.data.x, 99.0);
        assert_eq!(k.origin, KeyframeOrigin::Permanent);
    }

    #[test]
    fn negative_frame_rejected() {
        let mut tl = KeyframeTimeline::new(900);
        assert_matches!(
            tl.add_or_update(-1, crop(0.0, 960.0), KeyframeOrigin::User),
            Err(TimelineError::OutOfRange { frame: -1, max: 900 })
        );
    }

    #[test]
    fn frame_beyond_clip_rejected() {
        let mut tl = KeyframeTimeline::new(900);
        assert_matches!(
            tl.add_or_update(901, crop(0.0, 960.0), KeyframeOrigin::User),
            Err(TimelineError::OutOfRange { frame: 901, .. })
        );
    }

    // -- interpolate -----------------------------------------------------------

    #[test]
    fn interpolate_empty_signals_no_keyframes() {
        let tl: KeyframeTimeline<CropData> = KeyframeTimeline::new(900);
        assert_matches!(tl.interpolate(0), Err(TimelineError::NoKeyframes));
    }

    #[test]
    fn interpolate_is_linear_between_neighbors() {
        let tl = timeline_with(&[(0, 0.0), (100, 100.0)]);
        assert_eq!(tl.interpolate(25).unwrap().x, 25.0);
        assert_eq!(tl.interpolate(50).unwrap().x, 50.0);
        assert_eq!(tl.interpolate(75).unwrap().x, 75.0);
    }

    #[test]
    fn interpolate_uses_bracketing_pair_not_global_ends() {
        let tl = timeline_with(&[(0, 0.0), (100, 100.0), (200, 0.0)]);
        assert_eq!(tl.interpolate(150).unwrap().x, 50.0);
    }

    #[test]
    fn interpolate_clamps_outside_keyframe_range() {
        let tl = timeline_with(&[(100, 10.0), (200, 20.0)]);
        assert_eq!(tl.interpolate(0).unwrap().x, 10.0);
        assert_eq!(tl.interpolate(900).unwrap().x, 20.0);
    }

    #[test]
    fn interpolate_exact_keyframe_returns_its_data() {
        let tl = timeline_with(&[(0, 0.0), (100, 100.0), (200, 0.0)]);
        assert_eq!(tl.interpolate(100).unwrap().x, 100.0);
    }

    // -- delete_range ----------------------------------------------------------

    #[test]
    fn delete_range_is_inclusive_and_spares_nothing() {
        let mut tl = timeline_with(&[(0, 0.0), (100, 10.0), (200, 20.0), (300, 30.0)]);
        // Permanent keyframes are deleted like any other.
        tl.add_or_update(150, crop(15.0, 960.0), KeyframeOrigin::Permanent)
            .unwrap();
        let removed = tl.delete_range(100, 200);
        assert_eq!(removed, 3);
        let frames: Vec<_> = tl.keyframes().iter().map(|k| k.frame).collect();
        assert_eq!(frames, vec![0, 300]);
    }

    #[test]
    fn delete_range_on_empty_is_zero() {
        let mut tl: KeyframeTimeline<CropData> = KeyframeTimeline::new(900);
        assert_eq!(tl.delete_range(0, 900), 0);
    }

    // -- lookup helpers --------------------------------------------------------

    #[test]
    fn get_within_prefers_exact_match() {
        let mut tl = timeline_with(&[(99, 1.0)]);
        tl.add_or_update(100, crop(2.0, 960.0), KeyframeOrigin::User)
            .unwrap();
        assert_eq!(tl.get_within(100, 2).unwrap().data.x, 2.0);
    }

    #[test]
    fn get_within_finds_near_match() {
        let tl = timeline_with(&[(102, 7.0)]);
        assert_eq!(tl.get_within(100, 2).unwrap().data.x, 7.0);
        assert!(tl.get_within(100, 1).is_none());
    }

    #[test]
    fn first_in_range_scans_inclusively() {
        let tl = timeline_with(&[(50, 5.0), (150, 15.0)]);
        assert_eq!(tl.first_in_range(50, 100).unwrap().frame, 50);
        assert_eq!(tl.first_in_range(51, 150).unwrap().frame, 150);
        assert!(tl.first_in_range(51, 149).is_none());
    }

    // -- export ----------------------------------------------------------------

    #[test]
    fn export_converts_frames_to_seconds() {
        let tl = timeline_with(&[(0, 0.0), (30, 30.0), (45, 45.0)]);
        let timed = tl.export_time_based(30.0);
        let times: Vec<_> = timed.iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 1.5]);
        assert_eq!(timed[1].data.x, 30.0);
    }
}
