//! The editable clip unit: source metadata plus its crop/highlight/segment
//! transform state, with the trim/keyframe coordination that keeps the two
//! models consistent.
//!
//! The coordination rule: after any trim or detrim, a `Permanent` keyframe
//! exists at exactly the current visible start and end frame of every
//! non-empty timeline. That is asserted (`assert_boundary_invariant`), not
//! merely hoped for.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::frames::time_to_frame;
use crate::highlight::{HighlightData, HighlightRegion};
use crate::segment::{SegmentModel, TrimRange};
use crate::timeline::{CropData, Interpolate, KeyframeOrigin, KeyframeTimeline};
use crate::types::{DbId, FrameIndex};

/// Frame tolerance when re-locating a boundary keyframe during detrim.
/// Rounding between time- and frame-space can shift a stored keyframe by a
/// frame; searching exactly would miss it.
const BOUNDARY_SEARCH_TOLERANCE: FrameIndex = 1;

// ---------------------------------------------------------------------------
// Transform document
// ---------------------------------------------------------------------------

/// The persisted transform state of one clip.
///
/// This is the unit serialized into the `clips.transform` JSON column and
/// the unit the composer resolves into export parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub crop: KeyframeTimeline<CropData>,
    pub highlight: Option<KeyframeTimeline<HighlightData>>,
    #[serde(default)]
    pub highlight_regions: Vec<HighlightRegion>,
    pub segments: SegmentModel,
}

impl Transform {
    /// A fresh transform: no keyframes, one full-length segment.
    pub fn new(duration: f64, framerate: f64) -> Self {
        let frame_count = time_to_frame(duration, framerate);
        Self {
            crop: KeyframeTimeline::new(frame_count),
            highlight: None,
            highlight_regions: Vec::new(),
            segments: SegmentModel::new(duration),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkingClip
// ---------------------------------------------------------------------------

/// One editable clip: an immutable source asset reference, probed source
/// metadata, and the live transform state.
///
/// `version` is the copy-on-write snapshot counter: the persistence layer
/// bumps it whenever a render-affecting field changes after the clip has
/// already been rendered once, so in-flight renders keep referencing a
/// stable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingClip {
    pub id: DbId,
    pub asset_id: DbId,
    /// Source duration, seconds.
    pub duration: f64,
    pub framerate: f64,
    /// Source dimensions, pixels.
    pub width: i32,
    pub height: i32,
    pub version: i32,
    pub transform: Transform,
}

impl WorkingClip {
    pub fn new(
        id: DbId,
        asset_id: DbId,
        duration: f64,
        framerate: f64,
        width: i32,
        height: i32,
    ) -> Self {
        Self {
            id,
            asset_id,
            duration,
            framerate,
            width,
            height,
            version: 1,
            transform: Transform::new(duration, framerate),
        }
    }

    /// Last valid frame index of the source.
    pub fn frame_count(&self) -> FrameIndex {
        time_to_frame(self.duration, self.framerate)
    }

    /// Current visible range in frames, after edge trims.
    pub fn visible_frame_range(&self) -> (FrameIndex, FrameIndex) {
        let (start, end) = self.transform.segments.visible_range();
        (
            time_to_frame(start, self.framerate),
            time_to_frame(end, self.framerate),
        )
    }

    pub fn trim_range(&self) -> Option<TrimRange> {
        self.transform.segments.trim_range()
    }

    pub fn effective_duration(&self) -> f64 {
        self.transform.segments.effective_duration()
    }

    // -- Trim coordination ---------------------------------------------------

    /// Flip the trim state of an edge segment, coordinating the crop and
    /// highlight timelines so the boundary invariant holds afterward.
    pub fn toggle_trim(&mut self, index: usize) -> Result<(), CoreError> {
        let seg = *self
            .transform
            .segments
            .segments()
            .get(index)
            .ok_or(CoreError::NotFound {
                entity: "Segment",
                id: index as i64,
            })?;
        let is_first = index == 0;

        if seg.is_trimmed {
            // Untrimming an edge is exactly the detrim operation for it.
            if is_first {
                return self.detrim_start();
            }
            return self.detrim_end();
        }

        if !self.transform.segments.can_trim(index) {
            return Err(CoreError::Validation(format!(
                "Segment {index} is not a trimmable edge segment"
            )));
        }

        // The segment's inner edge becomes the new visible boundary.
        let boundary_time = if is_first { seg.end } else { seg.start };

        coordinate_trim(
            &mut self.transform.crop,
            self.framerate,
            seg.start,
            seg.end,
            boundary_time,
            is_first,
        )?;
        if let Some(hl) = self.transform.highlight.as_mut() {
            coordinate_trim(hl, self.framerate, seg.start, seg.end, boundary_time, is_first)?;
        }

        self.transform.segments.set_trimmed(index, true)?;
        self.ensure_boundaries()?;
        debug_assert!(self.assert_boundary_invariant().is_ok());
        Ok(())
    }

    /// Restore the visible start to `0`, ensuring a `Permanent` keyframe
    /// exists there.
    pub fn detrim_start(&mut self) -> Result<(), CoreError> {
        let old_boundary = {
            let first = self.transform.segments.segments()[0];
            if !first.is_trimmed {
                return Err(CoreError::Conflict("Clip start is not trimmed".into()));
            }
            first.end
        };

        self.transform.segments.set_trimmed(0, false)?;
        self.restore_boundary(0.0, old_boundary)?;
        self.ensure_boundaries()?;
        debug_assert!(self.assert_boundary_invariant().is_ok());
        Ok(())
    }

    /// Restore the visible end to `duration`, ensuring a `Permanent`
    /// keyframe exists there.
    pub fn detrim_end(&mut self) -> Result<(), CoreError> {
        let last_index = self.transform.segments.segments().len() - 1;
        let old_boundary = {
            let last = self.transform.segments.segments()[last_index];
            if !last.is_trimmed {
                return Err(CoreError::Conflict("Clip end is not trimmed".into()));
            }
            last.start
        };

        self.transform.segments.set_trimmed(last_index, false)?;
        self.restore_boundary(self.duration, old_boundary)?;
        self.ensure_boundaries()?;
        debug_assert!(self.assert_boundary_invariant().is_ok());
        Ok(())
    }

    /// Shared detrim tail: re-anchor a `Permanent` keyframe at the restored
    /// boundary and demote the now-interior old boundary keyframe.
    fn restore_boundary(&mut self, restored_time: f64, old_boundary_time: f64) -> Result<(), CoreError> {
        let framerate = self.framerate;
        ensure_permanent_at(&mut self.transform.crop, framerate, restored_time)?;
        demote_to_user(&mut self.transform.crop, framerate, old_boundary_time);
        if let Some(hl) = self.transform.highlight.as_mut() {
            ensure_permanent_at(hl, framerate, restored_time)?;
            demote_to_user(hl, framerate, old_boundary_time);
        }
        Ok(())
    }

    /// Re-anchor `Permanent` keyframes at both visible edges of every
    /// non-empty timeline. Trim coordination establishes the edge it
    /// touched; this covers the opposite edge as well, so the invariant
    /// holds even for timelines that predate proper framing.
    fn ensure_boundaries(&mut self) -> Result<(), CoreError> {
        let (start, end) = self.transform.segments.visible_range();
        let framerate = self.framerate;
        for time in [start, end] {
            ensure_permanent_at(&mut self.transform.crop, framerate, time)?;
            if let Some(hl) = self.transform.highlight.as_mut() {
                ensure_permanent_at(hl, framerate, time)?;
            }
        }
        Ok(())
    }

    /// Verify the boundary invariant: every non-empty timeline carries a
    /// `Permanent` keyframe at the current visible start and end frame.
    pub fn assert_boundary_invariant(&self) -> Result<(), CoreError> {
        let (start, end) = self.visible_frame_range();
        check_invariant(&self.transform.crop, start, end, "crop")?;
        if let Some(hl) = &self.transform.highlight {
            check_invariant(hl, start, end, "highlight")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Coordination helpers (shared across crop and highlight timelines)
// ---------------------------------------------------------------------------

/// The preserve/delete/reinsert sequence run on one timeline when an edge
/// segment transitions from not-trimmed to trimmed.
fn coordinate_trim<T: Interpolate>(
    timeline: &mut KeyframeTimeline<T>,
    framerate: f64,
    seg_start: f64,
    seg_end: f64,
    boundary_time: f64,
    is_first: bool,
) -> Result<(), CoreError> {
    if timeline.is_empty() {
        // Nothing to preserve and nothing the invariant requires.
        return Ok(());
    }

    let boundary_frame = time_to_frame(boundary_time, framerate);
    let seg_start_frame = time_to_frame(seg_start, framerate);
    let seg_end_frame = time_to_frame(seg_end, framerate);
    let far_frame = if is_first { seg_start_frame } else { seg_end_frame };

    // Crop data to preserve, in priority order:
    //   (a) interpolated at the boundary;
    //   (b) interpolated at the segment's far edge;
    //   (c) any keyframe inside the segment (half-frame tolerance covers
    //       rounding at the edges);
    //   (d) interpolated at the boundary again -- on a non-empty timeline
    //       this cannot fail, so a value is always produced.
    let preserved = timeline
        .interpolate(boundary_frame)
        .ok()
        .or_else(|| timeline.interpolate(far_frame).ok())
        .or_else(|| {
            timeline
                .first_in_range(seg_start_frame, seg_end_frame)
                .map(|k| k.data.clone())
        })
        .map_or_else(|| timeline.interpolate(boundary_frame), Ok)?;

    // Drop everything the trim hides. The inner boundary frame itself is
    // re-anchored below, so it is excluded from the deletion window.
    if is_first {
        timeline.delete_range(seg_start_frame, boundary_frame - 1);
    } else {
        timeline.delete_range(boundary_frame + 1, seg_end_frame);
    }

    timeline
        .add_or_update(boundary_frame, preserved, KeyframeOrigin::Permanent)
        .map_err(|e| CoreError::Internal(format!("Boundary keyframe rejected: {e}")))?;
    Ok(())
}

/// Guarantee a `Permanent` keyframe at exactly `time`, re-using nearby data
/// when a keyframe already sits within the search tolerance (rounding can
/// shift stored frames by one).
fn ensure_permanent_at<T: Interpolate>(
    timeline: &mut KeyframeTimeline<T>,
    framerate: f64,
    time: f64,
) -> Result<(), CoreError> {
    if timeline.is_empty() {
        return Ok(());
    }
    let frame = time_to_frame(time, framerate);

    let (data, stale_frame) = match timeline.get_within(frame, BOUNDARY_SEARCH_TOLERANCE) {
        Some(k) if k.frame == frame => (k.data.clone(), None),
        Some(k) => (k.data.clone(), Some(k.frame)),
        None => (
            timeline
                .interpolate(frame)
                .map_err(|e| CoreError::Internal(format!("Boundary interpolation failed: {e}")))?,
            None,
        ),
    };

    if let Some(f) = stale_frame {
        timeline.remove(f);
    }
    timeline
        .add_or_update(frame, data, KeyframeOrigin::Permanent)
        .map_err(|e| CoreError::Internal(format!("Boundary keyframe rejected: {e}")))?;
    Ok(())
}

/// Demote an old boundary keyframe to `User` once it becomes interior.
/// Its data is untouched; only the origin marker changes.
fn demote_to_user<T: Interpolate>(timeline: &mut KeyframeTimeline<T>, framerate: f64, time: f64) {
    let frame = time_to_frame(time, framerate);
    if let Some(k) = timeline.get(frame) {
        if k.origin == KeyframeOrigin::Permanent {
            let data = k.data.clone();
            // add_or_update on an in-range existing frame cannot fail.
            let _ = timeline.add_or_update(frame, data, KeyframeOrigin::User);
        }
    }
}

fn check_invariant<T: Interpolate>(
    timeline: &KeyframeTimeline<T>,
    start: FrameIndex,
    end: FrameIndex,
    name: &str,
) -> Result<(), CoreError> {
    if timeline.is_empty() {
        return Ok(());
    }
    for frame in [start, end] {
        let ok = timeline
            .get(frame)
            .is_some_and(|k| k.origin == KeyframeOrigin::Permanent);
        if !ok {
            return Err(CoreError::Internal(format!(
                "{name} timeline is missing a permanent keyframe at visible frame {frame}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
