//! Segment/speed/trim model: partitions a clip's source timeline into
//! speed-tagged segments with an optional edge trim.
//!
//! Boundaries are cut points in *source* seconds and always include `0`
//! and `duration`. Exactly the first and/or last segment may be trimmed;
//! interior segments can only be split or speed-adjusted. The crop/
//! highlight keyframe coordination that accompanies a trim lives in
//! [`crate::clip`] -- this module owns only the time partition itself.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Two boundaries closer than this are considered the same cut point.
const BOUNDARY_EPSILON: f64 = 1e-6;

/// Playback-speed multipliers outside this range are editor mistakes.
const MIN_SPEED: f64 = 0.05;
const MAX_SPEED: f64 = 100.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A contiguous source-time range with a single playback-speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Source time, seconds.
    pub start: f64,
    /// Source time, seconds.
    pub end: f64,
    /// Playback-speed multiplier: 2.0 plays twice as fast.
    pub speed: f64,
    /// Whether this (edge) segment is excluded from export.
    pub is_trimmed: bool,
}

impl Segment {
    /// Output duration of this segment after the speed multiplier.
    pub fn effective_len(&self) -> f64 {
        (self.end - self.start) / self.speed
    }
}

/// The visible portion of the clip after edge trims.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

/// The full speed/trim partition of one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentModel {
    duration: f64,
    segments: Vec<Segment>,
}

impl SegmentModel {
    /// A fresh model: one full-length segment at normal speed, untrimmed.
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            segments: vec![Segment {
                start: 0.0,
                end: duration,
                speed: 1.0,
                is_trimmed: false,
            }],
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The ordered cut points, always including `0` and `duration`.
    pub fn boundaries(&self) -> Vec<f64> {
        let mut b: Vec<f64> = self.segments.iter().map(|s| s.start).collect();
        b.push(self.duration);
        b
    }

    fn index_of_boundary(&self, at_time: f64) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| (s.start - at_time).abs() < BOUNDARY_EPSILON && s.start > 0.0)
    }

    /// Split the segment containing `at_time` into two at that point.
    ///
    /// Both halves inherit the original's speed; the halves of a trimmed
    /// edge segment stay trimmed only where they remain on the edge, so a
    /// split inside a trimmed segment re-exposes its inner half.
    pub fn split(&mut self, at_time: f64) -> Result<(), CoreError> {
        if at_time <= 0.0 + BOUNDARY_EPSILON || at_time >= self.duration - BOUNDARY_EPSILON {
            return Err(CoreError::Validation(format!(
                "Split point {at_time} must lie strictly inside (0, {})",
                self.duration
            )));
        }
        if self
            .boundaries()
            .iter()
            .any(|b| (b - at_time).abs() < BOUNDARY_EPSILON)
        {
            return Err(CoreError::Conflict(format!(
                "A boundary already exists at {at_time}"
            )));
        }

        let idx = self
            .segments
            .iter()
            .position(|s| at_time > s.start && at_time < s.end)
            .ok_or_else(|| {
                CoreError::Internal(format!("No segment contains split point {at_time}"))
            })?;

        let original = self.segments[idx];
        let is_first = idx == 0;
        let is_last = idx == self.segments.len() - 1;

        let left = Segment {
            start: original.start,
            end: at_time,
            speed: original.speed,
            is_trimmed: original.is_trimmed && is_first,
        };
        let right = Segment {
            start: at_time,
            end: original.end,
            speed: original.speed,
            is_trimmed: original.is_trimmed && is_last && !is_first,
        };

        self.segments[idx] = left;
        self.segments.insert(idx + 1, right);
        Ok(())
    }

    /// Remove the cut point at `at_time`, merging its two neighbors.
    ///
    /// The merged segment keeps the left half's speed and stays trimmed
    /// only if both halves were trimmed.
    pub fn remove_split(&mut self, at_time: f64) -> Result<(), CoreError> {
        let idx = self.index_of_boundary(at_time).ok_or_else(|| {
            CoreError::NotFound {
                entity: "Segment boundary",
                id: at_time as i64,
            }
        })?;

        let right = self.segments.remove(idx);
        let left = &mut self.segments[idx - 1];
        left.end = right.end;
        left.is_trimmed = left.is_trimmed && right.is_trimmed;
        Ok(())
    }

    /// Set the playback-speed multiplier of one segment.
    pub fn set_speed(&mut self, index: usize, multiplier: f64) -> Result<(), CoreError> {
        if !multiplier.is_finite() || multiplier < MIN_SPEED || multiplier > MAX_SPEED {
            return Err(CoreError::Validation(format!(
                "Speed multiplier {multiplier} must be in {MIN_SPEED}..={MAX_SPEED}"
            )));
        }
        let seg = self
            .segments
            .get_mut(index)
            .ok_or(CoreError::NotFound {
                entity: "Segment",
                id: index as i64,
            })?;
        seg.speed = multiplier;
        Ok(())
    }

    /// Whether `index` is allowed to carry a trim flag at all.
    ///
    /// Only the first or last segment may be trimmed, and never a sole
    /// segment (that would empty the visible range).
    pub fn can_trim(&self, index: usize) -> bool {
        self.segments.len() > 1 && (index == 0 || index == self.segments.len() - 1)
    }

    /// Flip the trim flag on an edge segment. Keyframe coordination is the
    /// caller's job ([`crate::clip::WorkingClip::toggle_trim`]).
    pub fn set_trimmed(&mut self, index: usize, trimmed: bool) -> Result<(), CoreError> {
        if index >= self.segments.len() {
            return Err(CoreError::NotFound {
                entity: "Segment",
                id: index as i64,
            });
        }
        if trimmed && !self.can_trim(index) {
            return Err(CoreError::Validation(format!(
                "Segment {index} is not a trimmable edge segment"
            )));
        }
        self.segments[index].is_trimmed = trimmed;
        Ok(())
    }

    /// The visible range after edge trims, or `None` when nothing is trimmed.
    pub fn trim_range(&self) -> Option<TrimRange> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        let start = if first.is_trimmed { first.end } else { 0.0 };
        let end = if last.is_trimmed { last.start } else { self.duration };
        if first.is_trimmed || last.is_trimmed {
            Some(TrimRange { start, end })
        } else {
            None
        }
    }

    /// The visible range, trimmed or not.
    pub fn visible_range(&self) -> (f64, f64) {
        match self.trim_range() {
            Some(t) => (t.start, t.end),
            None => (0.0, self.duration),
        }
    }

    /// Output duration: Σ over segments intersecting the visible range of
    /// the clipped segment length divided by its speed.
    ///
    /// With no trim and no speed changes this degenerates to `duration`.
    pub fn effective_duration(&self) -> f64 {
        let (vis_start, vis_end) = self.visible_range();
        self.segments
            .iter()
            .map(|s| {
                let start = s.start.max(vis_start);
                let end = s.end.min(vis_end);
                if end > start {
                    (end - start) / s.speed
                } else {
                    0.0
                }
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- construction ----------------------------------------------------------

    #[test]
    fn new_model_is_one_full_segment() {
        let m = SegmentModel::new(30.0);
        assert_eq!(m.segments().len(), 1);
        assert_eq!(m.boundaries(), vec![0.0, 30.0]);
        assert_eq!(m.trim_range(), None);
    }

    // -- split / remove_split --------------------------------------------------

    #[test]
    fn split_partitions_and_inherits_speed() {
        let mut m = SegmentModel::new(30.0);
        m.set_speed(0, 2.0).unwrap();
        m.split(10.0).unwrap();
        assert_eq!(m.boundaries(), vec![0.0, 10.0, 30.0]);
        assert_eq!(m.segments()[0].speed, 2.0);
        assert_eq!(m.segments()[1].speed, 2.0);
    }

    #[test]
    fn split_rejects_edges_and_duplicates() {
        let mut m = SegmentModel::new(30.0);
        assert_matches!(m.split(0.0), Err(CoreError::Validation(_)));
        assert_matches!(m.split(30.0), Err(CoreError::Validation(_)));
        m.split(10.0).unwrap();
        assert_matches!(m.split(10.0), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn remove_split_merges_with_left_speed() {
        let mut m = SegmentModel::new(30.0);
        m.split(10.0).unwrap();
        m.set_speed(0, 0.5).unwrap();
        m.set_speed(1, 4.0).unwrap();
        m.remove_split(10.0).unwrap();
        assert_eq!(m.segments().len(), 1);
        assert_eq!(m.segments()[0].speed, 0.5);
    }

    #[test]
    fn remove_split_unknown_boundary_is_not_found() {
        let mut m = SegmentModel::new(30.0);
        m.split(10.0).unwrap();
        assert_matches!(m.remove_split(5.0), Err(CoreError::NotFound { .. }));
    }

    #[test]
    fn split_inside_trimmed_first_segment_keeps_only_outer_half_trimmed() {
        let mut m = SegmentModel::new(30.0);
        m.split(10.0).unwrap();
        m.set_trimmed(0, true).unwrap();
        m.split(5.0).unwrap();
        assert!(m.segments()[0].is_trimmed);
        assert!(!m.segments()[1].is_trimmed);
    }

    // -- speed -----------------------------------------------------------------

    #[test]
    fn set_speed_validates_range() {
        let mut m = SegmentModel::new(10.0);
        assert_matches!(m.set_speed(0, 0.0), Err(CoreError::Validation(_)));
        assert_matches!(m.set_speed(0, -1.0), Err(CoreError::Validation(_)));
        assert_matches!(m.set_speed(0, f64::NAN), Err(CoreError::Validation(_)));
        assert_matches!(m.set_speed(3, 1.0), Err(CoreError::NotFound { .. }));
        assert!(m.set_speed(0, 0.5).is_ok());
    }

    // -- trim flags --------------------------------------------------------------

    #[test]
    fn sole_segment_cannot_be_trimmed() {
        let mut m = SegmentModel::new(10.0);
        assert_matches!(m.set_trimmed(0, true), Err(CoreError::Validation(_)));
    }

    #[test]
    fn interior_segment_cannot_be_trimmed() {
        let mut m = SegmentModel::new(30.0);
        m.split(10.0).unwrap();
        m.split(20.0).unwrap();
        assert_matches!(m.set_trimmed(1, true), Err(CoreError::Validation(_)));
        assert!(m.set_trimmed(0, true).is_ok());
        assert!(m.set_trimmed(2, true).is_ok());
    }

    #[test]
    fn trim_range_derives_from_edge_flags() {
        let mut m = SegmentModel::new(30.0);
        m.split(10.0).unwrap();
        m.split(20.0).unwrap();
        m.set_trimmed(0, true).unwrap();
        assert_eq!(m.trim_range(), Some(TrimRange { start: 10.0, end: 30.0 }));
        m.set_trimmed(2, true).unwrap();
        assert_eq!(m.trim_range(), Some(TrimRange { start: 10.0, end: 20.0 }));
        m.set_trimmed(0, false).unwrap();
        m.set_trimmed(2, false).unwrap();
        assert_eq!(m.trim_range(), None);
    }

    // -- effective duration (spec scenarios) ------------------------------------

    #[test]
    fn effective_duration_no_edits_is_duration() {
        let m = SegmentModel::new(30.0);
        assert!((m.effective_duration() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn effective_duration_trim_only() {
        // duration 30, visible 10..20 -> 10
        let mut m = SegmentModel::new(30.0);
        m.split(10.0).unwrap();
        m.split(20.0).unwrap();
        m.set_trimmed(0, true).unwrap();
        m.set_trimmed(2, true).unwrap();
        assert!((m.effective_duration() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn effective_duration_speed_only() {
        // duration 10, single segment at 0.5x -> 20
        let mut m = SegmentModel::new(10.0);
        m.set_speed(0, 0.5).unwrap();
        assert!((m.effective_duration() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn effective_duration_mixed_speed_and_trim() {
        // visible 5..30; 5..10 at 1x (5s), 10..30 at 2x (10s) -> 15
        let mut m = SegmentModel::new(30.0);
        m.split(5.0).unwrap();
        m.split(10.0).unwrap();
        m.set_trimmed(0, true).unwrap();
        m.set_speed(2, 2.0).unwrap();
        assert!((m.effective_duration() - 15.0).abs() < 1e-9);
    }
}
