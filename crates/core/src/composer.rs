//! Clip composer: resolves editor state into exportable transform
//! parameters, for one clip or for a stitched multi-clip plan.
//!
//! Resolution is the only place frame-indexed storage meets the
//! time-based encoder world, and each clip is converted with *its own*
//! framerate -- never the framerate of whichever clip happens to be
//! selected in the editor.

use serde::{Deserialize, Serialize};

use crate::clip::WorkingClip;
use crate::highlight::{HighlightData, HighlightEffect, HighlightRegion};
use crate::segment::{Segment, TrimRange};
use crate::timeline::{CropData, TimedKeyframe};
use crate::types::DbId;

/// Reserved boundary budget for the default hard-cut transition, seconds.
pub const DEFAULT_TRANSITION_BUDGET_SECS: f64 = 0.5;

// ---------------------------------------------------------------------------
// Export types
// ---------------------------------------------------------------------------

/// How two adjacent clips are joined in a multi-clip export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Cut,
    Crossfade,
    Fade,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub kind: TransitionKind,
    /// Boundary duration budget, seconds.
    pub duration: f64,
}

impl Default for Transition {
    fn default() -> Self {
        Self {
            kind: TransitionKind::Cut,
            duration: DEFAULT_TRANSITION_BUDGET_SECS,
        }
    }
}

/// Highlight parameters carried alongside a clip's export state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportableHighlight {
    pub keyframes: Vec<TimedKeyframe<HighlightData>>,
    pub regions: Vec<HighlightRegion>,
    pub effect: HighlightEffect,
}

/// One clip's fully resolved, time-based transform parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportableClip {
    pub clip_id: DbId,
    pub asset_id: DbId,
    /// Clip version captured at resolve time; drives render-cache keys.
    #[serde(default)]
    pub version: i32,
    pub framerate: f64,
    pub duration: f64,
    pub crop_keyframes: Vec<TimedKeyframe<CropData>>,
    pub segments: Vec<Segment>,
    pub trim: Option<TrimRange>,
    pub effective_duration: f64,
    pub highlight: Option<ExportableHighlight>,
}

/// A clip's placement inside the composed output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipTiming {
    pub clip_id: DbId,
    /// Output time, seconds.
    pub start: f64,
    /// Output time, seconds.
    pub end: f64,
}

/// Everything the orchestrator needs for a multi-clip render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiClipPlan {
    pub clips: Vec<ExportableClip>,
    /// Target output aspect ratio, width over height.
    pub global_aspect_ratio: f64,
    #[serde(default)]
    pub transition: Transition,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve one clip's live edit state into export parameters.
///
/// A clip that was never framed (no crop keyframes) gets a synthesized
/// centered crop derived from its source dimensions and the target aspect
/// ratio, with identical boundary keyframes at `t = 0` and `t = duration`.
pub fn resolve(clip: &WorkingClip, target_aspect: f64) -> ExportableClip {
    let crop_keyframes = if clip.transform.crop.is_empty() {
        let c = default_centered_crop(clip.width, clip.height, target_aspect);
        vec![
            TimedKeyframe { time: 0.0, data: c },
            TimedKeyframe { time: clip.duration, data: c },
        ]
    } else {
        clip.transform.crop.export_time_based(clip.framerate)
    };

    let highlight = clip.transform.highlight.as_ref().map(|hl| ExportableHighlight {
        keyframes: hl.export_time_based(clip.framerate),
        regions: clip.transform.highlight_regions.clone(),
        effect: HighlightEffect::Original,
    });

    ExportableClip {
        clip_id: clip.id,
        asset_id: clip.asset_id,
        version: clip.version,
        framerate: clip.framerate,
        duration: clip.duration,
        crop_keyframes,
        segments: clip.transform.segments.segments().to_vec(),
        trim: clip.trim_range(),
        effective_duration: clip.effective_duration(),
        highlight,
    }
}

/// Resolve every clip of an export, substituting `live` state for the clip
/// currently being edited.
///
/// Guarantee: returns exactly one entry per input clip, in input order. An
/// edit to one clip must never drop its siblings from the export plan.
pub fn resolve_all(
    clips: &[WorkingClip],
    live: Option<&WorkingClip>,
    target_aspect: f64,
) -> Vec<ExportableClip> {
    clips
        .iter()
        .map(|persisted| match live {
            Some(l) if l.id == persisted.id => resolve(l, target_aspect),
            _ => resolve(persisted, target_aspect),
        })
        .collect()
}

/// Cumulative output-timeline placement for a sequence of resolved clips.
pub fn compose_timing(clips: &[ExportableClip]) -> Vec<ClipTiming> {
    let mut cursor = 0.0;
    clips
        .iter()
        .map(|c| {
            let start = cursor;
            cursor += c.effective_duration;
            ClipTiming {
                clip_id: c.clip_id,
                start,
                end: cursor,
            }
        })
        .collect()
}

/// The largest centered crop of the source that matches `target_aspect`
/// (width over height).
pub fn default_centered_crop(source_width: i32, source_height: i32, target_aspect: f64) -> CropData {
    let sw = source_width as f64;
    let sh = source_height as f64;
    let source_aspect = sw / sh;

    let (width, height) = if source_aspect > target_aspect {
        // Source is wider than the target: pillar-crop the sides.
        (sh * target_aspect, sh)
    } else {
        // Source is taller: letter-crop top and bottom.
        (sw, sw / target_aspect)
    };

    CropData {
        x: (sw - width) / 2.0,
        y: (sh - height) / 2.0,
        width,
        height,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::KeyframeOrigin;

    fn working_clip(id: DbId, duration: f64) -> WorkingClip {
        WorkingClip::new(id, id * 10, duration, 30.0, 1920, 1080)
    }

    // -- resolve ----------------------------------------------------------------

    #[test]
    fn unframed_clip_gets_centered_default_crop() {
        let c = working_clip(1, 30.0);
        let resolved = resolve(&c, 9.0 / 16.0);

        assert_eq!(resolved.crop_keyframes.len(), 2);
        assert_eq!(resolved.crop_keyframes[0].time, 0.0);
        assert_eq!(resolved.crop_keyframes[1].time, 30.0);
        assert_eq!(resolved.crop_keyframes[0].data, resolved.crop_keyframes[1].data);

        // 9:16 crop of a 1920x1080 source: full height, 607.5 wide, centered.
        let crop = resolved.crop_keyframes[0].data;
        assert!((crop.height - 1080.0).abs() < 1e-9);
        assert!((crop.width - 607.5).abs() < 1e-9);
        assert!((crop.x - (1920.0 - 607.5) / 2.0).abs() < 1e-9);
        assert_eq!(crop.y, 0.0);
    }

    #[test]
    fn framed_clip_exports_with_its_own_framerate() {
        let mut c = working_clip(1, 30.0);
        c.framerate = 60.0;
        c.transform = crate::clip::Transform::new(30.0, 60.0);
        c.transform
            .crop
            .add_or_update(60, CropData { x: 1.0, y: 2.0, width: 3.0, height: 4.0 }, KeyframeOrigin::User)
            .unwrap();

        let resolved = resolve(&c, 9.0 / 16.0);
        // Frame 60 at 60 fps is t = 1 s (not 2 s, which the editor's 30 fps
        // active clip would produce).
        assert_eq!(resolved.crop_keyframes[0].time, 1.0);
    }

    #[test]
    fn letter_crop_when_source_is_taller_than_target() {
        let crop = default_centered_crop(1080, 1920, 16.0 / 9.0);
        assert!((crop.width - 1080.0).abs() < 1e-9);
        assert!((crop.height - 607.5).abs() < 1e-9);
        assert_eq!(crop.x, 0.0);
        assert!((crop.y - (1920.0 - 607.5) / 2.0).abs() < 1e-9);
    }

    // -- resolve_all --------------------------------------------------------------

    #[test]
    fn resolve_all_returns_every_clip_in_input_order() {
        let clips: Vec<_> = (1..=4).map(|i| working_clip(i, 10.0)).collect();

        // Edit clip 3 in memory: double speed.
        let mut live = clips[2].clone();
        live.transform.segments.set_speed(0, 2.0).unwrap();

        let resolved = resolve_all(&clips, Some(&live), 9.0 / 16.0);

        assert_eq!(resolved.len(), 4, "an edit must never drop sibling clips");
        let ids: Vec<_> = resolved.iter().map(|c| c.clip_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!((resolved[2].effective_duration - 5.0).abs() < 1e-9);
        assert!((resolved[3].effective_duration - 10.0).abs() < 1e-9);
    }

    #[test]
    fn live_state_wins_only_for_the_matching_clip() {
        let clips: Vec<_> = (1..=2).map(|i| working_clip(i, 10.0)).collect();
        let mut live = clips[0].clone();
        live.transform.segments.set_speed(0, 0.5).unwrap();

        let resolved = resolve_all(&clips, Some(&live), 9.0 / 16.0);
        assert!((resolved[0].effective_duration - 20.0).abs() < 1e-9);
        assert!((resolved[1].effective_duration - 10.0).abs() < 1e-9);
    }

    // -- compose_timing -------------------------------------------------------------

    #[test]
    fn cumulative_timing_for_unedited_clips() {
        let clips = vec![working_clip(1, 10.0), working_clip(2, 15.0), working_clip(3, 20.0)];
        let resolved = resolve_all(&clips, None, 9.0 / 16.0);
        let timing = compose_timing(&resolved);

        assert_eq!(timing.len(), 3);
        assert_eq!((timing[0].start, timing[0].end), (0.0, 10.0));
        assert_eq!((timing[1].start, timing[1].end), (10.0, 25.0));
        assert_eq!((timing[2].start, timing[2].end), (25.0, 45.0));
    }

    #[test]
    fn cumulative_timing_respects_edited_effective_durations() {
        let clips = vec![working_clip(1, 10.0), working_clip(2, 15.0), working_clip(3, 20.0)];
        let mut live = clips[1].clone();
        live.transform.segments.set_speed(0, 3.0).unwrap(); // 15 s -> 5 s

        let resolved = resolve_all(&clips, Some(&live), 9.0 / 16.0);
        let timing = compose_timing(&resolved);

        assert_eq!(timing.len(), 3);
        assert_eq!((timing[1].start, timing[1].end), (10.0, 15.0));
        assert_eq!((timing[2].start, timing[2].end), (15.0, 35.0));
    }

    // -- transitions ---------------------------------------------------------------

    #[test]
    fn default_transition_is_a_half_second_cut() {
        let t = Transition::default();
        assert_eq!(t.kind, TransitionKind::Cut);
        assert_eq!(t.duration, 0.5);
    }
}
