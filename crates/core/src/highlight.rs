//! Highlight overlay data: elliptical regions, effect types, and seeding
//! from external detector output.
//!
//! The detector itself (player/object detection) is an external
//! collaborator; this module only consumes its per-frame bounding boxes
//! and stores/interpolates the resulting ellipse keyframes.

use serde::{Deserialize, Serialize};

use crate::timeline::{Interpolate, KeyframeOrigin, KeyframeTimeline, TimelineError};
use crate::types::FrameIndex;

/// Default opacity for detection-seeded highlight keyframes.
const DEFAULT_DETECTION_OPACITY: f64 = 0.85;

/// Default highlight color for detection-seeded keyframes.
const DEFAULT_DETECTION_COLOR: &str = "#ffd400";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// An elliptical highlight region at one keyframe.
///
/// `x`/`y` is the ellipse center in source pixels; `from_detection` records
/// whether the keyframe was seeded by the external detector rather than
/// placed by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightData {
    pub x: f64,
    pub y: f64,
    pub radius_x: f64,
    pub radius_y: f64,
    pub opacity: f64,
    pub color: String,
    #[serde(default)]
    pub from_detection: bool,
}

impl Interpolate for HighlightData {
    fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        Self {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            radius_x: a.radius_x + (b.radius_x - a.radius_x) * t,
            radius_y: a.radius_y + (b.radius_y - a.radius_y) * t,
            opacity: a.opacity + (b.opacity - a.opacity) * t,
            // Color and provenance step at the segment midpoint rather than
            // blending; color-space interpolation is not worth the ambiguity.
            color: if t < 0.5 { a.color.clone() } else { b.color.clone() },
            from_detection: if t < 0.5 { a.from_detection } else { b.from_detection },
        }
    }
}

/// The overlay treatment applied inside enabled highlight regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightEffect {
    /// Brighten the area inside the ellipse.
    BrightnessBoost,
    /// Darken everything outside the ellipse.
    DarkOverlay,
    /// No-op pass-through (render without an effect).
    Original,
}

/// A time range (seconds, source time) within which the highlight overlay
/// is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightRegion {
    pub start: f64,
    pub end: f64,
}

/// One bounding box emitted by the external detector for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub frame: FrameIndex,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

// ---------------------------------------------------------------------------
// Detection seeding
// ---------------------------------------------------------------------------

/// Seed a highlight timeline from detector bounding boxes.
///
/// Each box becomes an ellipse keyframe centered on the box with radii of
/// half its extents, marked `from_detection`. Existing detection-seeded
/// keyframes are replaced wholesale; user-placed keyframes are preserved.
/// Boxes outside the clip's frame range are reported as errors rather than
/// silently skipped.
pub fn seed_from_detections(
    timeline: &mut KeyframeTimeline<HighlightData>,
    boxes: &[DetectionBox],
) -> Result<usize, TimelineError> {
    // Drop prior detection output first so a re-run doesn't accumulate
    // stale ellipses between the new boxes.
    let stale: Vec<FrameIndex> = timeline
        .keyframes()
        .iter()
        .filter(|k| k.data.from_detection)
        .map(|k| k.frame)
        .collect();
    for frame in stale {
        timeline.remove(frame);
    }

    for b in boxes {
        let data = HighlightData {
            x: b.x + b.width / 2.0,
            y: b.y + b.height / 2.0,
            radius_x: b.width / 2.0,
            radius_y: b.height / 2.0,
            opacity: DEFAULT_DETECTION_OPACITY,
            color: DEFAULT_DETECTION_COLOR.to_string(),
            from_detection: true,
        };
        // User-placed keyframes win over detector output at the same frame.
        if timeline
            .get(b.frame)
            .is_some_and(|k| !k.data.from_detection)
        {
            continue;
        }
        timeline.add_or_update(b.frame, data, KeyframeOrigin::User)?;
    }

    Ok(boxes.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ellipse(x: f64, opacity: f64, from_detection: bool) -> HighlightData {
        HighlightData {
            x,
            y: 100.0,
            radius_x: 40.0,
            radius_y: 40.0,
            opacity,
            color: "#ffd400".into(),
            from_detection,
        }
    }

    #[test]
    fn lerp_blends_numeric_fields() {
        let a = ellipse(0.0, 0.0, false);
        let b = ellipse(100.0, 1.0, false);
        let mid = HighlightData::lerp(&a, &b, 0.25);
        assert_eq!(mid.x, 25.0);
        assert_eq!(mid.opacity, 0.25);
    }

    #[test]
    fn lerp_steps_color_at_midpoint() {
        let a = HighlightData { color: "#111111".into(), ..ellipse(0.0, 1.0, false) };
        let b = HighlightData { color: "#222222".into(), ..ellipse(100.0, 1.0, true) };
        assert_eq!(HighlightData::lerp(&a, &b, 0.4).color, "#111111");
        assert_eq!(HighlightData::lerp(&a, &b, 0.6).color, "#222222");
        assert!(HighlightData::lerp(&a, &b, 0.6).from_detection);
    }

    #[test]
    fn seeding_converts_boxes_to_centered_ellipses() {
        let mut tl = KeyframeTimeline::new(900);
        let boxes = [DetectionBox { frame: 30, x: 100.0, y: 200.0, width: 80.0, height: 120.0 }];
        seed_from_detections(&mut tl, &boxes).unwrap();

        let k = tl.get(30).unwrap();
        assert_eq!(k.data.x, 140.0);
        assert_eq!(k.data.y, 260.0);
        assert_eq!(k.data.radius_x, 40.0);
        assert_eq!(k.data.radius_y, 60.0);
        assert!(k.data.from_detection);
    }

    #[test]
    fn reseeding_replaces_prior_detections() {
        let mut tl = KeyframeTimeline::new(900);
        seed_from_detections(
            &mut tl,
            &[DetectionBox { frame: 10, x: 0.0, y: 0.0, width: 10.0, height: 10.0 }],
        )
        .unwrap();
        seed_from_detections(
            &mut tl,
            &[DetectionBox { frame: 20, x: 0.0, y: 0.0, width: 10.0, height: 10.0 }],
        )
        .unwrap();

        assert!(tl.get(10).is_none(), "stale detection keyframe should be gone");
        assert!(tl.get(20).is_some());
    }

    #[test]
    fn seeding_preserves_user_keyframes() {
        let mut tl = KeyframeTimeline::new(900);
        tl.add_or_update(10, ellipse(55.0, 1.0, false), KeyframeOrigin::User)
            .unwrap();
        seed_from_detections(
            &mut tl,
            &[DetectionBox { frame: 10, x: 0.0, y: 0.0, width: 10.0, height: 10.0 }],
        )
        .unwrap();

        let k = tl.get(10).unwrap();
        assert!(!k.data.from_detection);
        assert_eq!(k.data.x, 55.0);
    }

    #[test]
    fn seeding_rejects_out_of_range_boxes() {
        let mut tl = KeyframeTimeline::new(100);
        let result = seed_from_detections(
            &mut tl,
            &[DetectionBox { frame: 500, x: 0.0, y: 0.0, width: 10.0, height: 10.0 }],
        );
        assert!(result.is_err());
    }
}
