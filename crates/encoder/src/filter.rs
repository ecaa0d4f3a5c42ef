//! Maps resolved transform parameters onto concrete ffmpeg arguments.
//!
//! Everything here is pure string construction so the mapping is unit
//! testable. The conventions:
//!
//! - Crop pan/zoom becomes a `crop` filter whose `x`/`y`/`w`/`h` are
//!   piecewise-linear expressions in `t`, built from the clip's time-based
//!   keyframes.
//! - Speed/trim becomes one `trim,setpts` (plus `atrim,atempo`) chain per
//!   visible segment, concatenated.
//! - Every clip is normalized to the target frame rate before multi-clip
//!   assembly so concatenation timestamps stay monotonic.
//! - The highlight pass gates a `geq` luma adjustment on an interpolated
//!   ellipse, enabled only inside the clip's highlight regions.

use std::path::{Path, PathBuf};

use matchcut_core::composer::{ExportableClip, ExportableHighlight, Transition, TransitionKind};
use matchcut_core::highlight::HighlightEffect;
use matchcut_core::timeline::TimedKeyframe;

/// `atempo` accepts factors in [0.5, 2.0]; anything beyond is chained.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// One fully-described encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSpec {
    /// Arguments passed to ffmpeg after the standard progress/banner flags.
    pub args: Vec<String>,
    /// Expected output duration, used to turn `out_time` into a percent.
    pub expected_output_secs: f64,
}

/// Per-clip encode parameters beyond the transform itself.
#[derive(Debug, Clone)]
pub struct ClipEncodeOpts {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Fixed output frame rate (multi-clip assembly requires it).
    pub target_fps: f64,
    pub include_audio: bool,
}

// ---------------------------------------------------------------------------
// Single-clip transform encode
// ---------------------------------------------------------------------------

/// Build the argument list rendering one clip's crop/speed/trim transform.
pub fn clip_encode_args(clip: &ExportableClip, opts: &ClipEncodeOpts) -> EncodeSpec {
    let crop = crop_filter(&clip.crop_keyframes);

    // Visible segments, clipped to the trim range.
    let (vis_start, vis_end) = match clip.trim {
        Some(t) => (t.start, t.end),
        None => (0.0, clip.duration),
    };
    let visible: Vec<(f64, f64, f64)> = clip
        .segments
        .iter()
        .filter_map(|s| {
            let start = s.start.max(vis_start);
            let end = s.end.min(vis_end);
            (end > start).then_some((start, end, s.speed))
        })
        .collect();

    let mut fc = String::new();
    let n = visible.len();

    // Crop in source time, then fan out one branch per visible segment.
    fc.push_str(&format!("[0:v]{crop},split={n}"));
    for i in 0..n {
        fc.push_str(&format!("[c{i}]"));
    }
    fc.push(';');

    for (i, (start, end, speed)) in visible.iter().enumerate() {
        fc.push_str(&format!(
            "[c{i}]trim=start={start}:end={end},setpts=(PTS-STARTPTS)/{speed}[v{i}];",
            start = fmt(*start),
            end = fmt(*end),
            speed = fmt(*speed),
        ));
        if opts.include_audio {
            fc.push_str(&format!(
                "[0:a]atrim=start={start}:end={end},asetpts=PTS-STARTPTS{tempo}[a{i}];",
                start = fmt(*start),
                end = fmt(*end),
                tempo = atempo_chain(*speed),
            ));
        }
    }

    for i in 0..n {
        fc.push_str(&format!("[v{i}]"));
        if opts.include_audio {
            fc.push_str(&format!("[a{i}]"));
        }
    }
    let a = if opts.include_audio { 1 } else { 0 };
    fc.push_str(&format!("concat=n={n}:v=1:a={a}"));
    if opts.include_audio {
        fc.push_str("[vcat][acat];");
    } else {
        fc.push_str("[vcat];");
    }
    fc.push_str(&format!(
        "[vcat]fps={fps},setsar=1[vout]",
        fps = fmt(opts.target_fps)
    ));

    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        opts.input.to_string_lossy().to_string(),
        "-filter_complex".to_string(),
        fc,
        "-map".to_string(),
        "[vout]".to_string(),
    ];
    if opts.include_audio {
        args.push("-map".to_string());
        args.push("[acat]".to_string());
    } else {
        args.push("-an".to_string());
    }
    args.push(opts.output.to_string_lossy().to_string());

    EncodeSpec {
        args,
        expected_output_secs: clip.effective_duration,
    }
}

/// The `crop` filter for a clip's time-based keyframes.
fn crop_filter(keyframes: &[TimedKeyframe<matchcut_core::timeline::CropData>]) -> String {
    let w = piecewise_expr(&points(keyframes, |c| c.width), "t");
    let h = piecewise_expr(&points(keyframes, |c| c.height), "t");
    let x = piecewise_expr(&points(keyframes, |c| c.x), "t");
    let y = piecewise_expr(&points(keyframes, |c| c.y), "t");
    format!("crop=w='{w}':h='{h}':x='{x}':y='{y}'")
}

// ---------------------------------------------------------------------------
// Multi-clip assembly
// ---------------------------------------------------------------------------

/// Build the argument list concatenating pre-normalized clip renders with
/// the requested transition.
///
/// `durations` are the effective output durations of each input, in order;
/// they drive the xfade offsets. All inputs must already share frame rate
/// and dimensions (per-clip normalization guarantees it).
pub fn concat_args(
    inputs: &[PathBuf],
    durations: &[f64],
    output: &Path,
    transition: Transition,
    include_audio: bool,
) -> EncodeSpec {
    debug_assert_eq!(inputs.len(), durations.len());
    let n = inputs.len();

    let mut args = vec!["-y".to_string()];
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
    }

    let expected: f64 = match transition.kind {
        TransitionKind::Cut => durations.iter().sum(),
        // Each crossfaded boundary overlaps the two neighbors.
        _ => durations.iter().sum::<f64>() - transition.duration * (n as f64 - 1.0),
    };

    let fc = match transition.kind {
        TransitionKind::Cut => {
            let mut fc = String::new();
            for i in 0..n {
                fc.push_str(&format!("[{i}:v]"));
                if include_audio {
                    fc.push_str(&format!("[{i}:a]"));
                }
            }
            let a = if include_audio { 1 } else { 0 };
            fc.push_str(&format!("concat=n={n}:v=1:a={a}[vout]"));
            if include_audio {
                fc.push_str("[aout]");
            }
            fc
        }
        kind => xfade_chain(durations, kind, transition.duration, include_audio),
    };

    args.push("-filter_complex".to_string());
    args.push(fc);
    args.push("-map".to_string());
    args.push("[vout]".to_string());
    if include_audio {
        args.push("-map".to_string());
        args.push("[aout]".to_string());
    } else {
        args.push("-an".to_string());
    }
    args.push(output.to_string_lossy().to_string());

    EncodeSpec {
        args,
        expected_output_secs: expected,
    }
}

/// Chained `xfade`/`acrossfade` graph for N inputs.
fn xfade_chain(durations: &[f64], kind: TransitionKind, td: f64, include_audio: bool) -> String {
    let n = durations.len();
    let name = match kind {
        TransitionKind::Crossfade => "fade",
        TransitionKind::Fade => "fadeblack",
        TransitionKind::Cut => unreachable!("cut handled by the concat path"),
    };

    let mut fc = String::new();
    // Running output length of the chain so far; each xfade starts td
    // before the current end.
    let mut chain_len = durations[0];
    for i in 1..n {
        let offset = chain_len - td;
        let prev_v = if i == 1 { "[0:v]".to_string() } else { format!("[vx{}]", i - 1) };
        let out_v = if i == n - 1 { "[vout]".to_string() } else { format!("[vx{i}]") };
        fc.push_str(&format!(
            "{prev_v}[{i}:v]xfade=transition={name}:duration={}:offset={}{out_v};",
            fmt(td),
            fmt(offset),
        ));
        chain_len += durations[i] - td;
    }
    if include_audio {
        for i in 1..n {
            let prev_a = if i == 1 { "[0:a]".to_string() } else { format!("[ax{}]", i - 1) };
            let out_a = if i == n - 1 { "[aout]".to_string() } else { format!("[ax{i}]") };
            fc.push_str(&format!(
                "{prev_a}[{i}:a]acrossfade=d={}{out_a};",
                fmt(td),
            ));
        }
    }
    fc.pop(); // trailing ';'
    fc
}

// ---------------------------------------------------------------------------
// Highlight overlay pass
// ---------------------------------------------------------------------------

/// Build the argument list for the highlight-overlay second pass over an
/// already-rendered working video.
///
/// `Original` performs a stream copy; the other effects gate a luma
/// adjustment on the interpolated ellipse, enabled only inside the
/// highlight regions.
pub fn overlay_args(
    input: &Path,
    output: &Path,
    effect: HighlightEffect,
    highlight: &ExportableHighlight,
    expected_output_secs: f64,
) -> EncodeSpec {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ];

    if effect == HighlightEffect::Original
        || highlight.keyframes.is_empty()
        || highlight.regions.is_empty()
    {
        args.push("-c".to_string());
        args.push("copy".to_string());
    } else {
        // geq exposes time as uppercase T.
        let cx = piecewise_expr(&points(&highlight.keyframes, |h| h.x), "T");
        let cy = piecewise_expr(&points(&highlight.keyframes, |h| h.y), "T");
        let rx = piecewise_expr(&points(&highlight.keyframes, |h| h.radius_x), "T");
        let ry = piecewise_expr(&points(&highlight.keyframes, |h| h.radius_y), "T");
        let inside = format!("lte(pow((X-({cx}))/({rx}),2)+pow((Y-({cy}))/({ry}),2),1)");

        let lum = match effect {
            HighlightEffect::BrightnessBoost => {
                format!("if({inside},min(lum(X,Y)*1.3,255),lum(X,Y))")
            }
            HighlightEffect::DarkOverlay => {
                format!("if({inside},lum(X,Y),lum(X,Y)*0.4)")
            }
            HighlightEffect::Original => unreachable!("handled by the copy path"),
        };

        let enable = highlight
            .regions
            .iter()
            .map(|r| format!("between(t,{},{})", fmt(r.start), fmt(r.end)))
            .collect::<Vec<_>>()
            .join("+");

        args.push("-vf".to_string());
        args.push(format!("geq=lum='{lum}':cb='cb(X,Y)':cr='cr(X,Y)':enable='{enable}'"));
        args.push("-c:a".to_string());
        args.push("copy".to_string());
    }

    args.push(output.to_string_lossy().to_string());
    EncodeSpec {
        args,
        expected_output_secs,
    }
}

// ---------------------------------------------------------------------------
// Expression helpers
// ---------------------------------------------------------------------------

fn points<T, F: Fn(&T) -> f64>(keyframes: &[TimedKeyframe<T>], f: F) -> Vec<(f64, f64)>
where
    T: Clone,
{
    keyframes.iter().map(|k| (k.time, f(&k.data))).collect()
}

/// Piecewise-linear ffmpeg expression over `(time, value)` control points,
/// clamping to the end values outside the keyframed range.
///
/// `var` is the time variable name (`t` in most filters, `T` in `geq`).
fn piecewise_expr(points: &[(f64, f64)], var: &str) -> String {
    match points {
        [] => "0".to_string(),
        [only] => fmt(only.1),
        _ if points.iter().all(|p| p.1 == points[0].1) => fmt(points[0].1),
        _ => {
            // Innermost expression is the final value (clamp above the last
            // keyframe); wrap backwards so earlier spans take precedence.
            let mut expr = fmt(points[points.len() - 1].1);
            for pair in points.windows(2).rev() {
                let (t0, v0) = pair[0];
                let (t1, v1) = pair[1];
                let lerp = format!(
                    "{v0}+({dv})*({var}-{t0})/({dt})",
                    v0 = fmt(v0),
                    dv = fmt(v1 - v0),
                    t0 = fmt(t0),
                    dt = fmt(t1 - t0),
                );
                expr = format!("if(lt({var},{t1}),{lerp},{expr})", t1 = fmt(t1));
            }
            // Clamp below the first keyframe.
            let (t0, v0) = points[0];
            format!("if(lt({var},{t0}),{v0},{expr})", t0 = fmt(t0), v0 = fmt(v0))
        }
    }
}

/// `atempo` filter chain for a playback speed, split into legal factors.
fn atempo_chain(speed: f64) -> String {
    if speed == 1.0 {
        return String::new();
    }
    let mut factors = Vec::new();
    let mut remaining = speed;
    while remaining > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    factors.push(remaining);
    factors
        .iter()
        .map(|f| format!(",atempo={}", fmt(*f)))
        .collect()
}

/// Format a float without trailing-zero noise (`2` not `2.0000`, but keep
/// fractional precision where it exists).
fn fmt(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{v:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
