//! External transcoder invocation.
//!
//! The render engine never shells out to ffmpeg directly: it builds an
//! [`EncodeSpec`] from resolved transform parameters ([`filter`]) and hands
//! it to a [`Transcoder`] ([`transcoder`]), which streams percent progress
//! parsed from ffmpeg's machine-readable output ([`progress`]). The trait
//! seam exists so the engine's orchestration logic is testable without an
//! ffmpeg binary on the machine.

pub mod filter;
pub mod progress;
pub mod transcoder;

pub use filter::{clip_encode_args, concat_args, overlay_args, ClipEncodeOpts, EncodeSpec};
pub use progress::ProgressParser;
pub use transcoder::{EncodeError, FfmpegTranscoder, Transcoder};
