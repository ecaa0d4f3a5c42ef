//! Parsing of ffmpeg's machine-readable progress output.
//!
//! With `-progress pipe:1 -nostats`, ffmpeg writes `key=value` lines to
//! stdout, one block per progress tick, ending each block with a
//! `progress=continue|end` line. The only keys that matter here are the
//! output timestamp (to compute a percent against the expected output
//! duration) and the end marker.

/// Incremental parser over ffmpeg progress lines.
///
/// Feed it every stdout line; it returns a percent whenever one can be
/// derived. Percents are clamped to 0..=100 and never go backwards, so a
/// consumer can forward them to the progress channel unfiltered.
#[derive(Debug)]
pub struct ProgressParser {
    expected_output_secs: f64,
    last_percent: u8,
}

impl ProgressParser {
    pub fn new(expected_output_secs: f64) -> Self {
        Self {
            expected_output_secs,
            last_percent: 0,
        }
    }

    /// Parse one line of progress output.
    pub fn parse_line(&mut self, line: &str) -> Option<u8> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // out_time_us and out_time_ms both carry microseconds
            // (an old ffmpeg quirk; out_time_ms was never milliseconds).
            "out_time_us" | "out_time_ms" => {
                let micros: i64 = value.parse().ok()?;
                if micros < 0 || self.expected_output_secs <= 0.0 {
                    return None;
                }
                let secs = micros as f64 / 1_000_000.0;
                let percent = ((secs / self.expected_output_secs) * 100.0).floor() as i64;
                self.emit(percent.clamp(0, 99) as u8)
            }
            "progress" if value == "end" => self.emit(100),
            _ => None,
        }
    }

    fn emit(&mut self, percent: u8) -> Option<u8> {
        if percent < self.last_percent {
            return None;
        }
        self.last_percent = percent;
        Some(percent)
    }
}
