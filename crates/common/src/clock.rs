//! Clock and timing utilities for export jobs.
//!
//! Export jobs run on a virtual playback clock, but users want to know how
//! long a render took in wall-clock terms. This module provides:
//! - A stopwatch anchored at job start
//! - Human-readable duration formatting for status strings
//! - Frame duration helpers with a safe fallback rate

use std::time::{Duration, Instant};

/// Frame rate used whenever a configured rate is zero or invalid.
pub const FALLBACK_FPS: f64 = 60.0;

/// A stopwatch that measures wall-clock time since an export started.
#[derive(Debug, Clone)]
pub struct RenderStopwatch {
    /// The instant the export started.
    started: Instant,

    /// Wall-clock time at start (RFC 3339 string).
    started_wall: String,
}

impl RenderStopwatch {
    /// Start a new stopwatch anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Time elapsed since start.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Seconds elapsed since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Wall-clock time at start.
    pub fn started_wall(&self) -> &str {
        &self.started_wall
    }
}

/// Duration of one frame in seconds, falling back to 60 fps for
/// non-positive or non-finite rates.
pub fn frame_duration_secs(fps: f64) -> f64 {
    1.0 / effective_fps(fps)
}

/// The rate actually used for time arithmetic.
pub fn effective_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_FPS
    }
}

/// Format a duration for status strings: `"850ms"`, `"12.4s"`, `"3m 05s"`,
/// `"1h 02m 03s"`.
pub fn human_readable_duration(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    if secs < 1.0 {
        return format!("{}ms", (secs * 1000.0).round() as u64);
    }
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }

    let total = secs.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}
