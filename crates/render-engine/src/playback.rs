//! Collaborators the export pipeline drives: the playback clock, its tempo
//! map, and the audio engine that produces the mix-down.
//!
//! The host application implements these traits. [`ManualPlayback`] is a
//! headless clock with a constant tempo, used by the CLI and by tests.

/// Conversion between musical bars and seconds.
pub trait TempoMap {
    fn seconds_from_bars(&self, bars: f64) -> f64;
    fn bars_from_seconds(&self, seconds: f64) -> f64;
}

/// Bounds of the main soundtrack clip, in bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundtrackBounds {
    pub start_bars: f64,
    /// Zero or negative when the clip has no explicit end.
    pub end_bars: f64,
    pub length_secs: f64,
}

/// The application playback clock.
pub trait PlaybackEngine: TempoMap {
    fn time_in_secs(&self) -> f64;
    fn set_time_in_secs(&mut self, seconds: f64);

    /// Switch the clock into (or out of) offline rendering, where time only
    /// moves when the export sets it.
    fn set_rendering_to_file(&mut self, rendering: bool);
    fn is_rendering_to_file(&self) -> bool;

    fn set_playback_speed(&mut self, speed: f64);

    /// Ratio of the render frame rate to the interactive rate (60 fps).
    fn set_frame_speed_factor(&mut self, factor: f64);

    /// Current loop range as `(start, end)` in bars.
    fn loop_range_bars(&self) -> (f64, f64);

    fn soundtrack(&self) -> Option<SoundtrackBounds>;

    /// Propagate the new time to dependent systems.
    fn update(&mut self);
}

/// The audio engine whose mix-down is captured during export.
pub trait AudioEngine {
    fn prepare_recording(&mut self, fps: f64);
    fn end_recording(&mut self, fps: f64);

    /// Advance the mixer by `delta_secs` worth of samples.
    fn complete_frame(&mut self, delta_secs: f64);

    /// Interleaved samples for the last `duration_secs` of the mix-down.
    fn last_mixdown_buffer(&mut self, duration_secs: f64) -> Vec<f32>;

    fn channels(&self) -> u16;
    fn sample_rate(&self) -> u32;
}

/// A fixed tempo in 4/4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantTempo {
    pub bpm: f64,
}

impl ConstantTempo {
    pub const BEATS_PER_BAR: f64 = 4.0;

    pub fn new(bpm: f64) -> Self {
        Self { bpm }
    }

    fn seconds_per_bar(&self) -> f64 {
        if self.bpm > 0.0 {
            60.0 / self.bpm * Self::BEATS_PER_BAR
        } else {
            0.0
        }
    }
}

impl Default for ConstantTempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl TempoMap for ConstantTempo {
    fn seconds_from_bars(&self, bars: f64) -> f64 {
        bars * self.seconds_per_bar()
    }

    fn bars_from_seconds(&self, seconds: f64) -> f64 {
        let per_bar = self.seconds_per_bar();
        if per_bar > 0.0 {
            seconds / per_bar
        } else {
            0.0
        }
    }
}

/// Headless playback clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualPlayback {
    pub tempo: ConstantTempo,
    pub loop_range: (f64, f64),
    pub soundtrack: Option<SoundtrackBounds>,
    time_in_secs: f64,
    rendering_to_file: bool,
    playback_speed: f64,
    frame_speed_factor: f64,
    updates: u64,
}

impl ManualPlayback {
    pub fn new(tempo: ConstantTempo) -> Self {
        Self {
            tempo,
            loop_range: (0.0, 4.0),
            soundtrack: None,
            time_in_secs: 0.0,
            rendering_to_file: false,
            playback_speed: 0.0,
            frame_speed_factor: 1.0,
            updates: 0,
        }
    }

    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    pub fn frame_speed_factor(&self) -> f64 {
        self.frame_speed_factor
    }

    /// Number of `update` calls so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl Default for ManualPlayback {
    fn default() -> Self {
        Self::new(ConstantTempo::default())
    }
}

impl TempoMap for ManualPlayback {
    fn seconds_from_bars(&self, bars: f64) -> f64 {
        self.tempo.seconds_from_bars(bars)
    }

    fn bars_from_seconds(&self, seconds: f64) -> f64 {
        self.tempo.bars_from_seconds(seconds)
    }
}

impl PlaybackEngine for ManualPlayback {
    fn time_in_secs(&self) -> f64 {
        self.time_in_secs
    }

    fn set_time_in_secs(&mut self, seconds: f64) {
        self.time_in_secs = seconds;
    }

    fn set_rendering_to_file(&mut self, rendering: bool) {
        self.rendering_to_file = rendering;
    }

    fn is_rendering_to_file(&self) -> bool {
        self.rendering_to_file
    }

    fn set_playback_speed(&mut self, speed: f64) {
        self.playback_speed = speed;
    }

    fn set_frame_speed_factor(&mut self, factor: f64) {
        self.frame_speed_factor = factor;
    }

    fn loop_range_bars(&self) -> (f64, f64) {
        self.loop_range
    }

    fn soundtrack(&self) -> Option<SoundtrackBounds> {
        self.soundtrack
    }

    fn update(&mut self) {
        self.updates += 1;
    }
}
