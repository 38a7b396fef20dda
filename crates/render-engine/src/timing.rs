//! Render timing: reference time conversion and the per-frame playback clock.
//!
//! During an export the playback clock no longer follows wall time. Each
//! exported frame sets it explicitly, and the audio engine is advanced by the
//! same amount in whole milliseconds. The sub-millisecond remainder (the
//! overhang) is carried into the next frame so audio never drifts from video.

use frameport_common::clock::{effective_fps, FALLBACK_FPS};
use frameport_render_model::{RenderSettings, TimeRange, TimeReference};

use crate::playback::{AudioEngine, PlaybackEngine, TempoMap};

/// Convert a value in `reference` units into seconds.
pub fn reference_time_to_seconds<T: TempoMap + ?Sized>(
    value: f64,
    reference: TimeReference,
    fps: f64,
    tempo: &T,
) -> f64 {
    match reference {
        TimeReference::Bars => tempo.seconds_from_bars(value),
        TimeReference::Seconds => value,
        TimeReference::Frames => value / frames_rate(fps),
    }
}

/// Convert seconds into `reference` units.
pub fn seconds_to_reference_time<T: TempoMap + ?Sized>(
    seconds: f64,
    reference: TimeReference,
    fps: f64,
    tempo: &T,
) -> f64 {
    match reference {
        TimeReference::Bars => tempo.bars_from_seconds(seconds),
        TimeReference::Seconds => seconds,
        TimeReference::Frames => seconds * frames_rate(fps),
    }
}

/// Re-express `value` from one reference unit in another.
pub fn convert_reference_time<T: TempoMap + ?Sized>(
    value: f64,
    old: TimeReference,
    new: TimeReference,
    fps: f64,
    tempo: &T,
) -> f64 {
    if old == new {
        return value;
    }
    let seconds = reference_time_to_seconds(value, old, fps, tempo);
    seconds_to_reference_time(seconds, new, fps, tempo)
}

/// Rescale a frame-based time when the frame rate changes. Identity when
/// either rate is zero.
pub fn convert_fps(time: f64, old_fps: f64, new_fps: f64) -> f64 {
    if old_fps == 0.0 || new_fps == 0.0 {
        return time;
    }
    time / old_fps * new_fps
}

fn frames_rate(fps: f64) -> f64 {
    if fps == 0.0 {
        FALLBACK_FPS
    } else {
        fps
    }
}

/// Number of frames covering the settings' range, rounded to the nearest
/// frame. Never negative.
pub fn count_frames<T: TempoMap + ?Sized>(settings: &RenderSettings, tempo: &T) -> usize {
    let start = reference_time_to_seconds(settings.start, settings.reference, settings.fps, tempo);
    let end = reference_time_to_seconds(settings.end, settings.reference, settings.fps, tempo);
    let frames = ((end - start) * settings.fps).round();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

/// Overwrite `start`/`end` from the playback loop or soundtrack when the
/// range is not custom. Values are written in the settings' own reference.
pub fn apply_time_range<P: PlaybackEngine + ?Sized>(
    range: TimeRange,
    settings: &mut RenderSettings,
    playback: &P,
) {
    let (reference, fps) = (settings.reference, settings.fps);
    let to_reference = |seconds: f64| seconds_to_reference_time(seconds, reference, fps, playback);

    match range {
        TimeRange::Custom => {}
        TimeRange::Loop => {
            let (start_bars, end_bars) = playback.loop_range_bars();
            let start = to_reference(playback.seconds_from_bars(start_bars));
            let end = to_reference(playback.seconds_from_bars(end_bars));
            settings.start = start;
            settings.end = end;
        }
        TimeRange::Soundtrack => {
            let Some(clip) = playback.soundtrack() else {
                tracing::debug!("No soundtrack found, keeping custom range");
                return;
            };
            let start = to_reference(playback.seconds_from_bars(clip.start_bars));
            let end = if clip.end_bars > 0.0 {
                to_reference(playback.seconds_from_bars(clip.end_bars))
            } else {
                to_reference(clip.length_secs)
            };
            settings.start = start;
            settings.end = end;
        }
    }
}

/// Export progress for `frame_index` of `frame_count`, in `0.0..=1.0`.
pub fn progress(frame_index: usize, frame_count: usize) -> f64 {
    if frame_count <= 1 {
        0.0
    } else {
        frame_index as f64 / (frame_count - 1) as f64
    }
}

/// Mutable clock state of one export.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackClockState {
    /// Time not yet committed to the audio engine because of millisecond
    /// granularity.
    pub timing_overhang: f64,
    pub audio_recording: bool,
}

/// Exclusive driver of the playback clock during an export.
///
/// Holds mutable borrows of the playback and audio engines, so nothing else
/// can move the clock while a `RenderTiming` exists. Dropping it releases
/// the clock.
pub struct RenderTiming<'a, P: PlaybackEngine + ?Sized, A: AudioEngine + ?Sized> {
    settings: RenderSettings,
    playback: &'a mut P,
    audio: &'a mut A,
    state: PlaybackClockState,
}

impl<'a, P: PlaybackEngine + ?Sized, A: AudioEngine + ?Sized> RenderTiming<'a, P, A> {
    pub fn new(settings: RenderSettings, playback: &'a mut P, audio: &'a mut A) -> Self {
        Self {
            settings,
            playback,
            audio,
            state: PlaybackClockState::default(),
        }
    }

    fn fps(&self) -> f64 {
        effective_fps(self.settings.fps)
    }

    fn start_secs(&self) -> f64 {
        reference_time_to_seconds(
            self.settings.start,
            self.settings.reference,
            self.settings.fps,
            &*self.playback,
        )
    }

    fn requested_end_secs(&self) -> f64 {
        reference_time_to_seconds(
            self.settings.end,
            self.settings.reference,
            self.settings.fps,
            &*self.playback,
        )
    }

    /// Move the clock to the time of `frame_index` and advance the audio
    /// engine accordingly. Returns the new playback time in seconds.
    ///
    /// The first call of a job switches the clock into rendering mode and
    /// starts audio recording with exactly one frame of delta.
    pub fn set_playback_time_for_frame(&mut self, frame_index: usize, frame_count: usize) -> f64 {
        let fps = self.fps();
        self.playback.set_playback_speed(0.0);
        self.playback.set_frame_speed_factor(fps / FALLBACK_FPS);

        // Ending at start + (n - 1) / fps keeps the frame cadence exact; the
        // last frame lands within one frame of the requested end.
        let start_secs = self.start_secs();
        let end_secs = start_secs + frame_count.saturating_sub(1) as f64 / fps;

        let old_secs = self.playback.time_in_secs();
        let t = progress(frame_index, frame_count);
        let new_secs = start_secs + (end_secs - start_secs) * t;
        self.playback.set_time_in_secs(new_secs);

        let mut delta = (new_secs - old_secs + self.state.timing_overhang).max(0.0);

        if !self.state.audio_recording {
            self.state.timing_overhang = 0.0;
            delta = 1.0 / fps;

            self.playback.set_rendering_to_file(true);
            self.playback.set_playback_speed(1.0);
            self.audio.prepare_recording(fps);

            tracing::debug!(
                start_secs,
                requested_end_secs = self.requested_end_secs(),
                actual_end_secs = start_secs + frame_count as f64 / fps,
                fps,
                "Recording started"
            );
            self.state.audio_recording = true;
        }

        self.playback.update();

        let buffer_ms = (1000.0 * delta).floor();
        self.state.timing_overhang = (delta - buffer_ms / 1000.0).max(0.0);
        self.audio.complete_frame(buffer_ms / 1000.0);

        new_secs
    }

    /// End recording and hand the clock back: time is set to the requested
    /// end and the frame speed factor restored. Safe to call repeatedly.
    pub fn release_playback_time(&mut self) {
        let fps = self.fps();
        if self.state.audio_recording {
            self.audio.end_recording(fps);
        }

        let end_secs = self.requested_end_secs();
        self.playback.set_time_in_secs(end_secs);
        self.playback.set_rendering_to_file(false);
        self.playback.set_playback_speed(0.0);
        self.playback.set_frame_speed_factor(1.0);
        self.playback.update();

        self.state = PlaybackClockState::default();
    }

    pub fn state(&self) -> PlaybackClockState {
        self.state
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn playback(&self) -> &P {
        &*self.playback
    }

    pub fn audio(&self) -> &A {
        &*self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut *self.audio
    }
}

impl<P: PlaybackEngine + ?Sized, A: AudioEngine + ?Sized> Drop for RenderTiming<'_, P, A> {
    fn drop(&mut self) {
        if self.state.audio_recording {
            self.release_playback_time();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{ConstantTempo, ManualPlayback, SoundtrackBounds};

    #[derive(Default)]
    struct RecordingAudio {
        prepared: u32,
        ended: u32,
        committed: Vec<f64>,
    }

    impl AudioEngine for RecordingAudio {
        fn prepare_recording(&mut self, _fps: f64) {
            self.prepared += 1;
        }

        fn end_recording(&mut self, _fps: f64) {
            self.ended += 1;
        }

        fn complete_frame(&mut self, delta_secs: f64) {
            self.committed.push(delta_secs);
        }

        fn last_mixdown_buffer(&mut self, _duration_secs: f64) -> Vec<f32> {
            Vec::new()
        }

        fn channels(&self) -> u16 {
            2
        }

        fn sample_rate(&self) -> u32 {
            48_000
        }
    }

    fn seconds_settings(start: f64, end: f64, fps: f64) -> RenderSettings {
        RenderSettings {
            reference: TimeReference::Seconds,
            start,
            end,
            fps,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_conversions() {
        let tempo = ConstantTempo::new(120.0);
        assert_eq!(reference_time_to_seconds(2.0, TimeReference::Bars, 60.0, &tempo), 4.0);
        assert_eq!(reference_time_to_seconds(90.0, TimeReference::Frames, 30.0, &tempo), 3.0);
        assert_eq!(reference_time_to_seconds(120.0, TimeReference::Frames, 0.0, &tempo), 2.0);
        assert_eq!(seconds_to_reference_time(2.0, TimeReference::Frames, 0.0, &tempo), 120.0);
        assert_eq!(seconds_to_reference_time(1.5, TimeReference::Seconds, 24.0, &tempo), 1.5);
        assert_eq!(
            convert_reference_time(1.0, TimeReference::Bars, TimeReference::Frames, 30.0, &tempo),
            60.0
        );
    }

    #[test]
    fn test_convert_fps() {
        assert_eq!(convert_fps(60.0, 30.0, 60.0), 120.0);
        assert_eq!(convert_fps(60.0, 0.0, 60.0), 60.0);
        assert_eq!(convert_fps(60.0, 30.0, 0.0), 60.0);
    }

    #[test]
    fn test_count_frames_rounds() {
        let tempo = ConstantTempo::default();
        assert_eq!(count_frames(&seconds_settings(0.0, 1.0, 60.0), &tempo), 60);
        assert_eq!(count_frames(&seconds_settings(0.0, 1.009, 60.0), &tempo), 61);
        assert_eq!(count_frames(&seconds_settings(2.0, 1.0, 60.0), &tempo), 0);

        // Four bars at 120 bpm are eight seconds.
        let bars = RenderSettings {
            fps: 30.0,
            ..Default::default()
        };
        assert_eq!(count_frames(&bars, &tempo), 240);
    }

    #[test]
    fn test_progress() {
        assert_eq!(progress(0, 0), 0.0);
        assert_eq!(progress(5, 1), 0.0);
        assert_eq!(progress(0, 3), 0.0);
        assert_eq!(progress(1, 3), 0.5);
        assert_eq!(progress(2, 3), 1.0);
    }

    #[test]
    fn test_frames_are_evenly_spaced_and_end_on_raster() {
        let mut playback = ManualPlayback::default();
        let mut audio = RecordingAudio::default();
        let settings = seconds_settings(1.0, 2.0, 60.0);
        let frame_count = count_frames(&settings, &playback);
        let mut timing = RenderTiming::new(settings, &mut playback, &mut audio);

        let times: Vec<f64> = (0..frame_count)
            .map(|i| timing.set_playback_time_for_frame(i, frame_count))
            .collect();
        assert!((times[0] - 1.0).abs() < 1e-12);
        for pair in times.windows(2) {
            assert!((pair[1] - pair[0] - 1.0 / 60.0).abs() < 1e-9);
        }
        assert!((times[frame_count - 1] - (1.0 + 59.0 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_first_frame_enters_rendering_mode_once() {
        let mut playback = ManualPlayback::default();
        let mut audio = RecordingAudio::default();
        {
            let mut timing =
                RenderTiming::new(seconds_settings(0.0, 1.0, 30.0), &mut playback, &mut audio);
            timing.set_playback_time_for_frame(0, 30);
            timing.set_playback_time_for_frame(1, 30);
            assert!(timing.state().audio_recording);
            assert!(timing.playback().is_rendering_to_file());
            assert_eq!(timing.audio().prepared, 1);
        }
        // Dropped while recording: released.
        assert_eq!(audio.ended, 1);
        assert!(!playback.is_rendering_to_file());
        assert_eq!(playback.frame_speed_factor(), 1.0);
        assert_eq!(playback.time_in_secs(), 1.0);
    }

    #[test]
    fn test_audio_commits_whole_milliseconds_without_drift() {
        let mut playback = ManualPlayback::default();
        let mut audio = RecordingAudio::default();
        let frame_count = 60;
        {
            let mut timing =
                RenderTiming::new(seconds_settings(0.0, 1.0, 60.0), &mut playback, &mut audio);
            for i in 0..frame_count {
                timing.set_playback_time_for_frame(i, frame_count);
                assert!(timing.state().timing_overhang < 0.001 + 1e-12);
            }
        }

        // First frame commits one full frame (16ms), later frames alternate
        // between 16 and 17ms as the overhang accumulates.
        assert_eq!(audio.committed[0], 0.016);
        for committed in &audio.committed {
            let ms = committed * 1000.0;
            assert!((ms - ms.round()).abs() < 1e-6);
            assert!(ms.round() == 16.0 || ms.round() == 17.0);
        }
        let total: f64 = audio.committed.iter().sum();
        // 60 deltas of 1/60 s minus less than one millisecond of overhang.
        assert!((1.0 - total) < 0.001 + 1e-9);
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_release_without_recording_still_restores_clock() {
        let mut playback = ManualPlayback::default();
        let mut audio = RecordingAudio::default();
        {
            let mut timing =
                RenderTiming::new(seconds_settings(0.0, 3.0, 30.0), &mut playback, &mut audio);
            timing.release_playback_time();
            timing.release_playback_time();
        }
        assert_eq!(audio.ended, 0);
        assert_eq!(playback.time_in_secs(), 3.0);
    }

    #[test]
    fn test_apply_loop_range_in_frames() {
        let mut playback = ManualPlayback::new(ConstantTempo::new(120.0));
        playback.loop_range = (1.0, 3.0);
        let mut settings = RenderSettings {
            reference: TimeReference::Frames,
            fps: 30.0,
            ..Default::default()
        };
        apply_time_range(TimeRange::Loop, &mut settings, &playback);
        assert_eq!(settings.start, 60.0);
        assert_eq!(settings.end, 180.0);
    }

    #[test]
    fn test_apply_soundtrack_range_falls_back_to_clip_length() {
        let mut playback = ManualPlayback::new(ConstantTempo::new(120.0));
        playback.soundtrack = Some(SoundtrackBounds {
            start_bars: 0.5,
            end_bars: 0.0,
            length_secs: 10.0,
        });
        let mut settings = seconds_settings(0.0, 1.0, 60.0);
        apply_time_range(TimeRange::Soundtrack, &mut settings, &playback);
        assert_eq!(settings.start, 1.0);
        assert_eq!(settings.end, 10.0);

        let mut custom = seconds_settings(0.0, 1.0, 60.0);
        apply_time_range(TimeRange::Custom, &mut custom, &playback);
        assert_eq!((custom.start, custom.end), (0.0, 1.0));
    }
}
