//! Export job: one render from start to finished file.
//!
//! The host calls [`ExportJob::tick`] once per application frame after the
//! scene texture was rendered. Each successful tick emits exactly one video
//! frame and one audio chunk, then moves the playback clock to the next
//! frame. When the encoder falls behind and the frame buffer is full, the
//! tick is skipped and the clock stays where it is.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use frameport_common::{
    human_readable_duration, EncoderConfig, FrameportError, FrameportResult, RenderStopwatch,
};
use frameport_render_model::{RenderMode, RenderSettings, Resolution};
use serde::Serialize;

use crate::codec::{EncodeTarget, PcmFormat};
use crate::encoder::{
    AudioExport, DriverState, EncoderBinary, EncoderDriver, EncoderJobConfig, MuxOutcome,
    PipeBrokenCallback,
};
use crate::frame_buffer::FrameBuffer;
use crate::frame_pool::FramePool;
use crate::paths;
use crate::playback::{AudioEngine, PlaybackEngine};
use crate::readback::{ReadableTexture, ReadbackAdapter};
use crate::timing::{self, RenderTiming};

/// Lifecycle of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Exporting,
    Completed,
    Cancelled,
    Failed,
}

/// Encoder and buffering options for a job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub binary: EncoderBinary,
    pub frame_buffer_capacity: usize,
    pub pooled_frames: usize,
    pub dispose_timeout: Duration,
    pub mux_timeout: Duration,
    pub max_readback_failures: u32,
}

impl JobOptions {
    pub fn from_config(config: &EncoderConfig) -> Self {
        Self {
            binary: EncoderBinary::from_config(config),
            frame_buffer_capacity: config.frame_buffer_capacity,
            pooled_frames: config.pooled_frames,
            dispose_timeout: Duration::from_millis(config.dispose_timeout_ms),
            mux_timeout: Duration::from_millis(config.mux_timeout_ms),
            max_readback_failures: config.max_readback_failures,
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from_config(&EncoderConfig::default())
    }
}

/// Summary of a finished export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub output_path: PathBuf,
    pub mode: RenderMode,
    pub resolution: String,
    pub frame_count: usize,
    /// Frames the encoder actually consumed.
    pub frames_encoded: u64,
    /// Ticks skipped because the encoder was behind.
    pub skipped_ticks: u64,
    pub readback_failures: u64,
    pub started_at: String,
    pub elapsed_secs: f64,
    pub audio: MuxOutcome,
    /// Where the next render would go when auto-increment is on.
    pub next_version_path: Option<PathBuf>,
}

/// A single export from the live scene into a file.
pub struct ExportJob<'a, P: PlaybackEngine + ?Sized, A: AudioEngine + ?Sized> {
    options: JobOptions,
    timing: RenderTiming<'a, P, A>,
    state: JobState,
    status: String,
    frame_index: usize,
    frame_count: usize,
    resolution: Option<Resolution>,
    buffer: Option<Arc<FrameBuffer>>,
    driver: Option<EncoderDriver>,
    readback: Option<ReadbackAdapter>,
    on_pipe_broken: Option<PipeBrokenCallback>,
    consecutive_failures: u32,
    readback_failures: u64,
    skipped_ticks: u64,
    stopwatch: Option<RenderStopwatch>,
    report: Option<ExportReport>,
}

impl<'a, P: PlaybackEngine + ?Sized, A: AudioEngine + ?Sized> ExportJob<'a, P, A> {
    /// Create an idle job. The settings are snapshotted here.
    pub fn new(
        settings: RenderSettings,
        options: JobOptions,
        playback: &'a mut P,
        audio: &'a mut A,
    ) -> Self {
        Self {
            options,
            timing: RenderTiming::new(settings, playback, audio),
            state: JobState::Idle,
            status: "Ready".to_string(),
            frame_index: 0,
            frame_count: 0,
            resolution: None,
            buffer: None,
            driver: None,
            readback: None,
            on_pipe_broken: None,
            consecutive_failures: 0,
            readback_failures: 0,
            skipped_ticks: 0,
            stopwatch: None,
            report: None,
        }
    }

    /// Register a callback fired from the encoder thread if its pipe breaks.
    pub fn set_on_pipe_broken(&mut self, callback: PipeBrokenCallback) {
        self.on_pipe_broken = Some(callback);
    }

    /// Start exporting frames of `texture_size`.
    pub fn start(&mut self, texture_size: Resolution) -> FrameportResult<()> {
        if self.state != JobState::Idle {
            return Err(FrameportError::render("Export is already in progress"));
        }
        match self.start_inner(texture_size) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(error = %err, "Export failed to start");
                self.state = JobState::Failed;
                self.status = err.to_string();
                if let Some(mut driver) = self.driver.take() {
                    let _ = driver.cancel();
                }
                Err(err)
            }
        }
    }

    fn start_inner(&mut self, texture_size: Resolution) -> FrameportResult<()> {
        let settings = self.timing.settings().clone();
        settings
            .validate()
            .map_err(|e| FrameportError::invalid_settings(e.to_string()))?;
        if texture_size.width == 0 || texture_size.height == 0 {
            return Err(FrameportError::invalid_settings(format!(
                "texture size {texture_size} is empty"
            )));
        }

        let frame_count = timing::count_frames(&settings, self.timing.playback()).max(1);

        let audio = if settings.wants_audio() {
            let format = PcmFormat {
                sample_rate: self.timing.audio().sample_rate(),
                channels: self.timing.audio().channels(),
            };
            if format.sample_rate == 0 || format.channels == 0 {
                tracing::warn!(?format, "Audio engine reports no output, exporting without audio");
                None
            } else {
                Some(AudioExport {
                    format,
                    volume: settings.audio_volume,
                })
            }
        } else {
            None
        };

        let config = EncoderJobConfig {
            binary: self.options.binary.clone(),
            target: EncodeTarget::from_settings(&settings),
            resolution: texture_size,
            fps: settings.fps,
            output_path: settings.output_path.clone(),
            audio,
            dispose_timeout: self.options.dispose_timeout,
            mux_timeout: self.options.mux_timeout,
        };

        let buffer = Arc::new(FrameBuffer::new(self.options.frame_buffer_capacity));
        let mut driver = EncoderDriver::new(config, Arc::clone(&buffer));
        if let Some(callback) = &self.on_pipe_broken {
            driver.set_on_pipe_broken(Arc::clone(callback));
        }
        driver.start()?;

        let pool = FramePool::new(texture_size, self.options.pooled_frames);
        self.readback = Some(ReadbackAdapter::new(pool));
        self.buffer = Some(buffer);
        self.driver = Some(driver);
        self.resolution = Some(texture_size);
        self.frame_index = 0;
        self.frame_count = frame_count;
        self.stopwatch = Some(RenderStopwatch::start());

        self.timing.set_playback_time_for_frame(0, frame_count);

        self.state = JobState::Exporting;
        self.status = "Rendering…".to_string();
        tracing::info!(
            frames = frame_count,
            resolution = %texture_size,
            fps = settings.fps,
            output = %settings.output_path.display(),
            "Export started"
        );
        Ok(())
    }

    /// Process one application tick: read back the rendered texture, hand it
    /// to the encoder, capture audio and advance the clock.
    pub fn tick<T: ReadableTexture + ?Sized>(&mut self, texture: &T) -> JobState {
        if self.state != JobState::Exporting {
            return self.state;
        }

        let (Some(driver), Some(buffer), Some(readback)) =
            (self.driver.as_ref(), self.buffer.as_ref(), self.readback.as_ref())
        else {
            self.fail("Export lost its encoder");
            return self.state;
        };

        if driver.is_pipe_broken() || driver.state() == DriverState::Failed {
            let err = FrameportError::pipe_broken("encoder stopped unexpectedly");
            self.fail(&err.to_string());
            return self.state;
        }

        if buffer.is_full() {
            self.skipped_ticks += 1;
            tracing::trace!(frame = self.frame_index, "Frame buffer full, skipping tick");
            return self.state;
        }

        let frame = match readback.read_back(texture) {
            Ok(frame) => {
                self.consecutive_failures = 0;
                frame
            }
            Err(err) if !err.is_recoverable() => {
                self.fail(&format!("Readback failed: {err}"));
                return self.state;
            }
            Err(err) => {
                self.consecutive_failures += 1;
                self.readback_failures += 1;
                tracing::warn!(
                    error = %err,
                    frame = self.frame_index,
                    consecutive = self.consecutive_failures,
                    "Readback failed, retrying next tick"
                );
                if self.consecutive_failures >= self.options.max_readback_failures {
                    self.fail(&format!(
                        "Readback failed {} times in a row: {err}",
                        self.consecutive_failures
                    ));
                }
                return self.state;
            }
        };

        if let Err(err) = buffer.try_enqueue(frame) {
            if err.is_full() {
                self.skipped_ticks += 1;
                return self.state;
            }
            self.fail("Encoder stopped accepting frames");
            return self.state;
        }

        self.capture_audio();

        self.frame_index += 1;
        if self.frame_index >= self.frame_count {
            self.finish();
        } else {
            self.timing
                .set_playback_time_for_frame(self.frame_index, self.frame_count);
        }
        self.state
    }

    fn capture_audio(&mut self) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        if !driver.captures_audio() {
            return;
        }
        let chunk_secs = 1.0 / frameport_common::effective_fps(self.timing.settings().fps);
        let samples = self.timing.audio_mut().last_mixdown_buffer(chunk_secs);
        if let Err(err) = driver.write_audio(&samples) {
            tracing::warn!(error = %err, frame = self.frame_index, "Failed to write audio chunk");
        }
    }

    fn finish(&mut self) {
        self.timing.release_playback_time();

        let (frames_encoded, audio, failure) = match self.driver.take() {
            Some(mut driver) => {
                let dispose_error = driver.dispose().err();
                if let Some(err) = &dispose_error {
                    if err.is_recoverable() {
                        tracing::warn!(error = %err, "Encoder did not shut down cleanly");
                    } else {
                        tracing::error!(error = %err, "Encoder shutdown failed");
                    }
                }
                let failure = if driver.state() == DriverState::Failed {
                    Some("Encoder failed, see log for details".to_string())
                } else if !driver.is_worker_finished() {
                    let reason = dispose_error
                        .map(|err| err.to_string())
                        .unwrap_or_else(|| "encoder worker still running".to_string());
                    Some(format!("Output was not finalized: {reason}"))
                } else {
                    None
                };
                (driver.frames_written(), driver.audio_outcome(), failure)
            }
            None => (
                0,
                MuxOutcome::NotRequested,
                Some("Export lost its encoder".to_string()),
            ),
        };
        self.release_buffers();

        let (elapsed_secs, started_at) = self
            .stopwatch
            .as_ref()
            .map(|sw| (sw.elapsed_secs(), sw.started_wall().to_string()))
            .unwrap_or_default();

        if let Some(message) = failure {
            self.state = JobState::Failed;
            self.status = message;
            tracing::error!(
                frames = self.frame_count,
                frames_encoded,
                status = %self.status,
                "Export failed"
            );
            return;
        }

        let settings = self.timing.settings();
        let next_version_path = if settings.auto_increment_version {
            paths::next_version_for_output(settings.mode, &settings.output_path)
        } else {
            None
        };

        self.report = Some(ExportReport {
            output_path: settings.output_path.clone(),
            mode: settings.mode,
            resolution: self
                .resolution
                .map(|r| r.to_string())
                .unwrap_or_default(),
            frame_count: self.frame_count,
            frames_encoded,
            skipped_ticks: self.skipped_ticks,
            readback_failures: self.readback_failures,
            started_at,
            elapsed_secs,
            audio,
            next_version_path,
        });

        self.state = JobState::Completed;
        self.status = format!("Render finished in {}", human_readable_duration(elapsed_secs));
        tracing::info!(
            frames = self.frame_count,
            frames_encoded,
            skipped_ticks = self.skipped_ticks,
            elapsed_secs,
            "{}",
            self.status
        );
    }

    /// Stop the export. The partial output stays on disk and no audio is
    /// muxed.
    pub fn cancel(&mut self, reason: Option<&str>) {
        if self.state != JobState::Exporting {
            return;
        }
        self.abort(JobState::Cancelled, reason.unwrap_or("Cancelled"));
        tracing::info!(frame = self.frame_index, status = %self.status, "Export cancelled");
    }

    fn fail(&mut self, message: &str) {
        self.abort(JobState::Failed, message);
        tracing::error!(frame = self.frame_index, status = %self.status, "Export failed");
    }

    fn abort(&mut self, state: JobState, message: &str) {
        self.timing.release_playback_time();
        if let Some(mut driver) = self.driver.take() {
            if let Err(err) = driver.cancel() {
                tracing::warn!(error = %err, "Encoder did not shut down cleanly");
            }
        }
        self.release_buffers();
        self.state = state;
        self.status = message.to_string();
    }

    fn release_buffers(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.complete();
            buffer.drain();
        }
        self.readback = None;
    }

    /// Export progress in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.state == JobState::Completed {
            return 1.0;
        }
        timing::progress(self.frame_index, self.frame_count)
    }

    /// Human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_exporting(&self) -> bool {
        self.state == JobState::Exporting
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks
    }

    pub fn settings(&self) -> &RenderSettings {
        self.timing.settings()
    }

    pub fn playback(&self) -> &P {
        self.timing.playback()
    }

    pub fn report(&self) -> Option<&ExportReport> {
        self.report.as_ref()
    }
}

impl<P: PlaybackEngine + ?Sized, A: AudioEngine + ?Sized> Drop for ExportJob<'_, P, A> {
    fn drop(&mut self) {
        if self.state == JobState::Exporting {
            self.cancel(Some("Export dropped"));
        }
    }
}
