//! Encoder process driver.
//!
//! Owns one ffmpeg subprocess per export job. Frames are pulled from the
//! shared [`FrameBuffer`] by a background worker and written to the
//! encoder's stdin as raw BGRA. When audio export is on, the first pass
//! writes to a scratch video and the worker runs a second pass that muxes the
//! PCM side file into the final container.
//!
//! ```text
//!  render loop ──try_enqueue──▶ FrameBuffer ──dequeue──▶ worker ──stdin──▶ ffmpeg (pass 1)
//!       │                                                   │
//!       └──write_audio──▶ PcmSideFile ──(dispose)──────────▶ └──▶ ffmpeg (mux pass)
//! ```

use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use frameport_common::{EncoderConfig, FrameportError, FrameportResult};
use frameport_render_model::Resolution;
use tempfile::TempPath;

use crate::audio_file::{PcmFile, PcmSideFile};
use crate::codec::{self, EncodeTarget, PcmFormat};
use crate::frame_buffer::FrameBuffer;

const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long dispose waits for the worker after killing a hung encoder.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Called from the worker thread when the encoder stops accepting frames.
pub type PipeBrokenCallback = Arc<dyn Fn() + Send + Sync>;

/// Encoder executable plus arguments placed before the generated ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderBinary {
    pub program: String,
    pub wrapper_args: Vec<String>,
}

impl EncoderBinary {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            wrapper_args: Vec::new(),
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self {
            program: config.program.to_string_lossy().into_owned(),
            wrapper_args: config.wrapper_args.clone(),
        }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.wrapper_args).args(args);
        cmd
    }
}

impl Default for EncoderBinary {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Whether `<program> -version` runs successfully.
pub fn is_encoder_available(binary: &EncoderBinary) -> bool {
    binary
        .command(&["-version".to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Audio parameters for the mux pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioExport {
    pub format: PcmFormat,
    pub volume: f32,
}

/// Everything the driver needs for one job.
#[derive(Debug, Clone)]
pub struct EncoderJobConfig {
    pub binary: EncoderBinary,
    pub target: EncodeTarget,
    pub resolution: Resolution,
    pub fps: f64,
    /// Final video file, or the `%04d` pattern for image sequences.
    pub output_path: PathBuf,
    /// Present when audio should be captured and muxed (video only).
    pub audio: Option<AudioExport>,
    pub dispose_timeout: Duration,
    pub mux_timeout: Duration,
}

impl EncoderJobConfig {
    pub fn wants_mux(&self) -> bool {
        self.audio.is_some() && self.target.is_video()
    }
}

/// Lifecycle of the driver, readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    Idle = 0,
    Starting = 1,
    StreamingVideo = 2,
    MuxingAudio = 3,
    Done = 4,
    Failed = 5,
}

impl DriverState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Starting,
            2 => Self::StreamingVideo,
            3 => Self::MuxingAudio,
            4 => Self::Done,
            _ => Self::Failed,
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// What happened to the audio track.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "message")]
pub enum MuxOutcome {
    /// Audio was not requested for this job.
    NotRequested,
    Muxed,
    /// The PCM side file was empty; the video was kept without audio.
    SkippedEmptyAudio,
    /// The job was cancelled before the mux pass.
    Cancelled,
    /// The mux pass failed; the video was kept without audio.
    Failed(String),
}

struct Shared {
    state: AtomicU8,
    pipe_broken: AtomicBool,
    skip_mux: AtomicBool,
    frames_written: AtomicU64,
    /// Non-zero once dispose gave up waiting, in milliseconds.
    timed_out_ms: AtomicU64,
    child: Mutex<Option<Child>>,
    mux_outcome: Mutex<Option<MuxOutcome>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(DriverState::Idle as u8),
            pipe_broken: AtomicBool::new(false),
            skip_mux: AtomicBool::new(false),
            frames_written: AtomicU64::new(0),
            timed_out_ms: AtomicU64::new(0),
            child: Mutex::new(None),
            mux_outcome: Mutex::new(None),
        }
    }

    fn set_state(&self, state: DriverState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn state(&self) -> DriverState {
        DriverState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn timed_out_ms(&self) -> Option<u64> {
        match self.timed_out_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(ms),
        }
    }

    fn set_mux_outcome(&self, outcome: MuxOutcome) {
        *self
            .mux_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome);
    }

    fn track_child(&self, child: Child) {
        *self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(child);
    }

    /// Wait for the tracked child to exit. Returns `None` if the child could
    /// not be waited on.
    fn wait_child(&self) -> Option<ExitStatus> {
        loop {
            {
                let mut guard = self
                    .child
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let child = guard.as_mut()?;
                match child.try_wait() {
                    Ok(Some(status)) => {
                        guard.take();
                        return Some(status);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to wait on encoder");
                        guard.take();
                        return None;
                    }
                }
            }
            std::thread::sleep(CHILD_POLL_INTERVAL);
        }
    }

    fn kill_child(&self) -> bool {
        let mut guard = self
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_mut() {
            Some(child) => match child.kill() {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to kill encoder");
                    false
                }
            },
            None => false,
        }
    }
}

/// Drives one encoder subprocess for the duration of an export job.
pub struct EncoderDriver {
    config: EncoderJobConfig,
    buffer: Arc<FrameBuffer>,
    shared: Arc<Shared>,
    on_pipe_broken: Option<PipeBrokenCallback>,
    audio: Option<PcmSideFile>,
    audio_handoff: Option<Sender<Option<PcmFile>>>,
    done: Option<Receiver<()>>,
    worker: Option<JoinHandle<()>>,
    disposed: bool,
}

impl EncoderDriver {
    pub fn new(config: EncoderJobConfig, buffer: Arc<FrameBuffer>) -> Self {
        Self {
            config,
            buffer,
            shared: Arc::new(Shared::new()),
            on_pipe_broken: None,
            audio: None,
            audio_handoff: None,
            done: None,
            worker: None,
            disposed: false,
        }
    }

    /// Register a callback fired once when the encoder pipe breaks. Must be
    /// set before [`start`](Self::start).
    pub fn set_on_pipe_broken(&mut self, callback: PipeBrokenCallback) {
        self.on_pipe_broken = Some(callback);
    }

    /// Prepare the output location, spawn the encoder and start streaming.
    pub fn start(&mut self) -> FrameportResult<()> {
        if self.state() != DriverState::Idle {
            return Err(FrameportError::render("Encoder driver was already started"));
        }
        self.shared.set_state(DriverState::Starting);
        let result = self.start_inner();
        if result.is_err() {
            self.shared.kill_child();
            self.shared.set_state(DriverState::Failed);
            self.buffer.complete();
        }
        result
    }

    fn start_inner(&mut self) -> FrameportResult<()> {
        ensure_parent_dir(&self.config.output_path)?;

        let profile = self.config.target.profile();
        let scratch_video = if self.config.wants_mux() {
            self.audio = Some(PcmSideFile::create()?);
            Some(scratch_video_path(profile.extension)?)
        } else {
            None
        };

        let first_pass_output = scratch_video
            .as_deref()
            .unwrap_or(self.config.output_path.as_path());
        let args = codec::video_pass_args(
            &self.config.target,
            self.config.resolution,
            self.config.fps,
            first_pass_output,
        );

        tracing::debug!(args = ?args, "Starting encoder");
        let (stdin, stderr_task) = spawn_tracked(&self.config.binary, &args, &self.shared, true)?;
        let stdin = stdin.ok_or_else(|| FrameportError::render("Failed to capture encoder stdin"))?;

        let (audio_tx, audio_rx) = bounded::<Option<PcmFile>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let worker = Worker {
            buffer: Arc::clone(&self.buffer),
            shared: Arc::clone(&self.shared),
            on_pipe_broken: self.on_pipe_broken.clone(),
            binary: self.config.binary.clone(),
            output_path: self.config.output_path.clone(),
            container: profile.container,
            audio: self.config.audio,
            scratch_video,
            audio_rx,
        };

        let handle = std::thread::Builder::new()
            .name("frameport-encoder".to_string())
            .spawn(move || {
                worker.run(stdin, stderr_task);
                let _ = done_tx.send(());
            })
            .map_err(|e| FrameportError::render(format!("Failed to spawn encoder worker: {e}")))?;

        if self.audio.is_some() {
            self.audio_handoff = Some(audio_tx);
        }
        self.done = Some(done_rx);
        self.worker = Some(handle);

        tracing::info!(
            program = %self.config.binary.program,
            output = %self.config.output_path.display(),
            resolution = %self.config.resolution,
            fps = self.config.fps,
            audio = self.config.wants_mux(),
            "Encoder started"
        );
        Ok(())
    }

    /// Append one chunk of interleaved audio to the PCM side file. A no-op
    /// when audio is not captured.
    pub fn write_audio(&mut self, samples: &[f32]) -> FrameportResult<()> {
        match self.audio.as_mut() {
            Some(file) => file.write_chunk(samples),
            None => Ok(()),
        }
    }

    pub fn captures_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Stop the job without muxing. Partial output stays where it is.
    pub fn cancel(&mut self) -> FrameportResult<()> {
        self.shared.skip_mux.store(true, Ordering::SeqCst);
        self.dispose()
    }

    /// Finish the job: close the audio side file, let the encoder drain the
    /// buffer, and wait (bounded) for the worker including the mux pass.
    ///
    /// On timeout the encoder is killed and `TimeoutOnDispose` is returned.
    pub fn dispose(&mut self) -> FrameportResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let skip_mux = self.shared.skip_mux.load(Ordering::SeqCst);
        let mux_pending = self.audio_handoff.is_some() && !skip_mux;

        if let Some(handoff) = self.audio_handoff.take() {
            let pcm = match self.audio.take() {
                Some(file) if !skip_mux => match file.finish() {
                    Ok(pcm) => Some(pcm),
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to finalize audio side file");
                        None
                    }
                },
                _ => None,
            };
            let _ = handoff.send(pcm);
        }
        self.audio = None;
        self.buffer.complete();

        let Some(done) = self.done.take() else {
            return Ok(());
        };

        let timeout = if mux_pending {
            self.config.mux_timeout
        } else {
            self.config.dispose_timeout
        };

        if self.join_worker(&done, timeout) {
            return Ok(());
        }

        let waited_ms = (timeout.as_millis() as u64).max(1);
        self.shared.timed_out_ms.store(waited_ms, Ordering::SeqCst);
        let killed = self.shared.kill_child();
        // Release frames nobody will consume.
        self.buffer.drain();
        tracing::warn!(waited_ms, killed, "Encoder did not finish in time");

        // The killed encoder unblocks the worker, which still moves the
        // scratch video into place.
        if !self.join_worker(&done, KILL_GRACE) {
            tracing::error!(
                grace_ms = KILL_GRACE.as_millis() as u64,
                "Encoder worker still running after kill"
            );
        }
        Err(FrameportError::TimeoutOnDispose { waited_ms })
    }

    /// Wait up to `timeout` for the worker to signal completion, then join
    /// it. Returns `false` if the worker is still running.
    fn join_worker(&mut self, done: &Receiver<()>, timeout: Duration) -> bool {
        match done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        tracing::error!("Encoder worker panicked");
                        self.shared.set_state(DriverState::Failed);
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    pub fn state(&self) -> DriverState {
        self.shared.state()
    }

    pub fn is_pipe_broken(&self) -> bool {
        self.shared.pipe_broken.load(Ordering::SeqCst)
    }

    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::SeqCst)
    }

    /// Outcome of the audio phase, once the worker got there.
    pub fn mux_outcome(&self) -> Option<MuxOutcome> {
        self.shared
            .mux_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Audio result for reporting. A job that wanted a mux never reports
    /// `NotRequested`, even when the worker did not get to the audio phase.
    pub fn audio_outcome(&self) -> MuxOutcome {
        if let Some(outcome) = self.mux_outcome() {
            return outcome;
        }
        if !self.config.wants_mux() {
            return MuxOutcome::NotRequested;
        }
        match self.shared.timed_out_ms() {
            Some(ms) => MuxOutcome::Failed(format!("timed out after {ms} ms")),
            None => MuxOutcome::Failed("audio phase did not run".to_string()),
        }
    }

    /// Whether the worker thread has exited.
    pub fn is_worker_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |worker| worker.is_finished())
    }

    pub fn config(&self) -> &EncoderJobConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }
}

impl Drop for EncoderDriver {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            tracing::warn!(error = %err, "Encoder dispose on drop failed");
        }
    }
}

struct Worker {
    buffer: Arc<FrameBuffer>,
    shared: Arc<Shared>,
    on_pipe_broken: Option<PipeBrokenCallback>,
    binary: EncoderBinary,
    output_path: PathBuf,
    container: &'static str,
    audio: Option<AudioExport>,
    scratch_video: Option<TempPath>,
    audio_rx: Receiver<Option<PcmFile>>,
}

impl Worker {
    fn run(mut self, stdin: ChildStdin, stderr_task: JoinHandle<String>) {
        self.shared.set_state(DriverState::StreamingVideo);
        self.stream_frames(stdin);

        let status = self.shared.wait_child();
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        let pipe_broken = self.shared.pipe_broken.load(Ordering::SeqCst);
        let video_ok = !pipe_broken && status.is_some_and(|s| s.success());
        if !video_ok {
            tracing::error!(
                status = ?status,
                pipe_broken,
                stderr = %stderr_output.trim(),
                "Encoder video pass failed"
            );
            self.shared.set_state(DriverState::Failed);
            return;
        }

        tracing::info!(
            frames = self.shared.frames_written.load(Ordering::SeqCst),
            "Encoder video pass finished"
        );

        let Some(scratch) = self.scratch_video.take() else {
            self.shared.set_mux_outcome(MuxOutcome::NotRequested);
            self.shared.set_state(DriverState::Done);
            return;
        };

        // Dispose or cancel hands over the audio before completing the buffer,
        // so this never waits for long.
        let pcm = self.audio_rx.recv().ok().flatten();
        let outcome = self.finish_audio(scratch, pcm);
        tracing::info!(outcome = ?outcome, output = %self.output_path.display(), "Audio phase finished");
        self.shared.set_mux_outcome(outcome);
        self.shared.set_state(DriverState::Done);
    }

    fn stream_frames(&self, mut stdin: ChildStdin) {
        while let Some(frame) = self.buffer.dequeue() {
            if let Err(err) = stdin.write_all(frame.as_bytes()) {
                self.shared.pipe_broken.store(true, Ordering::SeqCst);
                tracing::warn!(error = %err, "Encoder pipe broken, stopping frame feed");
                if let Some(callback) = &self.on_pipe_broken {
                    callback();
                }
                self.buffer.complete();
                self.buffer.drain();
                return;
            }
            self.shared.frames_written.fetch_add(1, Ordering::SeqCst);
        }
        if let Err(err) = stdin.flush() {
            tracing::debug!(error = %err, "Failed to flush encoder stdin");
        }
    }

    fn finish_audio(&self, scratch: TempPath, pcm: Option<PcmFile>) -> MuxOutcome {
        let outcome = if self.shared.skip_mux.load(Ordering::SeqCst) {
            MuxOutcome::Cancelled
        } else if let Some(ms) = self.shared.timed_out_ms() {
            MuxOutcome::Failed(format!("timed out after {ms} ms"))
        } else {
            match (pcm, self.audio) {
                (Some(pcm), Some(audio)) if !pcm.is_empty() => {
                    self.shared.set_state(DriverState::MuxingAudio);
                    match self.run_mux(&scratch, &pcm, audio) {
                        Ok(()) => return MuxOutcome::Muxed,
                        Err(err) => {
                            tracing::warn!(error = %err, "Audio mux failed, keeping video only");
                            let message = match self.shared.timed_out_ms() {
                                Some(ms) => format!("timed out after {ms} ms"),
                                None => err.to_string(),
                            };
                            MuxOutcome::Failed(message)
                        }
                    }
                }
                _ => MuxOutcome::SkippedEmptyAudio,
            }
        };

        if let Err(err) = move_into_place(scratch, &self.output_path) {
            tracing::error!(error = %err, output = %self.output_path.display(), "Failed to move scratch video");
            return MuxOutcome::Failed(err.to_string());
        }
        outcome
    }

    fn run_mux(&self, scratch: &Path, pcm: &PcmFile, audio: AudioExport) -> FrameportResult<()> {
        let args = codec::mux_args(
            scratch,
            pcm.path(),
            audio.format,
            audio.volume,
            self.container,
            &self.output_path,
        );
        tracing::debug!(args = ?args, "Starting audio mux");
        let (_, stderr_task) = spawn_tracked(&self.binary, &args, &self.shared, false)?;
        let status = self.shared.wait_child();
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        match status {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(FrameportError::mux(format!(
                "encoder exited with {status}: {}",
                stderr_output.trim()
            ))),
            None => Err(FrameportError::mux("encoder was terminated")),
        }
    }
}

/// Spawn the encoder, register it for dispose-time killing and drain its
/// stderr on a helper thread.
fn spawn_tracked(
    binary: &EncoderBinary,
    args: &[String],
    shared: &Shared,
    with_stdin: bool,
) -> FrameportResult<(Option<ChildStdin>, JoinHandle<String>)> {
    let mut cmd = binary.command(args);
    cmd.stdin(if with_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| {
        let message = if e.kind() == std::io::ErrorKind::NotFound {
            "executable not found; install ffmpeg or set encoder.program".to_string()
        } else {
            e.to_string()
        };
        FrameportError::subprocess_launch(&binary.program, message)
    })?;

    tracing::debug!(pid = child.id(), "Encoder process started");

    let stdin = child.stdin.take();
    let stderr = child.stderr.take();
    shared.track_child(child);

    // Drain stderr concurrently to avoid the encoder blocking on a full pipe.
    let stderr_task = std::thread::spawn(move || -> String {
        let Some(stderr) = stderr else {
            return String::new();
        };
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read encoder stderr: {err}>"),
        }
    });

    Ok((stdin, stderr_task))
}

fn ensure_parent_dir(output: &Path) -> FrameportResult<()> {
    let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| FrameportError::directory_creation(dir, e))?;
    tracing::debug!(dir = %dir.display(), "Created output directory");
    Ok(())
}

fn scratch_video_path(extension: &str) -> FrameportResult<TempPath> {
    let file = tempfile::Builder::new()
        .prefix("frameport-video-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .map_err(|e| FrameportError::render(format!("Failed to create scratch video: {e}")))?;
    Ok(file.into_temp_path())
}

/// Rename the scratch file over `target`, copying when the rename crosses
/// filesystems. The scratch file is removed either way.
fn move_into_place(scratch: TempPath, target: &Path) -> FrameportResult<()> {
    match scratch.persist(target) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err.error, "Rename failed, copying scratch video");
            std::fs::copy(&err.path, target)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameport_render_model::{SpeedPreset, VideoCodec};

    #[test]
    fn test_driver_state_roundtrips_through_u8() {
        for state in [
            DriverState::Idle,
            DriverState::Starting,
            DriverState::StreamingVideo,
            DriverState::MuxingAudio,
            DriverState::Done,
            DriverState::Failed,
        ] {
            assert_eq!(DriverState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_missing_binary_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncoderJobConfig {
            binary: EncoderBinary::new("frameport-no-such-encoder"),
            target: EncodeTarget::Video {
                codec: VideoCodec::H264,
                bitrate: 1_000_000,
                crf: None,
                preset: SpeedPreset::Fast,
            },
            resolution: Resolution::new(4, 4),
            fps: 30.0,
            output_path: dir.path().join("out.mp4"),
            audio: None,
            dispose_timeout: Duration::from_millis(200),
            mux_timeout: Duration::from_millis(200),
        };
        let buffer = Arc::new(FrameBuffer::new(2));
        let mut driver = EncoderDriver::new(config, Arc::clone(&buffer));
        let err = driver.start().unwrap_err();
        assert!(matches!(err, FrameportError::SubprocessLaunch { .. }));
        assert_eq!(driver.state(), DriverState::Failed);
        assert!(buffer.is_completed());
        assert!(!is_encoder_available(&EncoderBinary::new("frameport-no-such-encoder")));
    }

    #[test]
    fn test_ensure_parent_dir_creates_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a/b/c/out.mp4");
        ensure_parent_dir(&output).unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
    }

    #[test]
    fn test_ensure_parent_dir_reports_blocking_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let err = ensure_parent_dir(&blocker.join("out.mp4")).unwrap_err();
        assert!(matches!(err, FrameportError::DirectoryCreation { .. }));
    }

    #[test]
    fn test_move_into_place_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = scratch_video_path("mp4").unwrap();
        std::fs::write(&scratch, b"video").unwrap();
        let scratch_path = scratch.to_path_buf();
        let target = dir.path().join("final.mp4");
        std::fs::write(&target, b"stale").unwrap();

        move_into_place(scratch, &target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"video");
        assert!(!scratch_path.exists());
    }
}
