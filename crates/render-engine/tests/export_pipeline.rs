//! End-to-end export runs against a shell script standing in for ffmpeg.
//!
//! The script receives the generated encoder arguments as `$1..$n`; the last
//! one is always the output path.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use frameport_common::{FrameportError, FrameportResult};
use frameport_render_engine::{
    AudioEngine, DriverState, EncodeTarget, EncoderBinary, EncoderDriver, EncoderJobConfig, ExportJob,
    FrameBuffer, FramePool, JobOptions, JobState, ManualPlayback, MappedRegion, MuxOutcome,
    PlaybackEngine, ReadableTexture, TextureDescription,
};
use frameport_render_model::{RenderMode, RenderSettings, Resolution, TimeReference};

/// Video pass copies stdin to the output; the mux pass concatenates its two
/// inputs so the result size reveals what went in.
const FAKE_ENCODER: &str = r#"
for last; do :; done
case " $* " in
  *" -map "*)
    video=""; pcm=""; prev=""
    for a; do
      if [ "$prev" = "-i" ]; then
        if [ -z "$video" ]; then video="$a"; else pcm="$a"; fi
      fi
      prev="$a"
    done
    cat "$video" "$pcm" > "$last" ;;
  *) cat > "$last" ;;
esac
"#;

fn script_binary(script: &str) -> EncoderBinary {
    EncoderBinary {
        program: "sh".to_string(),
        wrapper_args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
    }
}

fn options(script: &str) -> JobOptions {
    JobOptions {
        binary: script_binary(script),
        frame_buffer_capacity: 60,
        pooled_frames: 4,
        dispose_timeout: Duration::from_secs(5),
        mux_timeout: Duration::from_secs(10),
        max_readback_failures: 3,
    }
}

fn frame_settings(frames: f64, fps: f64, output: PathBuf) -> RenderSettings {
    RenderSettings {
        reference: TimeReference::Frames,
        start: 0.0,
        end: frames,
        fps,
        export_audio: false,
        auto_increment_version: false,
        output_path: output,
        ..Default::default()
    }
}

/// BGRA texture whose rows are padded to a 64-byte pitch.
struct PaddedTexture {
    width: u32,
    height: u32,
    pitch: usize,
    data: Vec<u8>,
}

impl PaddedTexture {
    fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * 4;
        let pitch = stride.div_ceil(64) * 64;
        let mut data = vec![0xEE; pitch * height as usize];
        for row in 0..height as usize {
            data[row * pitch..row * pitch + stride].fill(row as u8);
        }
        Self {
            width,
            height,
            pitch,
            data,
        }
    }
}

impl ReadableTexture for PaddedTexture {
    fn description(&self) -> TextureDescription {
        TextureDescription {
            width: self.width,
            height: self.height,
        }
    }

    fn is_released(&self) -> bool {
        false
    }

    fn map_for_read(&self) -> FrameportResult<MappedRegion<'_>> {
        Ok(MappedRegion {
            data: &self.data,
            row_pitch: self.pitch,
        })
    }

    fn unmap(&self) {}
}

struct ReleasedTexture;

impl ReadableTexture for ReleasedTexture {
    fn description(&self) -> TextureDescription {
        TextureDescription {
            width: 8,
            height: 8,
        }
    }

    fn is_released(&self) -> bool {
        true
    }

    fn map_for_read(&self) -> FrameportResult<MappedRegion<'_>> {
        Err(FrameportError::readback("texture was released"))
    }

    fn unmap(&self) {}
}

/// Produces silence of exactly the requested length.
#[derive(Default)]
struct CountingAudio {
    recording: bool,
    committed_secs: f64,
    chunks: usize,
}

impl AudioEngine for CountingAudio {
    fn prepare_recording(&mut self, _fps: f64) {
        self.recording = true;
    }

    fn end_recording(&mut self, _fps: f64) {
        self.recording = false;
    }

    fn complete_frame(&mut self, delta_secs: f64) {
        self.committed_secs += delta_secs;
    }

    fn last_mixdown_buffer(&mut self, duration_secs: f64) -> Vec<f32> {
        self.chunks += 1;
        let frames = (duration_secs * self.sample_rate() as f64).round() as usize;
        vec![0.0; frames * self.channels() as usize]
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        48_000
    }
}

fn run_to_end<P, A, T>(job: &mut ExportJob<'_, P, A>, texture: &T) -> JobState
where
    P: PlaybackEngine + ?Sized,
    A: AudioEngine + ?Sized,
    T: ReadableTexture + ?Sized,
{
    let deadline = Instant::now() + Duration::from_secs(20);
    while job.is_exporting() {
        assert!(Instant::now() < deadline, "export did not finish in time");
        if job.tick(texture) == JobState::Exporting {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    job.state()
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[test]
fn video_only_export_writes_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("renders").join("clip-v01.mp4");
    let texture = PaddedTexture::new(10, 6);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    {
        let mut job = ExportJob::new(
            frame_settings(12.0, 30.0, output.clone()),
            options(FAKE_ENCODER),
            &mut playback,
            &mut audio,
        );
        job.start(Resolution::new(10, 6)).unwrap();
        assert_eq!(job.frame_count(), 12);
        assert!(job.playback().is_rendering_to_file());

        assert_eq!(run_to_end(&mut job, &texture), JobState::Completed);
        assert_eq!(job.progress(), 1.0);
        assert!(job.status().starts_with("Render finished in"));

        let report = job.report().unwrap();
        assert_eq!(report.frame_count, 12);
        assert_eq!(report.frames_encoded, 12);
        assert_eq!(report.audio, MuxOutcome::NotRequested);
        assert!(report.next_version_path.is_none());

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["mode"], "video");
        assert_eq!(json["resolution"], "10x6");
        assert_eq!(json["audio"]["kind"], "not_requested");
    }

    assert_eq!(file_len(&output), 12 * 10 * 6 * 4);
    let bytes = std::fs::read(&output).unwrap();
    // Row padding must not leak into the encoded stream.
    assert!(!bytes.contains(&0xEE));
    assert_eq!(&bytes[40..80], &[1u8; 40][..]);

    assert!(!playback.is_rendering_to_file());
    assert_eq!(audio.chunks, 0);
}

#[test]
fn audio_is_muxed_after_the_video_pass() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("with-audio_v03.mp4");
    let texture = PaddedTexture::new(4, 4);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let mut settings = frame_settings(6.0, 30.0, output.clone());
    settings.export_audio = true;
    settings.auto_increment_version = true;

    {
        let mut job = ExportJob::new(settings, options(FAKE_ENCODER), &mut playback, &mut audio);
        job.start(Resolution::new(4, 4)).unwrap();
        assert_eq!(run_to_end(&mut job, &texture), JobState::Completed);

        let report = job.report().unwrap();
        assert_eq!(report.audio, MuxOutcome::Muxed);
        assert_eq!(
            report.next_version_path.as_deref(),
            Some(dir.path().join("with-audio_v04.mp4").as_path())
        );
    }

    // 6 frames of 4x4 BGRA, then 6 chunks of 1600 stereo f32 samples.
    let video_bytes = 6 * 4 * 4 * 4;
    let audio_bytes = 6 * 1600 * 2 * 4;
    assert_eq!(file_len(&output), (video_bytes + audio_bytes) as u64);
    assert_eq!(audio.chunks, 6);
    assert!(!audio.recording);
    // Committed in whole milliseconds; the remainder is carried, not lost.
    assert!((audio.committed_secs - 0.2).abs() < 0.002);
}

#[test]
fn image_sequence_never_captures_audio() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("seq").join("frame_%04d.png");
    let texture = PaddedTexture::new(4, 2);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let mut settings = frame_settings(3.0, 24.0, output.clone());
    settings.mode = RenderMode::ImageSequence;
    settings.export_audio = true;

    {
        let mut job = ExportJob::new(settings, options(FAKE_ENCODER), &mut playback, &mut audio);
        job.start(Resolution::new(4, 2)).unwrap();
        assert_eq!(run_to_end(&mut job, &texture), JobState::Completed);
        assert_eq!(job.report().unwrap().audio, MuxOutcome::NotRequested);
    }

    // The fake encoder writes the pattern path literally.
    assert_eq!(file_len(&output), 3 * 4 * 2 * 4);
    assert_eq!(audio.chunks, 0);
}

#[test]
fn encoder_exiting_early_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("broken.mp4");
    // Frames larger than a pipe buffer so the write has to hit the closed pipe.
    let texture = PaddedTexture::new(256, 256);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let broken = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&broken);

    {
        let mut job = ExportJob::new(
            frame_settings(4.0, 30.0, output),
            options("exit 3"),
            &mut playback,
            &mut audio,
        );
        job.set_on_pipe_broken(Arc::new(move || flag.store(true, Ordering::SeqCst)));
        job.start(Resolution::new(256, 256)).unwrap();

        assert_eq!(run_to_end(&mut job, &texture), JobState::Failed);
        assert!(job.report().is_none());
    }

    assert!(broken.load(Ordering::SeqCst));
    assert!(!playback.is_rendering_to_file());
}

#[test]
fn repeated_readback_failures_fail_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let mut job = ExportJob::new(
        frame_settings(10.0, 30.0, dir.path().join("never.mp4")),
        options(FAKE_ENCODER),
        &mut playback,
        &mut audio,
    );
    job.start(Resolution::new(8, 8)).unwrap();

    assert_eq!(job.tick(&ReleasedTexture), JobState::Exporting);
    assert_eq!(job.tick(&ReleasedTexture), JobState::Exporting);
    assert_eq!(job.frame_index(), 0);
    assert_eq!(job.tick(&ReleasedTexture), JobState::Failed);
    assert!(job.status().contains("Readback failed 3 times"));
}

#[test]
fn cancel_keeps_partial_output_and_releases_clock() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("partial.mp4");
    let texture = PaddedTexture::new(4, 4);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let mut settings = frame_settings(100.0, 30.0, output.clone());
    settings.export_audio = true;

    {
        let mut job = ExportJob::new(settings, options(FAKE_ENCODER), &mut playback, &mut audio);
        job.start(Resolution::new(4, 4)).unwrap();
        for _ in 0..5 {
            job.tick(&texture);
        }
        assert_eq!(job.frame_index(), 5);
        job.cancel(Some("Stopped by user"));
        assert_eq!(job.state(), JobState::Cancelled);
        assert_eq!(job.status(), "Stopped by user");
        assert!(job.report().is_none());
    }

    // No mux on cancel: only the video bytes end up at the final path.
    assert_eq!(file_len(&output), 5 * 4 * 4 * 4);
    assert!(!playback.is_rendering_to_file());
    assert!(!audio.recording);
}

#[test]
fn dispose_kills_a_hung_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let config = EncoderJobConfig {
        binary: script_binary("exec sleep 30"),
        target: EncodeTarget::from_settings(&RenderSettings::default()),
        resolution: Resolution::new(2, 2),
        fps: 30.0,
        output_path: dir.path().join("hung.mp4"),
        audio: None,
        dispose_timeout: Duration::from_millis(200),
        mux_timeout: Duration::from_secs(1),
    };
    let buffer = Arc::new(FrameBuffer::new(4));
    let pool = FramePool::new(Resolution::new(2, 2), 2);

    let mut driver = EncoderDriver::new(config, Arc::clone(&buffer));
    driver.start().unwrap();
    buffer.try_enqueue(pool.rent()).unwrap();

    let started = Instant::now();
    let err = driver.dispose().unwrap_err();
    assert!(matches!(err, FrameportError::TimeoutOnDispose { waited_ms: 200 }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(buffer.is_completed());

    // The worker was joined after the kill.
    assert!(driver.is_worker_finished());
    assert_eq!(driver.state(), DriverState::Failed);

    // A second dispose is a no-op.
    assert!(driver.dispose().is_ok());
}

/// Video pass copies stdin; the mux pass runs `$MUX` instead.
fn encoder_with_mux(mux: &str) -> String {
    format!(
        r#"
for last; do :; done
case " $* " in
  *" -map "*) {mux} ;;
  *) cat > "$last" ;;
esac
"#
    )
}

/// Returns no samples, so the PCM side file stays empty.
struct MutedAudio;

impl AudioEngine for MutedAudio {
    fn prepare_recording(&mut self, _fps: f64) {}

    fn end_recording(&mut self, _fps: f64) {}

    fn complete_frame(&mut self, _delta_secs: f64) {}

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

#[test]
fn mux_timeout_still_delivers_video_before_completing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("slow-mux.mp4");
    let texture = PaddedTexture::new(4, 4);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let mut settings = frame_settings(4.0, 30.0, output.clone());
    settings.export_audio = true;
    let options = JobOptions {
        mux_timeout: Duration::from_millis(500),
        ..options(&encoder_with_mux("exec sleep 30"))
    };

    let mut job = ExportJob::new(settings, options, &mut playback, &mut audio);
    job.start(Resolution::new(4, 4)).unwrap();
    assert_eq!(run_to_end(&mut job, &texture), JobState::Completed);

    // The video-only fallback is in place by the time the job completes.
    assert_eq!(file_len(&output), 4 * 4 * 4 * 4);
    match &job.report().unwrap().audio {
        MuxOutcome::Failed(message) => assert!(message.contains("timed out"), "{message}"),
        other => panic!("unexpected audio outcome: {other:?}"),
    }
}

#[test]
fn empty_audio_skips_the_mux() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("silent.mp4");
    let texture = PaddedTexture::new(4, 4);
    let mut playback = ManualPlayback::default();
    let mut audio = MutedAudio;

    let mut settings = frame_settings(4.0, 30.0, output.clone());
    settings.export_audio = true;

    {
        let mut job = ExportJob::new(settings, options(FAKE_ENCODER), &mut playback, &mut audio);
        job.start(Resolution::new(4, 4)).unwrap();
        assert_eq!(run_to_end(&mut job, &texture), JobState::Completed);
        assert_eq!(job.report().unwrap().audio, MuxOutcome::SkippedEmptyAudio);
    }

    assert_eq!(file_len(&output), 4 * 4 * 4 * 4);
}

#[test]
fn failed_mux_keeps_the_video_only_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("no-mux.mp4");
    let texture = PaddedTexture::new(4, 4);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let mut settings = frame_settings(4.0, 30.0, output.clone());
    settings.export_audio = true;
    let script = encoder_with_mux("echo 'mux refused' >&2; exit 9");

    {
        let mut job = ExportJob::new(settings, options(&script), &mut playback, &mut audio);
        job.start(Resolution::new(4, 4)).unwrap();
        assert_eq!(run_to_end(&mut job, &texture), JobState::Completed);
        match &job.report().unwrap().audio {
            MuxOutcome::Failed(message) => {
                assert!(message.contains("exit status: 9"), "{message}");
                assert!(message.contains("mux refused"), "{message}");
            }
            other => panic!("unexpected audio outcome: {other:?}"),
        }
    }

    assert_eq!(file_len(&output), 4 * 4 * 4 * 4);
    assert_eq!(audio.chunks, 4);
}

#[test]
fn full_buffer_skips_ticks_without_moving_the_clock() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("backpressure.mp4");
    // One 64 KiB frame fills the pipe, so the stalled encoder backs up the buffer.
    let texture = PaddedTexture::new(128, 128);
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let options = JobOptions {
        frame_buffer_capacity: 2,
        ..options(r#"for last; do :; done; sleep 1; cat > "$last""#)
    };

    {
        let mut job = ExportJob::new(
            frame_settings(8.0, 30.0, output.clone()),
            options,
            &mut playback,
            &mut audio,
        );
        job.start(Resolution::new(128, 128)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(20);
        while job.is_exporting() {
            assert!(Instant::now() < deadline, "export did not finish in time");
            let time = job.playback().time_in_secs();
            let index = job.frame_index();
            let skipped = job.skipped_ticks();

            if job.tick(&texture) != JobState::Exporting {
                break;
            }
            if job.skipped_ticks() > skipped {
                assert_eq!(job.frame_index(), index);
                assert_eq!(job.playback().time_in_secs(), time);
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(job.state(), JobState::Completed);
        let report = job.report().unwrap();
        assert!(report.skipped_ticks > 0);
        assert_eq!(report.frames_encoded, 8);
    }

    assert_eq!(file_len(&output), 8 * 128 * 128 * 4);
}

/// Mapping fails with an error the host does not expect to recover from.
struct LostDeviceTexture;

impl ReadableTexture for LostDeviceTexture {
    fn description(&self) -> TextureDescription {
        TextureDescription {
            width: 8,
            height: 8,
        }
    }

    fn is_released(&self) -> bool {
        false
    }

    fn map_for_read(&self) -> FrameportResult<MappedRegion<'_>> {
        Err(FrameportError::render("device lost"))
    }

    fn unmap(&self) {}
}

#[test]
fn unrecoverable_readback_error_fails_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut playback = ManualPlayback::default();
    let mut audio = CountingAudio::default();

    let mut job = ExportJob::new(
        frame_settings(10.0, 30.0, dir.path().join("lost.mp4")),
        options(FAKE_ENCODER),
        &mut playback,
        &mut audio,
    );
    job.start(Resolution::new(8, 8)).unwrap();

    assert_eq!(job.tick(&LostDeviceTexture), JobState::Failed);
    assert!(job.status().contains("device lost"));
}
