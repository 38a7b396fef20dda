//! Render options shared by `render` and `plan`.

use std::path::PathBuf;

use clap::Args;
use frameport_common::RenderDefaults;
use frameport_render_engine::paths::{self, RenderTarget, SequenceLayout};
use frameport_render_engine::timing::apply_time_range;
use frameport_render_engine::{ConstantTempo, ManualPlayback, SoundtrackBounds};
use frameport_render_model::{
    ImageFormat, RenderMode, RenderSettings, Resolution, SpeedPreset, TimeRange, TimeReference,
    VideoCodec,
};

#[derive(Debug, Clone, Args)]
pub struct RenderArgs {
    /// Output file for video renders (defaults to the configured path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Render mode: video or sequence
    #[arg(long, default_value = "video")]
    pub mode: RenderMode,

    /// Video codec: h264, openh264, prores, hap, hap_alpha, vp9
    #[arg(long)]
    pub codec: Option<VideoCodec>,

    /// Image format for sequences: png, jpeg, webp
    #[arg(long, default_value = "png")]
    pub image_format: ImageFormat,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<f64>,

    /// Video bitrate in bits per second
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// Constant rate factor, for codecs that support it
    #[arg(long)]
    pub crf: Option<u8>,

    /// Encoder speed preset
    #[arg(long, default_value = "fast")]
    pub preset: SpeedPreset,

    /// Unit of --start and --end: bars, seconds, frames
    #[arg(long, default_value = "seconds")]
    pub reference: TimeReference,

    /// Render start
    #[arg(long, default_value = "0")]
    pub start: f64,

    /// Render end
    #[arg(long, default_value = "4")]
    pub end: f64,

    /// Range source: custom, loop, soundtrack
    #[arg(long, default_value = "custom")]
    pub range: TimeRange,

    /// Loop range in bars, used with --range loop
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub loop_bars: Option<Vec<f64>>,

    /// Soundtrack length in seconds, used with --range soundtrack
    #[arg(long)]
    pub soundtrack_secs: Option<f64>,

    /// Tempo of the synthetic scene
    #[arg(long, default_value = "120")]
    pub bpm: f64,

    /// Scene width before scaling
    #[arg(long, default_value = "1280")]
    pub width: u32,

    /// Scene height before scaling
    #[arg(long, default_value = "720")]
    pub height: u32,

    /// Resolution factor applied to the scene size
    #[arg(long, default_value = "1.0")]
    pub resolution_factor: f32,

    /// Disable audio capture
    #[arg(long)]
    pub no_audio: bool,

    /// Audio gain
    #[arg(long)]
    pub volume: Option<f32>,

    /// Do not pick a new version when the output already exists
    #[arg(long)]
    pub no_increment: bool,

    /// Directory that relative (`./…`) output paths resolve against
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
}

/// Everything a render needs once the options are resolved.
#[derive(Debug, Clone)]
pub struct PreparedRender {
    pub settings: RenderSettings,
    pub target: RenderTarget,
    pub texture_size: Resolution,
}

impl RenderArgs {
    /// Headless playback clock configured from the options.
    pub fn playback(&self) -> ManualPlayback {
        let mut playback = ManualPlayback::new(ConstantTempo::new(self.bpm));
        if let Some([start, end]) = self.loop_bars.as_deref() {
            playback.loop_range = (*start, *end);
        }
        playback.soundtrack = self.soundtrack_secs.map(|length_secs| SoundtrackBounds {
            start_bars: 0.0,
            end_bars: 0.0,
            length_secs,
        });
        playback
    }

    /// Merge options over configured defaults, apply the time range and
    /// resolve the output target.
    pub fn prepare(
        &self,
        defaults: &RenderDefaults,
        playback: &ManualPlayback,
    ) -> anyhow::Result<PreparedRender> {
        let codec = match self.codec {
            Some(codec) => codec,
            None => defaults
                .video_codec
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid configured codec: {e}"))?,
        };

        let mut settings = RenderSettings {
            mode: self.mode,
            codec,
            image_format: self.image_format,
            bitrate: self.bitrate.unwrap_or(defaults.bitrate),
            crf: self.crf,
            preset: self.preset,
            fps: self.fps.unwrap_or(defaults.fps),
            reference: self.reference,
            start: self.start,
            end: self.end,
            time_range: self.range,
            resolution_factor: self.resolution_factor,
            export_audio: defaults.export_audio && !self.no_audio,
            audio_volume: self.volume.unwrap_or(defaults.audio_volume),
            output_path: self
                .output
                .clone()
                .unwrap_or_else(|| defaults.video_file_path.clone()),
            auto_increment_version: defaults.auto_increment_version && !self.no_increment,
        };

        apply_time_range(settings.time_range, &mut settings, playback);
        settings
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid render settings: {e}"))?;

        let layout = SequenceLayout::from_defaults(defaults);
        let default_root = std::env::current_dir()?;
        let target = paths::resolve_target(
            &settings,
            &layout,
            self.project_dir.as_deref(),
            default_root.as_path(),
        );
        settings.output_path = target.encoder_output();

        let texture_size =
            Resolution::new(self.width, self.height).scaled(settings.resolution_factor);

        Ok(PreparedRender {
            settings,
            target,
            texture_size,
        })
    }
}

/// Human-readable description of where a render goes.
pub fn describe_target(target: &RenderTarget) -> String {
    match target {
        RenderTarget::VideoFile(path) => path.display().to_string(),
        RenderTarget::ImageSequence { folder, .. } => {
            format!("{} ({})", folder.display(), target.encoder_output().display())
        }
    }
}
