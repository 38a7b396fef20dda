//! Render settings for a single export job.
//!
//! A `RenderSettings` value is snapshotted when an export starts and stays
//! immutable for the duration of that job.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::time::{TimeRange, TimeReference};

/// Largest edge length a rendered frame may have.
pub const MAX_FRAME_EDGE: u32 = 16_384;

/// Whether frames are encoded into one container or written as images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Video,
    ImageSequence,
}

/// Video codec used for the encoder pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// H.264 through libx264.
    #[default]
    H264,
    /// H.264 through Cisco's libopenh264.
    #[serde(rename = "openh264")]
    OpenH264,
    /// Apple ProRes 422 (10 bit).
    #[serde(rename = "prores")]
    ProRes,
    /// HAP, GPU-decodable.
    Hap,
    /// HAP with alpha channel.
    HapAlpha,
    /// VP9 in WebM.
    Vp9,
}

/// Still image format for image sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

/// Encoder speed/efficiency tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    #[default]
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Settings for one export job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Video file or image sequence.
    pub mode: RenderMode,

    /// Codec for video mode.
    pub codec: VideoCodec,

    /// Image format for sequence mode.
    pub image_format: ImageFormat,

    /// Target video bitrate in bits per second.
    pub bitrate: u32,

    /// Constant rate factor for codecs that support it.
    pub crf: Option<u8>,

    /// Encoder speed preset for codecs that support it.
    pub preset: SpeedPreset,

    /// Output frame rate.
    pub fps: f64,

    /// Unit of `start` and `end`.
    pub reference: TimeReference,

    /// Render start, in `reference` units.
    pub start: f64,

    /// Render end, in `reference` units.
    pub end: f64,

    /// Where the range comes from.
    pub time_range: TimeRange,

    /// Scale applied to the source texture size.
    pub resolution_factor: f32,

    /// Capture and mux the audio mix-down (video mode only).
    pub export_audio: bool,

    /// Gain applied to the muxed audio.
    pub audio_volume: f32,

    /// Output file (video) or numbered frame pattern (image sequence).
    pub output_path: PathBuf,

    /// Bump the `vNN` token of the output name after a successful render.
    pub auto_increment_version: bool,
}

/// Reasons a settings snapshot cannot be rendered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("frame rate must be a positive number, got {0}")]
    InvalidFps(f64),

    #[error("bitrate must be positive for {0}")]
    ZeroBitrate(VideoCodec),

    #[error("resolution factor must be within (0, 16], got {0}")]
    InvalidResolutionFactor(f32),

    #[error("audio volume must be a non-negative number, got {0}")]
    InvalidVolume(f32),

    #[error("CRF must be within 0..=63, got {0}")]
    InvalidCrf(u8),

    #[error("render end ({end}) must be after start ({start})")]
    EmptyRange { start: f64, end: f64 },

    #[error("output path is empty")]
    EmptyOutputPath,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::Video,
            codec: VideoCodec::H264,
            image_format: ImageFormat::Png,
            bitrate: 25_000_000,
            crf: None,
            preset: SpeedPreset::Fast,
            fps: 60.0,
            reference: TimeReference::Bars,
            start: 0.0,
            end: 4.0,
            time_range: TimeRange::Custom,
            resolution_factor: 1.0,
            export_audio: true,
            audio_volume: 1.0,
            output_path: PathBuf::from("./Render/render-v01.mp4"),
            auto_increment_version: true,
        }
    }
}

impl RenderSettings {
    /// Check that the snapshot can drive an export.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(SettingsError::InvalidFps(self.fps));
        }
        if self.mode == RenderMode::Video && self.codec.uses_bitrate() && self.bitrate == 0 {
            return Err(SettingsError::ZeroBitrate(self.codec));
        }
        if self.resolution_factor.is_nan()
            || self.resolution_factor <= 0.0
            || self.resolution_factor > 16.0
        {
            return Err(SettingsError::InvalidResolutionFactor(self.resolution_factor));
        }
        if !self.audio_volume.is_finite() || self.audio_volume < 0.0 {
            return Err(SettingsError::InvalidVolume(self.audio_volume));
        }
        if let Some(crf) = self.crf {
            if crf > 63 {
                return Err(SettingsError::InvalidCrf(crf));
            }
        }
        if self.start.is_nan() || self.end.is_nan() || self.end <= self.start {
            return Err(SettingsError::EmptyRange {
                start: self.start,
                end: self.end,
            });
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(SettingsError::EmptyOutputPath);
        }
        Ok(())
    }

    /// Whether audio is captured for this job. Image sequences never carry
    /// audio.
    pub fn wants_audio(&self) -> bool {
        self.export_audio && self.mode == RenderMode::Video
    }
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Apply a resolution factor, clamping each edge to `1..=16384`.
    pub fn scaled(self, factor: f32) -> Self {
        let scale = |edge: u32| {
            ((edge as f64 * factor as f64) as i64).clamp(1, MAX_FRAME_EDGE as i64) as u32
        };
        Self {
            width: scale(self.width),
            height: scale(self.height),
        }
    }

    /// Bytes in one BGRA frame.
    pub fn frame_bytes(self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 6] = [
        Self::H264,
        Self::OpenH264,
        Self::ProRes,
        Self::Hap,
        Self::HapAlpha,
        Self::Vp9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::OpenH264 => "openh264",
            Self::ProRes => "prores",
            Self::Hap => "hap",
            Self::HapAlpha => "hap_alpha",
            Self::Vp9 => "vp9",
        }
    }

    /// Whether the codec is rate-controlled by a target bitrate.
    pub fn uses_bitrate(self) -> bool {
        !matches!(self, Self::Hap | Self::HapAlpha)
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "x264" => Ok(Self::H264),
            "openh264" => Ok(Self::OpenH264),
            "prores" => Ok(Self::ProRes),
            "hap" => Ok(Self::Hap),
            "hap_alpha" | "hap-alpha" => Ok(Self::HapAlpha),
            "vp9" => Ok(Self::Vp9),
            other => Err(format!(
                "Unknown codec: {other}. Use: h264, openh264, prores, hap, hap_alpha, vp9"
            )),
        }
    }
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(format!("Unknown image format: {other}. Use: png, jpeg, webp")),
        }
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "sequence" | "image_sequence" | "images" => Ok(Self::ImageSequence),
            other => Err(format!("Unknown render mode: {other}. Use: video, sequence")),
        }
    }
}

impl SpeedPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

impl FromStr for SpeedPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        [
            Self::Ultrafast,
            Self::Superfast,
            Self::Veryfast,
            Self::Faster,
            Self::Fast,
            Self::Medium,
            Self::Slow,
            Self::Slower,
            Self::Veryslow,
        ]
        .into_iter()
        .find(|preset| preset.as_str() == lowered)
        .ok_or_else(|| format!("Unknown speed preset: {s}"))
    }
}
