//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default render settings and output locations.
    pub render: RenderDefaults,

    /// Encoder process settings.
    pub encoder: EncoderConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default render parameters and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Default frames per second.
    pub fps: f64,

    /// Default video bitrate in bits per second.
    pub bitrate: u32,

    /// Default video codec (e.g. "h264", "prores", "vp9").
    pub video_codec: String,

    /// Target file for video renders. Paths starting with `.` are resolved
    /// against the project directory.
    pub video_file_path: PathBuf,

    /// Folder for image sequences.
    pub sequence_folder: PathBuf,

    /// File name prefix for image sequence frames.
    pub sequence_prefix: String,

    /// Versioned sub folder name for image sequences (e.g. "v01").
    pub sequence_sub_folder: String,

    /// Write image sequences into `sequence_sub_folder`.
    pub create_sub_folder: bool,

    /// Pick the next free version of `sequence_sub_folder`.
    pub auto_increment_sub_folder: bool,

    /// Bump the `vNN` token of the video file name after a successful render.
    pub auto_increment_version: bool,

    /// Whether to capture and mux the audio mix-down.
    pub export_audio: bool,

    /// Gain applied to the muxed audio track.
    pub audio_volume: f32,
}

/// Encoder process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder executable (looked up in PATH when relative).
    pub program: PathBuf,

    /// Arguments inserted before the generated encoder arguments, for
    /// wrappers such as `nice -n 10 ffmpeg`.
    pub wrapper_args: Vec<String>,

    /// Number of frames that may wait for the encoder.
    pub frame_buffer_capacity: usize,

    /// Idle frame buffers kept for reuse.
    pub pooled_frames: usize,

    /// How long dispose waits for the video pass when no mux follows.
    pub dispose_timeout_ms: u64,

    /// How long dispose waits when an audio mux pass is pending.
    pub mux_timeout_ms: u64,

    /// Consecutive readback failures before an export is aborted.
    pub max_readback_failures: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "frameport=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            fps: 60.0,
            bitrate: 25_000_000,
            video_codec: "h264".to_string(),
            video_file_path: PathBuf::from("./Render/render-v01.mp4"),
            sequence_folder: PathBuf::from("./Render"),
            sequence_prefix: "render".to_string(),
            sequence_sub_folder: "v01".to_string(),
            create_sub_folder: true,
            auto_increment_sub_folder: true,
            auto_increment_version: true,
            export_audio: true,
            audio_volume: 1.0,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            wrapper_args: Vec::new(),
            frame_buffer_capacity: 60,
            pooled_frames: 8,
            dispose_timeout_ms: 2_000,
            mux_timeout_ms: 30_000,
            max_readback_failures: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("frameport").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.json"));
        assert_eq!(config.encoder.frame_buffer_capacity, 60);
        assert_eq!(config.render.bitrate, 25_000_000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"encoder":{"program":"/opt/ffmpeg/bin/ffmpeg"}}"#).unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.encoder.program, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.encoder.dispose_timeout_ms, 2_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.render.audio_volume = 0.5;
        config.render.sequence_prefix = "shot".to_string();
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.render.audio_volume, 0.5);
        assert_eq!(loaded.render.sequence_prefix, "shot");
    }
}
