//! Error types shared across Frameport crates.

use std::path::PathBuf;

/// Top-level error type for Frameport operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameportError {
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch encoder {program}: {message}")]
    SubprocessLaunch { program: String, message: String },

    #[error("Encoder pipe broken: {message}")]
    PipeBroken { message: String },

    #[error("Readback error: {message}")]
    Readback { message: String },

    #[error("Audio mux error: {message}")]
    Mux { message: String },

    #[error("Encoder did not finish within {waited_ms} ms")]
    TimeoutOnDispose { waited_ms: u64 },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Invalid render settings: {message}")]
    InvalidSettings { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FrameportError.
pub type FrameportResult<T> = Result<T, FrameportError>;

impl FrameportError {
    pub fn directory_creation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreation {
            path: path.into(),
            source,
        }
    }

    pub fn subprocess_launch(program: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SubprocessLaunch {
            program: program.into(),
            message: msg.into(),
        }
    }

    pub fn pipe_broken(msg: impl Into<String>) -> Self {
        Self::PipeBroken {
            message: msg.into(),
        }
    }

    pub fn readback(msg: impl Into<String>) -> Self {
        Self::Readback {
            message: msg.into(),
        }
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: msg.into(),
        }
    }

    /// Whether the job can continue (or degrade gracefully) after this error.
    ///
    /// Readback failures skip a frame, mux failures fall back to the
    /// video-only output, and a dispose timeout is only logged.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Readback { .. } | Self::Mux { .. } | Self::TimeoutOnDispose { .. }
        )
    }
}
