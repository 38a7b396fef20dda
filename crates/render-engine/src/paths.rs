//! Output path resolution and version auto-increment.
//!
//! Render targets carry a version token such as `clip_v01.mp4` or a
//! `v003` sequence folder. After a render the token is bumped so the next
//! render does not overwrite the previous one.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use frameport_common::RenderDefaults;
use frameport_render_model::{ImageFormat, RenderMode, RenderSettings};
use regex::Regex;

/// Version attempts before giving up on finding a free folder or file.
pub const MAX_VERSION_ATTEMPTS: usize = 1000;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[\s_\-.])v(\d{2,4})(?:\b|$)").expect("version pattern is valid")
    })
}

/// Where an image sequence goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceLayout {
    pub folder: PathBuf,
    pub prefix: String,
    pub sub_folder: String,
    pub create_sub_folder: bool,
    pub auto_increment_sub_folder: bool,
}

impl SequenceLayout {
    pub fn from_defaults(defaults: &RenderDefaults) -> Self {
        Self {
            folder: defaults.sequence_folder.clone(),
            prefix: defaults.sequence_prefix.clone(),
            sub_folder: defaults.sequence_sub_folder.clone(),
            create_sub_folder: defaults.create_sub_folder,
            auto_increment_sub_folder: defaults.auto_increment_sub_folder,
        }
    }
}

/// A fully resolved render destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    VideoFile(PathBuf),
    ImageSequence {
        folder: PathBuf,
        prefix: String,
        format: ImageFormat,
    },
}

impl RenderTarget {
    /// The path handed to the encoder: the video file, or the numbered
    /// frame pattern.
    pub fn encoder_output(&self) -> PathBuf {
        match self {
            Self::VideoFile(path) => path.clone(),
            Self::ImageSequence {
                folder,
                prefix,
                format,
            } => sequence_pattern(folder, prefix, *format),
        }
    }
}

/// The version number embedded in a file or folder name, if any.
pub fn version_of(name: &str) -> Option<u32> {
    version_pattern()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Whether the file name of `path` carries a version token.
pub fn is_filename_incrementable(path: &Path) -> bool {
    path.file_name()
        .map(|name| version_pattern().is_match(&name.to_string_lossy()))
        .unwrap_or(false)
}

fn bump_version(name: &str) -> Option<String> {
    let caps = version_pattern().captures(name)?;
    let digits = caps.get(1)?;
    let number: u32 = digits.as_str().parse().ok()?;
    let width = digits.as_str().len().clamp(2, 4);
    let mut bumped = String::with_capacity(name.len() + 1);
    bumped.push_str(&name[..digits.start()]);
    bumped.push_str(&format!("{:0width$}", number + 1));
    bumped.push_str(&name[digits.end()..]);
    Some(bumped)
}

fn append_first_version(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_v01.{ext}"),
        _ => format!("{name}_v01"),
    }
}

/// The next version of `path`: `clip_v01.mp4` becomes `clip_v02.mp4` and
/// `clip_v0099.mp4` becomes `clip_v0100.mp4`. Names without a version get
/// `_v01` before the extension.
pub fn next_incremented_path(path: &Path) -> PathBuf {
    let Some(file_name) = path.file_name() else {
        return path.join("output_v01");
    };
    let file_name = file_name.to_string_lossy();
    let next = bump_version(&file_name).unwrap_or_else(|| append_first_version(&file_name));
    path.with_file_name(next)
}

/// Replace characters that are invalid in file names with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "output".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolve paths starting with `.` against the project directory, or against
/// `default_root` when there is no project. Other paths are returned as is.
pub fn resolve_project_relative_path(
    path: &Path,
    project_dir: Option<&Path>,
    default_root: &Path,
) -> PathBuf {
    if !path.to_string_lossy().starts_with('.') {
        return path.to_path_buf();
    }
    let relative = path.strip_prefix(".").unwrap_or(path);
    match project_dir {
        Some(dir) => dir.join(relative),
        None => default_root.join(relative),
    }
}

/// First versioned `sub_folder` under `main_folder` that does not exist yet.
pub fn next_version_for_folder(main_folder: &Path, sub_folder: &str) -> PathBuf {
    let mut candidate = if version_pattern().is_match(sub_folder) {
        sub_folder.to_string()
    } else {
        format!("{sub_folder}_v01")
    };

    for _ in 0..MAX_VERSION_ATTEMPTS {
        let path = main_folder.join(&candidate);
        if !path.exists() {
            return path;
        }
        match bump_version(&candidate) {
            Some(next) => candidate = next,
            None => return path,
        }
    }
    tracing::warn!(
        folder = %main_folder.display(),
        sub_folder,
        "No free version folder found"
    );
    main_folder.join(candidate)
}

/// `<folder>/<prefix>_%04d.<ext>`.
pub fn sequence_pattern(folder: &Path, prefix: &str, format: ImageFormat) -> PathBuf {
    folder.join(format!("{prefix}_%04d.{}", format.extension()))
}

/// Whether rendering to `target` would overwrite something.
///
/// A sequence counts as taken when its first frame exists or the folder
/// already holds files with the same prefix.
pub fn target_exists(target: &RenderTarget) -> bool {
    match target {
        RenderTarget::VideoFile(path) => path.exists(),
        RenderTarget::ImageSequence {
            folder,
            prefix,
            format,
        } => {
            let frame = |index: u32| folder.join(format!("{prefix}_{index:04}.{}", format.extension()));
            if frame(0).exists() || frame(1).exists() {
                return true;
            }
            let frame_prefix = format!("{prefix}_");
            std::fs::read_dir(folder)
                .map(|entries| {
                    entries.flatten().any(|entry| {
                        entry.file_name().to_string_lossy().starts_with(&frame_prefix)
                    })
                })
                .unwrap_or(false)
        }
    }
}

/// Resolve the destination of a render.
///
/// Video files that already exist are replaced by the next free version when
/// `auto_increment_version` is on. Sequences go into `<folder>/<sub_folder>`
/// (auto-incremented when requested) or directly into `<folder>`.
pub fn resolve_target(
    settings: &RenderSettings,
    layout: &SequenceLayout,
    project_dir: Option<&Path>,
    default_root: &Path,
) -> RenderTarget {
    match settings.mode {
        RenderMode::Video => {
            let mut path =
                resolve_project_relative_path(&settings.output_path, project_dir, default_root);
            if settings.auto_increment_version && is_filename_incrementable(&path) {
                let mut attempts = 0;
                while path.exists() && attempts < MAX_VERSION_ATTEMPTS {
                    path = next_incremented_path(&path);
                    attempts += 1;
                }
            }
            RenderTarget::VideoFile(path)
        }
        RenderMode::ImageSequence => {
            let base = resolve_project_relative_path(&layout.folder, project_dir, default_root);
            let sub_folder = sanitize_filename(&layout.sub_folder);
            let folder = match (layout.create_sub_folder, layout.auto_increment_sub_folder) {
                (false, _) => base,
                (true, true) => next_version_for_folder(&base, &sub_folder),
                (true, false) => base.join(sub_folder),
            };
            RenderTarget::ImageSequence {
                folder,
                prefix: sanitize_filename(&layout.prefix),
                format: settings.image_format,
            }
        }
    }
}

/// The path the following render would use: the next video file name, or
/// the next sequence folder for a `%04d` frame pattern.
pub fn next_version_for_output(mode: RenderMode, output: &Path) -> Option<PathBuf> {
    let versioned = match mode {
        RenderMode::Video => output,
        RenderMode::ImageSequence => output.parent()?,
    };
    is_filename_incrementable(versioned).then(|| next_incremented_path(versioned))
}
