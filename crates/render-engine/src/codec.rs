//! Encoder argument construction.
//!
//! Each codec and image format maps to one static [`CodecProfile`]; the
//! argument builders below are the only place that turns a profile into an
//! ffmpeg command line.

use std::path::Path;

use frameport_render_model::{
    ImageFormat, RenderMode, RenderSettings, Resolution, SpeedPreset, VideoCodec,
};

/// Dimension rounding applied before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFilter {
    None,
    /// Round both edges down to an even number (4:2:0 chroma).
    Even,
    /// Round both edges down to a multiple of 4 (DXT blocks).
    MultipleOf4,
}

impl ScaleFilter {
    pub fn expression(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Even => Some("scale=trunc(iw/2)*2:trunc(ih/2)*2"),
            Self::MultipleOf4 => Some("scale=trunc(iw/4)*4:trunc(ih/4)*4"),
        }
    }
}

/// Static encoder parameters for one output kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecProfile {
    pub extension: &'static str,
    /// Value passed to `-f`.
    pub container: &'static str,
    pub video_codec: &'static str,
    pub pix_fmt: &'static str,
    pub scale: ScaleFilter,
    pub uses_bitrate: bool,
    pub uses_crf: bool,
    pub uses_preset: bool,
    pub extra_args: &'static [&'static str],
}

pub fn video_profile(codec: VideoCodec) -> CodecProfile {
    match codec {
        VideoCodec::H264 => CodecProfile {
            extension: "mp4",
            container: "mp4",
            video_codec: "libx264",
            pix_fmt: "yuv420p",
            scale: ScaleFilter::Even,
            uses_bitrate: true,
            uses_crf: true,
            uses_preset: true,
            extra_args: &["-movflags", "+faststart"],
        },
        VideoCodec::OpenH264 => CodecProfile {
            extension: "mp4",
            container: "mp4",
            video_codec: "libopenh264",
            pix_fmt: "yuv420p",
            scale: ScaleFilter::Even,
            uses_bitrate: true,
            uses_crf: false,
            uses_preset: false,
            extra_args: &[],
        },
        VideoCodec::ProRes => CodecProfile {
            extension: "mov",
            container: "mov",
            video_codec: "prores_ks",
            pix_fmt: "yuv422p10le",
            scale: ScaleFilter::None,
            uses_bitrate: true,
            uses_crf: false,
            uses_preset: false,
            extra_args: &[],
        },
        VideoCodec::Hap => CodecProfile {
            extension: "mov",
            container: "mov",
            video_codec: "hap",
            pix_fmt: "rgba",
            scale: ScaleFilter::MultipleOf4,
            uses_bitrate: false,
            uses_crf: false,
            uses_preset: false,
            extra_args: &[],
        },
        VideoCodec::HapAlpha => CodecProfile {
            extension: "mov",
            container: "mov",
            video_codec: "hap",
            pix_fmt: "rgba",
            scale: ScaleFilter::MultipleOf4,
            uses_bitrate: false,
            uses_crf: false,
            uses_preset: false,
            extra_args: &["-format", "hap_alpha"],
        },
        VideoCodec::Vp9 => CodecProfile {
            extension: "webm",
            container: "webm",
            video_codec: "libvpx-vp9",
            pix_fmt: "yuv420p",
            scale: ScaleFilter::Even,
            uses_bitrate: true,
            uses_crf: true,
            uses_preset: false,
            extra_args: &[],
        },
    }
}

pub fn image_profile(format: ImageFormat) -> CodecProfile {
    let base = CodecProfile {
        extension: format.extension(),
        container: "image2",
        video_codec: "png",
        pix_fmt: "rgba",
        scale: ScaleFilter::None,
        uses_bitrate: false,
        uses_crf: false,
        uses_preset: false,
        extra_args: &[],
    };
    match format {
        ImageFormat::Png => base,
        ImageFormat::Jpeg => CodecProfile {
            video_codec: "mjpeg",
            pix_fmt: "yuvj444p",
            extra_args: &["-q:v", "2"],
            ..base
        },
        ImageFormat::Webp => CodecProfile {
            video_codec: "libwebp",
            pix_fmt: "yuva420p",
            ..base
        },
    }
}

/// `libopus` for WebM, `aac` for everything else.
pub fn audio_codec_for_container(container: &str) -> &'static str {
    if container.eq_ignore_ascii_case("webm") {
        "libopus"
    } else {
        "aac"
    }
}

/// What the first encoder pass produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodeTarget {
    Video {
        codec: VideoCodec,
        bitrate: u32,
        crf: Option<u8>,
        preset: SpeedPreset,
    },
    ImageSequence {
        format: ImageFormat,
    },
}

impl EncodeTarget {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        match settings.mode {
            RenderMode::Video => Self::Video {
                codec: settings.codec,
                bitrate: settings.bitrate,
                crf: settings.crf,
                preset: settings.preset,
            },
            RenderMode::ImageSequence => Self::ImageSequence {
                format: settings.image_format,
            },
        }
    }

    pub fn profile(&self) -> CodecProfile {
        match *self {
            Self::Video { codec, .. } => video_profile(codec),
            Self::ImageSequence { format } => image_profile(format),
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video { .. })
    }
}

/// Sample layout of the raw PCM side file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|item| item.to_string()));
}

/// Arguments that read raw BGRA frames from stdin, without audio.
pub fn rawvideo_input_args(resolution: Resolution, fps: f64) -> Vec<String> {
    let mut args = Vec::with_capacity(16);
    push_all(
        &mut args,
        &["-hide_banner", "-loglevel", "error", "-y", "-f", "rawvideo", "-pix_fmt", "bgra"],
    );
    args.push("-s:v".to_string());
    args.push(resolution.to_string());
    args.push("-r".to_string());
    args.push(fps.to_string());
    push_all(&mut args, &["-i", "-", "-an"]);
    args
}

/// Full argument list for the video (or image sequence) pass.
pub fn video_pass_args(
    target: &EncodeTarget,
    resolution: Resolution,
    fps: f64,
    output: &Path,
) -> Vec<String> {
    let profile = target.profile();
    let mut args = rawvideo_input_args(resolution, fps);

    push_all(&mut args, &["-c:v", profile.video_codec]);

    if let EncodeTarget::Video {
        bitrate,
        crf,
        preset,
        ..
    } = *target
    {
        if profile.uses_bitrate {
            args.push("-b:v".to_string());
            args.push(format!("{}k", bitrate / 1000));
        }
        if let Some(crf) = crf.filter(|_| profile.uses_crf) {
            args.push("-crf".to_string());
            args.push(crf.to_string());
        }
        if profile.uses_preset {
            push_all(&mut args, &["-preset", preset.as_str()]);
        }
    }

    push_all(&mut args, &["-pix_fmt", profile.pix_fmt]);
    if let Some(filter) = profile.scale.expression() {
        push_all(&mut args, &["-vf", filter]);
    }
    push_all(&mut args, profile.extra_args);

    if !target.is_video() {
        push_all(&mut args, &["-start_number", "0"]);
    }
    push_all(&mut args, &["-f", profile.container]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Argument list for the second pass that muxes the PCM side file into the
/// already encoded video stream.
pub fn mux_args(
    video: &Path,
    pcm: &Path,
    pcm_format: PcmFormat,
    volume: f32,
    container: &str,
    output: &Path,
) -> Vec<String> {
    let mut args = Vec::with_capacity(32);
    push_all(&mut args, &["-hide_banner", "-loglevel", "error", "-y", "-i"]);
    args.push(video.to_string_lossy().into_owned());
    push_all(&mut args, &["-f", "f32le", "-ar"]);
    args.push(pcm_format.sample_rate.to_string());
    args.push("-ac".to_string());
    args.push(pcm_format.channels.to_string());
    args.push("-i".to_string());
    args.push(pcm.to_string_lossy().into_owned());
    push_all(
        &mut args,
        &["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a"],
    );
    args.push(audio_codec_for_container(container).to_string());
    args.push("-af".to_string());
    args.push(format!("volume={volume}"));
    push_all(&mut args, &["-shortest", "-f", container]);
    args.push(output.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|arg| arg == flag)
            .and_then(|index| args.get(index + 1))
            .map(String::as_str)
    }

    fn h264(crf: Option<u8>) -> EncodeTarget {
        EncodeTarget::Video {
            codec: VideoCodec::H264,
            bitrate: 25_000_000,
            crf,
            preset: SpeedPreset::Fast,
        }
    }

    #[test]
    fn test_input_args_describe_raw_bgra_stdin() {
        let args = rawvideo_input_args(Resolution::new(1280, 720), 30.0);
        assert_eq!(value_after(&args, "-f"), Some("rawvideo"));
        assert_eq!(value_after(&args, "-pix_fmt"), Some("bgra"));
        assert_eq!(value_after(&args, "-s:v"), Some("1280x720"));
        assert_eq!(value_after(&args, "-r"), Some("30"));
        assert_eq!(value_after(&args, "-i"), Some("-"));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_h264_pass() {
        let args = video_pass_args(
            &h264(Some(18)),
            Resolution::new(1920, 1080),
            60.0,
            &PathBuf::from("/tmp/out.mp4"),
        );
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-b:v"), Some("25000k"));
        assert_eq!(value_after(&args, "-crf"), Some("18"));
        assert_eq!(value_after(&args, "-preset"), Some("fast"));
        assert_eq!(value_after(&args, "-movflags"), Some("+faststart"));
        assert_eq!(
            value_after(&args, "-vf"),
            Some("scale=trunc(iw/2)*2:trunc(ih/2)*2")
        );
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
        // Output pixel format comes after the input's bgra.
        let formats: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, arg)| *arg == "-pix_fmt")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(formats, vec!["bgra", "yuv420p"]);
    }

    #[test]
    fn test_crf_omitted_when_unset_or_unsupported() {
        let args = video_pass_args(&h264(None), Resolution::new(8, 8), 60.0, Path::new("o.mp4"));
        assert!(!args.contains(&"-crf".to_string()));

        let prores = EncodeTarget::Video {
            codec: VideoCodec::ProRes,
            bitrate: 50_000_000,
            crf: Some(20),
            preset: SpeedPreset::Slow,
        };
        let args = video_pass_args(&prores, Resolution::new(8, 8), 60.0, Path::new("o.mov"));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-preset".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
        assert_eq!(args[args.len() - 2], "mov");
    }

    #[test]
    fn test_openh264_takes_bitrate_only() {
        let target = EncodeTarget::Video {
            codec: VideoCodec::OpenH264,
            bitrate: 8_000_000,
            crf: Some(18),
            preset: SpeedPreset::Slow,
        };
        let args = video_pass_args(&target, Resolution::new(8, 8), 30.0, Path::new("o.mp4"));
        assert_eq!(value_after(&args, "-c:v"), Some("libopenh264"));
        assert_eq!(value_after(&args, "-b:v"), Some("8000k"));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-preset".to_string()));
    }

    #[test]
    fn test_hap_alpha_has_no_bitrate_and_four_pixel_alignment() {
        let target = EncodeTarget::Video {
            codec: VideoCodec::HapAlpha,
            bitrate: 25_000_000,
            crf: None,
            preset: SpeedPreset::Fast,
        };
        let args = video_pass_args(&target, Resolution::new(8, 8), 60.0, Path::new("o.mov"));
        assert!(!args.contains(&"-b:v".to_string()));
        assert_eq!(value_after(&args, "-format"), Some("hap_alpha"));
        assert_eq!(
            value_after(&args, "-vf"),
            Some("scale=trunc(iw/4)*4:trunc(ih/4)*4")
        );
    }

    #[test]
    fn test_image_sequence_pass() {
        let target = EncodeTarget::ImageSequence {
            format: ImageFormat::Jpeg,
        };
        let args = video_pass_args(
            &target,
            Resolution::new(64, 64),
            24.0,
            Path::new("/seq/v01/render_%04d.jpg"),
        );
        assert_eq!(value_after(&args, "-c:v"), Some("mjpeg"));
        assert_eq!(value_after(&args, "-q:v"), Some("2"));
        assert_eq!(value_after(&args, "-start_number"), Some("0"));
        assert!(!args.contains(&"-b:v".to_string()));
        assert_eq!(args[args.len() - 2], "image2");
    }

    #[test]
    fn test_mux_args_pick_audio_codec_by_container() {
        let format = PcmFormat {
            sample_rate: 44_100,
            channels: 2,
        };
        let args = mux_args(
            Path::new("/tmp/scratch.webm"),
            Path::new("/tmp/audio.pcm"),
            format,
            0.5,
            "webm",
            Path::new("/out/final.webm"),
        );
        assert_eq!(value_after(&args, "-c:a"), Some("libopus"));
        assert_eq!(value_after(&args, "-c:v"), Some("copy"));
        assert_eq!(value_after(&args, "-ar"), Some("44100"));
        assert_eq!(value_after(&args, "-ac"), Some("2"));
        assert_eq!(value_after(&args, "-af"), Some("volume=0.5"));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/out/final.webm"));

        assert_eq!(audio_codec_for_container("mp4"), "aac");
        assert_eq!(audio_codec_for_container("mov"), "aac");
    }

    #[test]
    fn test_every_video_codec_has_a_profile() {
        for codec in VideoCodec::ALL {
            let profile = video_profile(codec);
            assert_eq!(profile.uses_bitrate, codec.uses_bitrate());
            assert!(!profile.video_codec.is_empty());
        }
    }
}
