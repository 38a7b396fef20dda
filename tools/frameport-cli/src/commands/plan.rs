//! Dry run: show what a render would do without starting the encoder.

use frameport_common::{human_readable_duration, AppConfig};
use frameport_render_engine::codec::{self, EncodeTarget};
use frameport_render_engine::paths::target_exists;
use frameport_render_engine::timing::count_frames;
use frameport_render_engine::EncoderBinary;
use frameport_render_model::{bits_per_pixel_second, estimated_size_mb, quality_for, RenderMode};

use crate::args::{describe_target, RenderArgs};

pub fn run(args: RenderArgs, config: &AppConfig) -> anyhow::Result<()> {
    let playback = args.playback();
    let prepared = args.prepare(&config.render, &playback)?;
    let settings = &prepared.settings;

    let frames = count_frames(settings, &playback);
    let duration_secs = frames as f64 / settings.fps;
    let target = EncodeTarget::from_settings(settings);

    println!("Render plan");
    match settings.mode {
        RenderMode::Video => println!("  Mode: video ({})", settings.codec),
        RenderMode::ImageSequence => {
            println!("  Mode: image sequence ({})", settings.image_format.extension())
        }
    }
    println!(
        "  Range: {} to {} {} ({})",
        settings.start, settings.end, settings.reference, settings.time_range
    );
    println!(
        "  Frames: {frames} @ {} fps ({})",
        settings.fps,
        human_readable_duration(duration_secs)
    );
    println!("  Resolution: {}", prepared.texture_size);
    println!("  Audio: {}", if settings.wants_audio() { "yes" } else { "no" });

    if settings.mode == RenderMode::Video && settings.codec.uses_bitrate() {
        let bpps = bits_per_pixel_second(settings.bitrate, prepared.texture_size, settings.fps);
        let quality = quality_for(bpps);
        println!(
            "  Quality: {} ({bpps:.3} bits/pixel/s) - {}",
            quality.title, quality.description
        );
        println!(
            "  Estimated size: {:.1} MB",
            estimated_size_mb(settings.bitrate, duration_secs)
        );
    }

    println!("  Target: {}", describe_target(&prepared.target));
    if target_exists(&prepared.target) {
        println!("  [WARN] Target already exists and will be overwritten");
    }

    let binary = EncoderBinary::from_config(&config.encoder);
    let video_args = codec::video_pass_args(
        &target,
        prepared.texture_size,
        settings.fps,
        &settings.output_path,
    );
    println!();
    println!("Encoder:");
    println!("  {} {}", binary.program, video_args.join(" "));
    if settings.wants_audio() {
        println!("  (video goes to a scratch file first, then audio is muxed in a second pass)");
    }

    Ok(())
}
