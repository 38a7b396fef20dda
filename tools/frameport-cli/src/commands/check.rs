//! Check that the configured encoder can be run.

use std::path::Path;

use frameport_common::AppConfig;
use frameport_render_engine::{is_encoder_available, EncoderBinary};

pub fn run(config: &AppConfig, config_path: &Path) -> anyhow::Result<()> {
    println!("Frameport System Check");
    println!("{}", "=".repeat(50));

    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[--] Config: {} (not found, using defaults)", config_path.display());
    }

    let binary = EncoderBinary::from_config(&config.encoder);
    let command = std::iter::once(binary.program.as_str())
        .chain(binary.wrapper_args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    let available = is_encoder_available(&binary);
    if available {
        println!("[OK] Encoder: {command}");
    } else {
        println!("[FAIL] Encoder: {command} could not be run");
    }

    println!(
        "     Frame buffer: {} frames, {} pooled",
        config.encoder.frame_buffer_capacity, config.encoder.pooled_frames
    );
    println!(
        "     Timeouts: dispose {} ms, mux {} ms",
        config.encoder.dispose_timeout_ms, config.encoder.mux_timeout_ms
    );

    println!();
    if available {
        println!("Frameport is ready to export.");
        Ok(())
    } else {
        anyhow::bail!("Encoder not available. Install ffmpeg or set encoder.program in the config.")
    }
}
