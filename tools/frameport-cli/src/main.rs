//! Frameport CLI: drive the export pipeline from the command line.
//!
//! Usage:
//!   frameport render [OPTIONS]          Export the built-in test scene
//!   frameport plan [OPTIONS]            Show what a render would do
//!   frameport next-version <PATH>       Print the next versioned output path
//!   frameport check                     Check that the encoder can be run

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use frameport_common::config::{config_file_path, AppConfig, LoggingConfig};
use frameport_render_model::RenderMode;

mod args;
mod commands;
mod scene;

use args::RenderArgs;

#[derive(Parser)]
#[command(
    name = "frameport",
    about = "Export rendered frames and audio through ffmpeg",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the standard location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the synthetic test scene to a video or image sequence
    Render {
        #[command(flatten)]
        render: RenderArgs,

        /// Tick at the render frame rate instead of as fast as possible
        #[arg(long)]
        realtime: bool,

        /// Print the export report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dry run: frame count, quality estimate, target path and encoder arguments
    Plan {
        #[command(flatten)]
        render: RenderArgs,
    },

    /// Print the path the next render of PATH would use
    NextVersion {
        /// Video file or frame pattern
        path: PathBuf,

        /// Render mode: video or sequence
        #[arg(long, default_value = "video")]
        mode: RenderMode,
    },

    /// Check that the configured encoder can be run
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let logging = if cli.verbose {
        LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        }
    } else {
        config.logging.clone()
    };
    frameport_common::logging::init_logging(&logging);

    let config_path = cli.config.unwrap_or_else(config_file_path);

    match cli.command {
        Commands::Render {
            render,
            realtime,
            json,
        } => commands::render::run(render, &config, realtime, json).await,
        Commands::Plan { render } => commands::plan::run(render, &config),
        Commands::NextVersion { path, mode } => commands::next_version::run(path, mode),
        Commands::Check => commands::check::run(&config, &config_path),
    }
}
