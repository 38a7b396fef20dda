//! Render the synthetic scene through the export pipeline.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use frameport_common::AppConfig;
use frameport_render_engine::{ExportJob, JobOptions, JobState, PlaybackEngine};
use tokio::time::MissedTickBehavior;

use crate::args::{describe_target, RenderArgs};
use crate::scene::{SineTone, TestPattern};

const TONE_HZ: f64 = 440.0;

pub async fn run(
    args: RenderArgs,
    config: &AppConfig,
    realtime: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut playback = args.playback();
    let prepared = args.prepare(&config.render, &playback)?;
    let mut audio = SineTone::new(TONE_HZ);
    let mut scene = TestPattern::new(prepared.texture_size);

    println!("Rendering test scene");
    println!("  Output: {}", describe_target(&prepared.target));
    println!("  Resolution: {}", prepared.texture_size);
    println!("  FPS: {}", prepared.settings.fps);
    println!();

    let period = if realtime {
        Duration::from_secs_f64(1.0 / prepared.settings.fps)
    } else {
        Duration::from_millis(1)
    };

    let (state, status, report) = {
        let mut job = ExportJob::new(
            prepared.settings,
            JobOptions::from_config(&config.encoder),
            &mut playback,
            &mut audio,
        );
        job.set_on_pipe_broken(Arc::new(|| {
            tracing::warn!("Encoder closed its input, the export will stop");
        }));
        job.start(prepared.texture_size)?;

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        while job.is_exporting() {
            tokio::select! {
                _ = &mut ctrl_c => {
                    job.cancel(Some("Cancelled by user"));
                }
                _ = ticker.tick() => {
                    scene.draw(job.playback().time_in_secs());
                    // The final tick waits for the encoder to drain and mux.
                    tokio::task::block_in_place(|| job.tick(&scene));
                    print!(
                        "\r  Progress: {:.1}% ({}/{} frames, {} skipped)  ",
                        job.progress() * 100.0,
                        job.frame_index(),
                        job.frame_count(),
                        job.skipped_ticks(),
                    );
                    std::io::stdout().flush().ok();
                }
            }
        }
        println!();

        (job.state(), job.status().to_string(), job.report().cloned())
    };

    match state {
        JobState::Completed => {
            println!("{status}");
            if let Some(report) = report {
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("  Output: {}", report.output_path.display());
                    println!(
                        "  Frames: {} encoded, {} ticks skipped",
                        report.frames_encoded, report.skipped_ticks
                    );
                    println!("  Audio: {:?} ({:.2}s mixed)", report.audio, audio.mixed_secs());
                    if let Some(next) = &report.next_version_path {
                        println!("  Next version: {}", next.display());
                    }
                }
            }
            Ok(())
        }
        JobState::Cancelled => {
            println!("{status}. Partial output left at {}", describe_target(&prepared.target));
            Ok(())
        }
        _ => anyhow::bail!("Export failed: {status}"),
    }
}
