//! Sightline CLI: spoken scene narration from the command line.
//!
//! Usage:
//!   cargo run -p sightline-cli -- --start [--auto] [--interval 4000] [--duration 30]
//!                                 [--mode navigation] [--verbosity minimal] [--rate 1.25]
//!
//! Captures frames, narrates them through the configured vision backend, and
//! speaks each narration aloud. Without --auto it describes the scene once;
//! with --auto it narrates on a schedule until the duration elapses or Ctrl+C.

use sightline_core::{
    create_best_speech, create_best_vision, AnalysisClient, NarrationMode, NarrationPipeline,
    NarrationSettings, PipelineConfig, PipelineEvent, SyntheticCamera,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Synthetic capture resolution until a hardware provider is wired in.
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// Session length for --auto runs.
const DEFAULT_DURATION_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[sightline] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let start = args.next().as_deref() == Some("--start");
    let mut mode = NarrationMode::General;
    let mut settings = NarrationSettings::default();
    let mut duration_secs: u64 = DEFAULT_DURATION_SECS;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--auto" => settings.auto_narration = true,
            "--interval" => {
                if let Some(ms) = args.next() {
                    settings.set_auto_interval_ms(ms.parse().unwrap_or(settings.auto_interval_ms));
                }
            }
            "--duration" => {
                if let Some(d) = args.next() {
                    duration_secs = d.parse().unwrap_or(DEFAULT_DURATION_SECS);
                }
            }
            "--mode" => {
                if let Some(m) = args.next() {
                    match m.parse() {
                        Ok(parsed) => mode = parsed,
                        Err(e) => eprintln!("[sightline] {}", e),
                    }
                }
            }
            "--verbosity" => {
                if let Some(v) = args.next() {
                    match v.parse() {
                        Ok(parsed) => settings.verbosity = parsed,
                        Err(e) => eprintln!("[sightline] {}", e),
                    }
                }
            }
            "--rate" => {
                if let Some(r) = args.next() {
                    settings.set_speech_rate(r.parse().unwrap_or(1.0));
                }
            }
            _ => {}
        }
    }

    if !start {
        eprintln!("Sightline — spoken scene narration");
        eprintln!("  --start             Open the camera and narrate");
        eprintln!("  --auto              Narrate on a schedule instead of once");
        eprintln!("  --interval MS       Auto period, snapped to 2000/4000/8000 (default 4000)");
        eprintln!("  --duration N        Session length in seconds (default 30)");
        eprintln!("  --mode M            general | text | social | navigation | shopping");
        eprintln!("  --verbosity V       minimal | standard | detailed");
        eprintln!("  --rate R            Speech rate, 0.5 to 2.0 (default 1.0)");
        eprintln!();
        eprintln!("Requires VISION_API_KEY or OPENAI_API_KEY for real narration (else placeholder).");
        eprintln!("TTS_API_KEY enables spoken output; without it narrations are printed only.");
        return Ok(());
    }

    info!(
        "Sightline: starting (mode {}, verbosity {:?}, auto {})",
        mode, settings.verbosity, settings.auto_narration
    );

    let camera = Arc::new(SyntheticCamera::new(DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT));
    let analyzer = AnalysisClient::new(Arc::from(create_best_vision()?));
    let speech = create_best_speech()?;

    let auto = settings.auto_narration;
    let config = PipelineConfig {
        mode,
        settings,
        ..Default::default()
    };
    let mut session = NarrationPipeline::new(camera, analyzer, speech)
        .with_config(config)
        .start();

    session.handle.activate().await?;
    if !auto {
        session.handle.narrate().await?;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration_secs);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                info!("Sightline: session time is up");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("CTRL-C received; shutting down");
                break;
            }
            event = session.events.recv() => match event {
                Some(PipelineEvent::Narrated { result, .. }) => {
                    println!(
                        "[{}] {}",
                        result.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
                        result.text
                    );
                    if !auto {
                        break;
                    }
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    let transcript = session.handle.transcript().await?;
    if transcript.len() > 1 {
        println!();
        println!("Session transcript (newest first):");
        for entry in &transcript {
            println!(
                "  [{}] {}",
                entry.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
                entry.text
            );
        }
    }

    session.handle.shutdown().await?;
    info!("Sightline: done. {} narration(s) this session", transcript.len());
    Ok(())
}
