//! Example: One-Shot Scene Narration
//!
//! Captures a single frame, describes it with the best available vision
//! backend, and speaks the result through the best available speech device.
//!
//! Set `VISION_API_KEY` and `TTS_API_KEY` (or `OPENAI_API_KEY`) in `.env`
//! for production backends; without keys both fall back to placeholders.

use sightline_core::{
    create_best_speech, create_best_vision, snapshot, AnalysisClient, CameraProvider,
    NarrationMode, NarrationSettings, SpeechArbiter, SyntheticCamera, Verbosity,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("👁️ Sightline One-Shot Narration");
    info!("Set VISION_API_KEY (or OPENAI_API_KEY) for real scene descriptions.");
    info!("");

    // Capture one frame
    let camera = SyntheticCamera::new(640, 480);
    let mut stream = camera.open()?;
    let frame = snapshot(stream.as_mut()).ok_or("no frame available")?;
    info!(
        "📸 Captured a {} byte snapshot ({}x{})",
        frame.jpeg.len(),
        frame.width,
        frame.height
    );

    // Describe it
    let analyzer = AnalysisClient::new(Arc::from(create_best_vision()?));
    let result = analyzer
        .analyze(&frame, NarrationMode::General, Verbosity::Standard)
        .await;
    info!("🗣️ Narration ({:?}): {}", result.priority, result.text);

    // Speak it
    let arbiter = SpeechArbiter::new(create_best_speech()?);
    arbiter.speak(&result.text, result.priority, &NarrationSettings::default());

    // Leave the playback worker time to synthesize and play.
    tokio::time::sleep(Duration::from_secs(5)).await;

    info!("👋 Done");
    Ok(())
}
