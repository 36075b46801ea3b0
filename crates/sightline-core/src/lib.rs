//! # Sightline Core - Real-Time Scene Narration
//!
//! This crate implements the narration pipeline behind a camera-to-speech
//! assistant for blind and low-vision users: frame acquisition timing,
//! single-flight request discipline, mode/verbosity prompt selection,
//! urgency classification, and speech-output arbitration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Narration Pipeline                       │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Frame Source │→ │   Analysis   │→ │    Speech    │       │
//! │  │ (JPEG snap)  │  │   (vision)   │  │  (arbiter)   │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │         ↑                 ↓                  ↓              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │  Scheduler   │  │  Transcript  │  │  TTS Output  │       │
//! │  │ (tick/gate)  │  │  (last 10)   │  │   (rodio)    │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod analysis;
pub mod camera;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod scheduler;
pub mod settings;
pub mod speech;
pub mod transcript;
pub mod tts_playback;

pub use analysis::{
    classify_priority, create_best_vision, AnalysisClient, NarrationResult, OpenAiVision,
    PlaceholderVision, Priority, VisionBackend, CAUTION_MARKER, FALLBACK_TEXT, URGENCY_MARKER,
};
pub use camera::{
    snapshot, CameraProvider, EncodedFrame, RawFrame, SyntheticCamera, VideoStream,
    SNAPSHOT_JPEG_QUALITY, SNAPSHOT_SCALE,
};
pub use error::{SightError, SightResult};
pub use pipeline::{
    NarrationPipeline, PipelineConfig, PipelineEvent, PipelineHandle, PipelineSession,
    PipelineStatus, TriggerOrigin,
};
pub use prompt::build_instruction;
pub use scheduler::{AutoTicker, FlightGate, SettleTimer};
pub use settings::{
    NarrationMode, NarrationSettings, Verbosity, AUTO_INTERVALS_MS, MAX_SPEECH_RATE,
    MIN_SPEECH_RATE,
};
pub use speech::{
    select_voice, PlaceholderSpeech, SpeechAction, SpeechArbiter, SpeechDevice, Utterance,
    VoiceInfo, NORMAL_PITCH, URGENT_PITCH,
};
pub use transcript::{TranscriptLog, TRANSCRIPT_CAPACITY};
pub use tts_playback::{create_best_speech, OpenAiTts, TtsSpeech, OPENAI_VOICES};
