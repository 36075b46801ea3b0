//! Spoken narration via an OpenAI-compatible TTS API and a local audio sink.
//!
//! [`TtsSpeech`] implements [`SpeechDevice`]. A dedicated worker thread owns
//! the audio output (rodio's stream handle cannot leave its thread),
//! synthesizes each utterance over HTTP, and appends it to a shared
//! `rodio::Sink`. `cancel_all` bumps an epoch so jobs queued before the
//! cancel are discarded, and stops the sink immediately.

use crate::error::{SightError, SightResult};
use crate::speech::{PlaceholderSpeech, SpeechDevice, Utterance, VoiceInfo};
use rodio::{OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use tracing::{info, warn};

/// Voices offered by OpenAI-compatible TTS endpoints.
pub const OPENAI_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Production TTS backend: OpenAI-compatible speech API (OpenAI, OpenRouter, etc.).
/// Uses `TTS_API_URL` (e.g. https://api.openai.com/v1), `TTS_API_KEY`, and
/// `TTS_MODEL` (default tts-1).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    /// HTTP client (blocking) for the synthesis worker thread.
    client: reqwest::blocking::Client,
}

impl OpenAiTts {
    /// Build from environment: TTS_API_URL, TTS_API_KEY (or OPENAI_API_KEY), TTS_MODEL.
    pub fn from_env() -> SightResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| SightError::Config("TTS requires TTS_API_KEY or OPENAI_API_KEY".to_string()))?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        Self::new(base_url, api_key, model)
    }

    /// Create with explicit config (e.g. for tests or non-env wiring).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> SightResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| SightError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Synthesize text to audio bytes (MP3). Returns empty bytes for empty text.
    /// `speed` maps to the API's playback rate, 0.5 to 2.0.
    pub fn synthesize(&self, text: &str, voice: Option<&str>, speed: f32) -> SightResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice.unwrap_or("alloy"),
            "speed": speed,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| SightError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(SightError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| SightError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

struct SpeechJob {
    utterance: Utterance,
    epoch: u64,
}

struct TtsShared {
    /// Jobs accepted but not yet synthesized and appended.
    pending: AtomicUsize,
    /// Bumped by `cancel_all`; jobs stamped with an older epoch are dropped.
    epoch: AtomicU64,
    /// Published by the worker once the audio device is open.
    sink: Mutex<Option<Arc<Sink>>>,
}

/// Speech device backed by [`OpenAiTts`] synthesis and rodio playback.
pub struct TtsSpeech {
    tx: Mutex<mpsc::Sender<SpeechJob>>,
    shared: Arc<TtsShared>,
    voices: Vec<VoiceInfo>,
    _worker: thread::JoinHandle<()>,
}

impl TtsSpeech {
    /// Start the playback worker. Fails if no audio output device is available.
    pub fn new(backend: OpenAiTts) -> SightResult<Self> {
        let (tx, rx) = mpsc::channel::<SpeechJob>();
        let (ready_tx, ready_rx) = mpsc::channel::<SightResult<()>>();
        let shared = Arc::new(TtsShared {
            pending: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            sink: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("sightline-tts".to_string())
            .spawn(move || playback_worker(backend, rx, ready_tx, worker_shared))
            .map_err(|e| SightError::Playback(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| SightError::Playback("speech worker exited during startup".to_string()))??;

        info!("🔊 TTS playback worker ready");
        let voices = OPENAI_VOICES
            .iter()
            .map(|id| VoiceInfo {
                id: (*id).to_string(),
                language: "en-US".to_string(),
                local: false,
            })
            .collect();

        Ok(Self {
            tx: Mutex::new(tx),
            shared,
            voices,
            _worker: worker,
        })
    }
}

fn playback_worker(
    backend: OpenAiTts,
    rx: mpsc::Receiver<SpeechJob>,
    ready_tx: mpsc::Sender<SightResult<()>>,
    shared: Arc<TtsShared>,
) {
    // OutputStream must be created and kept on this thread.
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready_tx.send(Err(SightError::Playback(e.to_string())));
            return;
        }
    };
    let sink = match Sink::try_new(&handle) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            let _ = ready_tx.send(Err(SightError::Playback(e.to_string())));
            return;
        }
    };
    *shared.sink.lock().unwrap() = Some(Arc::clone(&sink));
    let _ = ready_tx.send(Ok(()));

    while let Ok(SpeechJob { utterance, epoch }) = rx.recv() {
        if shared.epoch.load(Ordering::SeqCst) != epoch {
            // Cancelled while waiting in the queue.
            shared.pending.fetch_sub(1, Ordering::SeqCst);
            continue;
        }
        match backend.synthesize(&utterance.text, utterance.voice.as_deref(), utterance.rate) {
            Ok(bytes) if !bytes.is_empty() => match rodio::Decoder::new(Cursor::new(bytes)) {
                Ok(source) => {
                    // Pitch shift by resampling; urgent speech plays slightly
                    // faster as well as higher.
                    let source = source
                        .speed(utterance.pitch)
                        .amplify(utterance.volume)
                        .convert_samples::<f32>();
                    if shared.epoch.load(Ordering::SeqCst) == epoch {
                        sink.append(source);
                    }
                }
                Err(e) => warn!("🔊 TTS decode failed: {}", e),
            },
            Ok(_) => {}
            Err(e) => warn!("🔊 TTS synthesis failed: {}", e),
        }
        shared.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SpeechDevice for TtsSpeech {
    fn is_speaking(&self) -> bool {
        if self.shared.pending.load(Ordering::SeqCst) > 0 {
            return true;
        }
        self.shared
            .sink
            .lock()
            .unwrap()
            .as_ref()
            .map(|sink| !sink.empty())
            .unwrap_or(false)
    }

    fn cancel_all(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(sink) = self.shared.sink.lock().unwrap().as_ref() {
            sink.stop();
        }
    }

    fn enqueue(&self, utterance: Utterance) {
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let send_failed = self
            .tx
            .lock()
            .unwrap()
            .send(SpeechJob { utterance, epoch })
            .is_err();
        if send_failed {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("🔊 Speech worker is gone, dropping utterance");
        }
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }
}

/// Create the best available speech device from environment.
/// Priority: (1) TtsSpeech if a TTS key is set and an audio device opens,
/// (2) PlaceholderSpeech.
pub fn create_best_speech() -> SightResult<Arc<dyn SpeechDevice>> {
    if let Ok(backend) = OpenAiTts::from_env() {
        match TtsSpeech::new(backend) {
            Ok(device) => return Ok(Arc::new(device)),
            Err(e) => warn!("🔊 Audio output unavailable ({}), using placeholder speech", e),
        }
    }
    Ok(Arc::new(PlaceholderSpeech::new()))
}
