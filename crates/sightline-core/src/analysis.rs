//! **Analysis Client** — turn a frame into spoken-ready narration text.
//!
//! Implement `VisionBackend` for any OpenAI-compatible vision API or a local
//! model. `AnalysisClient::analyze` wraps a backend with instruction building,
//! urgency classification, and a deterministic fallback: it never fails, a
//! transport error becomes a normal-priority "connection trouble" narration.

use crate::camera::EncodedFrame;
use crate::error::{SightError, SightResult};
use crate::prompt;
use crate::settings::{NarrationMode, Verbosity};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Marker the vision model is instructed to prefix when it sees danger.
pub const URGENCY_MARKER: &str = "WARNING";

/// Secondary marker also treated as urgent when present in a response.
pub const CAUTION_MARKER: &str = "CAUTION";

/// Spoken when the analysis service cannot be reached.
pub const FALLBACK_TEXT: &str =
    "I could not analyze the scene due to a connection problem. Please try again.";

/// How a narration should be treated by the speech arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Interrupts any ongoing speech immediately
    Urgent,
    Normal,
}

/// One narration produced by the analysis client. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationResult {
    pub text: String,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
}

impl NarrationResult {
    /// Classify and timestamp a narration from raw response text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let priority = classify_priority(&text);
        Self {
            text,
            priority,
            timestamp: Utc::now(),
        }
    }

    /// The deterministic result used when analysis fails.
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_TEXT.to_string(),
            priority: Priority::Normal,
            timestamp: Utc::now(),
        }
    }
}

/// Scan narration text for urgency markers, case-insensitively and in any position.
pub fn classify_priority(text: &str) -> Priority {
    let upper = text.to_uppercase();
    if upper.contains(URGENCY_MARKER) || upper.contains(CAUTION_MARKER) {
        Priority::Urgent
    } else {
        Priority::Normal
    }
}

/// Backend that turns a frame plus instruction into narration text.
/// Implement for OpenAI-compatible vision APIs or local models.
#[async_trait::async_trait]
pub trait VisionBackend: Send + Sync {
    /// Describe one frame following the instruction. Errors are recovered
    /// by the caller, so report transport failures honestly.
    async fn describe_frame(&self, frame: &EncodedFrame, instruction: &str) -> SightResult<String>;
}

/// Placeholder vision backend: returns a fixed string. Use for exercising the
/// pipeline without a camera-to-API round trip.
#[derive(Debug, Default)]
pub struct PlaceholderVision {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: String) -> Self {
        Self { response: Some(s) }
    }
}

#[async_trait::async_trait]
impl VisionBackend for PlaceholderVision {
    async fn describe_frame(
        &self,
        frame: &EncodedFrame,
        _instruction: &str,
    ) -> SightResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[Vision placeholder: {} byte frame at {}x{}, connect an OpenAI-compatible vision API]",
            frame.jpeg.len(),
            frame.width,
            frame.height
        ))
    }
}

/// Production vision backend: OpenAI-compatible chat completions with image input.
/// Uses `VISION_API_URL` (e.g. https://api.openai.com/v1), `VISION_API_KEY`, and
/// `VISION_MODEL` (default gpt-4o-mini).
#[derive(Debug, Clone)]
pub struct OpenAiVision {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Vision-capable chat model (gpt-4o-mini, gpt-4o, etc.).
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiVision {
    /// Build from environment: VISION_API_URL, VISION_API_KEY (or OPENAI_API_KEY), VISION_MODEL.
    pub fn from_env() -> SightResult<Self> {
        let base_url = std::env::var("VISION_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("VISION_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                SightError::Config("vision requires VISION_API_KEY or OPENAI_API_KEY".to_string())
            })?;
        let model = std::env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Self::new(base_url, api_key, model)
    }

    /// Create with explicit config (e.g. for tests or non-env wiring).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> SightResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SightError::Analysis(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl VisionBackend for OpenAiVision {
    async fn describe_frame(&self, frame: &EncodedFrame, instruction: &str) -> SightResult<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let image_url = format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(&frame.jpeg)
        );
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": image_url } }
                ]
            }],
            "max_tokens": 300,
            "temperature": 0.3,
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SightError::Analysis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SightError::Analysis(format!(
                "vision API error {}: {}",
                status, body
            )));
        }
        let json: serde_json::Value = res
            .json()
            .await
            .map_err(|e| SightError::Analysis(e.to_string()))?;
        let text = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(SightError::Analysis(
                "response contained no narration text".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Create the best available vision backend from environment.
/// Priority: (1) OpenAiVision if an API key is set, (2) PlaceholderVision.
pub fn create_best_vision() -> SightResult<Box<dyn VisionBackend>> {
    if let Ok(vision) = OpenAiVision::from_env() {
        return Ok(Box::new(vision));
    }
    Ok(Box::new(PlaceholderVision::new()))
}

/// Wraps a vision backend with prompt building, urgency classification, and
/// the deterministic fallback. Clones share the backend; each spawned
/// analysis task takes one.
#[derive(Clone)]
pub struct AnalysisClient {
    backend: Arc<dyn VisionBackend>,
}

impl AnalysisClient {
    pub fn new(backend: Arc<dyn VisionBackend>) -> Self {
        Self { backend }
    }

    /// Analyze one frame. Never fails: transport errors become the
    /// fallback narration, priority normal.
    pub async fn analyze(
        &self,
        frame: &EncodedFrame,
        mode: NarrationMode,
        verbosity: Verbosity,
    ) -> NarrationResult {
        let instruction = prompt::build_instruction(mode, verbosity);
        match self.backend.describe_frame(frame, &instruction).await {
            Ok(text) => NarrationResult::new(text),
            Err(err) => {
                warn!("🔍 Vision analysis failed: {}, speaking fallback", err);
                NarrationResult::fallback()
            }
        }
    }
}
