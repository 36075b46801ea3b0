//! **Speech Arbiter** — decide whether narration interrupts, queues, or drops.
//!
//! Wraps a [`SpeechDevice`] with the interruption policy: urgent narration
//! always cuts in, fresh auto narration replaces a stale one in progress,
//! everything else rides the device's own queue. Fire-and-forget: no call
//! here returns a result.

use crate::analysis::Priority;
use crate::settings::NarrationSettings;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Pitch for normal narration
pub const NORMAL_PITCH: f32 = 1.0;

/// Pitch for urgent narration, raised so it stands out
pub const URGENT_PITCH: f32 = 1.2;

/// One configured speech request handed to the output device
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Voice identifier, `None` for the engine default
    pub voice: Option<String>,
}

/// A voice offered by the speech device
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceInfo {
    pub id: String,
    /// BCP 47 tag, e.g. "en-US"
    pub language: String,
    /// Installed on-device rather than streamed
    pub local: bool,
}

/// Prefer a local English voice, then any English voice, then the engine default.
pub fn select_voice(voices: &[VoiceInfo]) -> Option<String> {
    voices
        .iter()
        .find(|v| v.local && v.language.starts_with("en"))
        .or_else(|| voices.iter().find(|v| v.language.starts_with("en")))
        .map(|v| v.id.clone())
}

/// Speech output device: enqueue and cancel semantics, no return values.
pub trait SpeechDevice: Send + Sync {
    /// Whether an utterance is currently playing or queued.
    fn is_speaking(&self) -> bool;

    /// Halt the current utterance and clear the queue.
    fn cancel_all(&self);

    /// Append an utterance to the device queue.
    fn enqueue(&self, utterance: Utterance);

    /// Voices the device offers. Empty means default voice only.
    fn voices(&self) -> Vec<VoiceInfo>;
}

/// Applies the interruption policy on top of a speech device.
pub struct SpeechArbiter {
    device: Arc<dyn SpeechDevice>,
}

impl SpeechArbiter {
    pub fn new(device: Arc<dyn SpeechDevice>) -> Self {
        Self { device }
    }

    /// Speak a narration under the interruption policy.
    ///
    /// Empty text is a no-op. Urgent text halts whatever is playing. Normal
    /// text halts a narration in progress only while auto-narration is on
    /// (live commentary favors freshness); otherwise it joins the device
    /// queue behind the current utterance.
    pub fn speak(&self, text: &str, priority: Priority, settings: &NarrationSettings) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let speaking = self.device.is_speaking();
        match priority {
            Priority::Urgent => {
                if speaking {
                    info!("⚡ Urgent narration, interrupting current speech");
                }
                self.device.cancel_all();
            }
            Priority::Normal if speaking && settings.auto_narration => {
                debug!("🔊 Fresh auto narration replaces the one in progress");
                self.device.cancel_all();
            }
            Priority::Normal => {}
        }

        let pitch = match priority {
            Priority::Urgent => URGENT_PITCH,
            Priority::Normal => NORMAL_PITCH,
        };
        self.device.enqueue(Utterance {
            text: text.to_string(),
            rate: settings.speech_rate,
            pitch,
            volume: 1.0,
            voice: select_voice(&self.device.voices()),
        });
    }

    /// Halt all current and queued speech. Called on pipeline teardown.
    pub fn stop(&self) {
        self.device.cancel_all();
    }
}

/// What a [`PlaceholderSpeech`] device was asked to do, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechAction {
    Enqueue(Utterance),
    CancelAll,
}

#[derive(Debug, Default)]
struct PlaceholderState {
    actions: Vec<SpeechAction>,
    speaking: bool,
}

/// Placeholder speech device: records requests instead of playing audio.
/// Use for exercising arbitration without an output device. Stays "speaking"
/// from the first enqueue until cancelled (no real audio clock).
#[derive(Debug, Default)]
pub struct PlaceholderSpeech {
    state: Mutex<PlaceholderState>,
    voices: Vec<VoiceInfo>,
}

impl PlaceholderSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a fixed voice list instead of an empty one.
    pub fn with_voices(voices: Vec<VoiceInfo>) -> Self {
        Self {
            state: Mutex::new(PlaceholderState::default()),
            voices,
        }
    }

    /// Mark the device mid-utterance without enqueueing anything.
    pub fn set_speaking(&self, speaking: bool) {
        self.state.lock().unwrap().speaking = speaking;
    }

    /// Everything the device was asked to do, oldest first.
    pub fn actions(&self) -> Vec<SpeechAction> {
        self.state.lock().unwrap().actions.clone()
    }

    /// Only the enqueued utterances, oldest first.
    pub fn spoken(&self) -> Vec<Utterance> {
        self.state
            .lock()
            .unwrap()
            .actions
            .iter()
            .filter_map(|a| match a {
                SpeechAction::Enqueue(u) => Some(u.clone()),
                SpeechAction::CancelAll => None,
            })
            .collect()
    }
}

impl SpeechDevice for PlaceholderSpeech {
    fn is_speaking(&self) -> bool {
        self.state.lock().unwrap().speaking
    }

    fn cancel_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.actions.push(SpeechAction::CancelAll);
        state.speaking = false;
    }

    fn enqueue(&self, utterance: Utterance) {
        let mut state = self.state.lock().unwrap();
        state.actions.push(SpeechAction::Enqueue(utterance));
        state.speaking = true;
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.voices.clone()
    }
}
