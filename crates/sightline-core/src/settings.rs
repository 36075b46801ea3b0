//! Narration modes, verbosity tiers, and user settings
//!
//! Settings are a plain value threaded through the pipeline rather than
//! ambient global state, so rate/pitch/gating behavior is always a pure
//! function of explicit inputs.

use crate::error::SightError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the narrator should focus on in each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationMode {
    /// Overall scene description
    General,
    /// Read visible text aloud
    Text,
    /// People, expressions, and social cues
    Social,
    /// Obstacles, paths, and hazards
    Navigation,
    /// Products, labels, and prices
    Shopping,
}

impl NarrationMode {
    /// All modes, in presentation order
    pub const ALL: [NarrationMode; 5] = [
        NarrationMode::General,
        NarrationMode::Text,
        NarrationMode::Social,
        NarrationMode::Navigation,
        NarrationMode::Shopping,
    ];

    /// Short lowercase label (used in logs and CLI flags)
    pub fn label(&self) -> &'static str {
        match self {
            NarrationMode::General => "general",
            NarrationMode::Text => "text",
            NarrationMode::Social => "social",
            NarrationMode::Navigation => "navigation",
            NarrationMode::Shopping => "shopping",
        }
    }
}

impl Default for NarrationMode {
    fn default() -> Self {
        NarrationMode::General
    }
}

impl fmt::Display for NarrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NarrationMode {
    type Err = SightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "general" => Ok(NarrationMode::General),
            "text" => Ok(NarrationMode::Text),
            "social" => Ok(NarrationMode::Social),
            "navigation" => Ok(NarrationMode::Navigation),
            "shopping" => Ok(NarrationMode::Shopping),
            other => Err(SightError::Config(format!("unknown mode: {}", other))),
        }
    }
}

/// Requested response length tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Minimal,
    Standard,
    Detailed,
}

impl Verbosity {
    /// Maximum response length in words for this tier
    pub fn word_budget(&self) -> usize {
        match self {
            Verbosity::Minimal => 15,
            Verbosity::Standard => 40,
            Verbosity::Detailed => 70,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Standard
    }
}

impl FromStr for Verbosity {
    type Err = SightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(Verbosity::Minimal),
            "standard" => Ok(Verbosity::Standard),
            "detailed" => Ok(Verbosity::Detailed),
            other => Err(SightError::Config(format!("unknown verbosity: {}", other))),
        }
    }
}

/// Slowest supported speech rate
pub const MIN_SPEECH_RATE: f32 = 0.5;

/// Fastest supported speech rate
pub const MAX_SPEECH_RATE: f32 = 2.0;

/// Auto-narration periods offered to the user, in milliseconds
pub const AUTO_INTERVALS_MS: [u64; 3] = [2000, 4000, 8000];

/// User-tunable narration settings
///
/// A single shared instance lives inside the pipeline; the scheduler and
/// speech arbiter both read it, user actions are the only writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationSettings {
    /// Requested response length tier
    pub verbosity: Verbosity,

    /// Speech playback rate, clamped to [0.5, 2.0]
    pub speech_rate: f32,

    /// Whether the recurring auto-narration timer is enabled
    pub auto_narration: bool,

    /// Auto-narration period in milliseconds
    pub auto_interval_ms: u64,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Standard,
            speech_rate: 1.0,
            auto_narration: false,
            auto_interval_ms: 4000,
        }
    }
}

impl NarrationSettings {
    /// Set the speech rate, clamping out-of-range values
    pub fn set_speech_rate(&mut self, rate: f32) {
        self.speech_rate = rate.clamp(MIN_SPEECH_RATE, MAX_SPEECH_RATE);
    }

    /// Set the auto-narration interval, snapping to the nearest offered period
    pub fn set_auto_interval_ms(&mut self, interval_ms: u64) {
        self.auto_interval_ms = AUTO_INTERVALS_MS
            .iter()
            .copied()
            .min_by_key(|offered| offered.abs_diff(interval_ms))
            .unwrap_or(4000);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = NarrationSettings::default();
        assert_eq!(settings.verbosity, Verbosity::Standard);
        assert_eq!(settings.speech_rate, 1.0);
        assert!(!settings.auto_narration);
        assert_eq!(settings.auto_interval_ms, 4000);
    }

    #[test]
    fn test_speech_rate_clamped() {
        let mut settings = NarrationSettings::default();
        settings.set_speech_rate(3.5);
        assert_eq!(settings.speech_rate, MAX_SPEECH_RATE);
        settings.set_speech_rate(0.1);
        assert_eq!(settings.speech_rate, MIN_SPEECH_RATE);
        settings.set_speech_rate(1.25);
        assert_eq!(settings.speech_rate, 1.25);
    }

    #[test]
    fn test_interval_snaps_to_offered_periods() {
        let mut settings = NarrationSettings::default();
        settings.set_auto_interval_ms(2100);
        assert_eq!(settings.auto_interval_ms, 2000);
        settings.set_auto_interval_ms(7000);
        assert_eq!(settings.auto_interval_ms, 8000);
        settings.set_auto_interval_ms(8000);
        assert_eq!(settings.auto_interval_ms, 8000);
    }

    #[test]
    fn test_word_budgets() {
        assert_eq!(Verbosity::Minimal.word_budget(), 15);
        assert_eq!(Verbosity::Standard.word_budget(), 40);
        assert_eq!(Verbosity::Detailed.word_budget(), 70);
    }

    #[test]
    fn test_mode_round_trips_through_label() {
        for mode in NarrationMode::ALL {
            assert_eq!(mode.label().parse::<NarrationMode>().unwrap(), mode);
        }
    }
}
