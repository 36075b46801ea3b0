//! Analysis instructions for each narration mode and verbosity tier
//!
//! Instruction construction is a pure function of (mode, verbosity): the same
//! inputs always yield the same instruction string.

use crate::settings::{NarrationMode, Verbosity};

/// Framing shared by every mode.
pub const NARRATOR_PREAMBLE: &str = "You are the eyes of a blind or low-vision user wearing a camera. \
Speak directly to them in second person. Be concrete and spatial (\"to your left\", \"two steps ahead\"). \
Never mention that you are looking at an image.";

/// General scene description.
pub const GENERAL_TASK: &str = "Describe the scene in front of the user: the setting, \
the most prominent objects, and any ongoing activity.";

/// Read visible text.
pub const TEXT_TASK: &str = "Read any visible text aloud exactly as written: signs, \
labels, documents, or screens. If text is partially visible, say so.";

/// People and social cues.
pub const SOCIAL_TASK: &str = "Describe the people present: how many, what they are doing, \
their apparent expressions, and whether anyone is facing or approaching the user.";

/// Obstacles and paths.
pub const NAVIGATION_TASK: &str = "Identify obstacles, steps, curbs, doorways, and the \
clearest walking path directly ahead of the user.";

/// Products and prices.
pub const SHOPPING_TASK: &str = "Identify products, brand names, prices, and shelf labels \
near the center of the frame.";

/// Appended to every instruction so dangerous scenes are flagged up front.
pub const URGENCY_RULE: &str = "If anything in the scene poses immediate danger to the user, \
begin your response with \"WARNING:\" and name the hazard first.";

/// Fixed task description for a mode.
pub fn task_for(mode: NarrationMode) -> &'static str {
    match mode {
        NarrationMode::General => GENERAL_TASK,
        NarrationMode::Text => TEXT_TASK,
        NarrationMode::Social => SOCIAL_TASK,
        NarrationMode::Navigation => NAVIGATION_TASK,
        NarrationMode::Shopping => SHOPPING_TASK,
    }
}

/// Build the full analysis instruction for the given mode and verbosity.
pub fn build_instruction(mode: NarrationMode, verbosity: Verbosity) -> String {
    format!(
        "{} {} Respond in at most {} words. {}",
        NARRATOR_PREAMBLE,
        task_for(mode),
        verbosity.word_budget(),
        URGENCY_RULE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_is_deterministic() {
        for mode in NarrationMode::ALL {
            for verbosity in [Verbosity::Minimal, Verbosity::Standard, Verbosity::Detailed] {
                assert_eq!(
                    build_instruction(mode, verbosity),
                    build_instruction(mode, verbosity)
                );
            }
        }
    }

    #[test]
    fn test_navigation_minimal_instruction() {
        let instruction = build_instruction(NarrationMode::Navigation, Verbosity::Minimal);
        assert!(instruction.contains("obstacles"));
        assert!(instruction.contains("at most 15 words"));
        assert!(instruction.contains("WARNING:"));
    }

    #[test]
    fn test_every_instruction_carries_the_urgency_rule() {
        for mode in NarrationMode::ALL {
            let instruction = build_instruction(mode, Verbosity::Detailed);
            assert!(instruction.ends_with(URGENCY_RULE));
        }
    }

    #[test]
    fn test_word_budget_tracks_verbosity() {
        let minimal = build_instruction(NarrationMode::General, Verbosity::Minimal);
        let detailed = build_instruction(NarrationMode::General, Verbosity::Detailed);
        assert!(minimal.contains("15 words"));
        assert!(detailed.contains("70 words"));
    }
}
