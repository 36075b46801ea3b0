//! Bounded rolling history of narration results

use crate::analysis::NarrationResult;
use std::collections::VecDeque;

/// Maximum entries retained in the transcript
pub const TRANSCRIPT_CAPACITY: usize = 10;

/// Rolling narration history, newest first, capped at [`TRANSCRIPT_CAPACITY`].
/// Owned exclusively by the pipeline; readers get snapshots.
#[derive(Debug, Clone, Default)]
pub struct TranscriptLog {
    entries: VecDeque<NarrationResult>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a narration at the front, evicting the oldest beyond capacity.
    pub fn push(&mut self, result: NarrationResult) {
        self.entries.push_front(result);
        self.entries.truncate(TRANSCRIPT_CAPACITY);
    }

    /// Iterate entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &NarrationResult> {
        self.entries.iter()
    }

    /// Snapshot of the current history, newest first.
    pub fn to_vec(&self) -> Vec<NarrationResult> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
