//! Streamed-reply splitting and duplicate suppression (§4.9 step 5).
//!
//! Assistant-message texts arriving from the engine are split on the
//! literal `---` separator, and a short rolling window of recently-sent
//! parts suppresses duplicates and substring overlaps that streaming and
//! the non-streaming fallback path can both produce for the same turn.

use std::time::{Duration, Instant};

use flowengine_core::config::DEDUP_WINDOW_SECS;

/// Split `text` on the literal `---` separator (with optional surrounding
/// whitespace/newlines), returning every non-empty trimmed part.
pub fn split_parts(text: &str) -> Vec<String> {
    text.split("---")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tracks parts already sent on one session so overlapping streamed and
/// fallback replies never duplicate content (§4.9 step 5b, step 6).
#[derive(Default)]
pub struct DedupState {
    sent: Vec<(String, Instant)>,
}

impl DedupState {
    pub fn new() -> Self {
        Self { sent: Vec::new() }
    }

    /// True when `part` should be suppressed: it exactly matches a recent
    /// send, is a substring of an already-sent part, or an already-sent
    /// part is a substring of it. Recording is the caller's job via
    /// [`DedupState::record`] once the part is actually emitted.
    pub fn is_duplicate(&self, part: &str, now: Instant) -> bool {
        let window = Duration::from_secs(DEDUP_WINDOW_SECS);
        self.sent.iter().any(|(sent, at)| {
            let within_window = now.saturating_duration_since(*at) <= window;
            let overlaps = sent == part || sent.contains(part) || part.contains(sent.as_str());
            // Substring overlap suppression applies for the lifetime of the
            // turn (no window), since it protects against the same content
            // reappearing across the streaming/fallback boundary; exact
            // repeats are only suppressed within the short dedup window.
            (within_window && sent == part) || overlaps
        })
    }

    pub fn record(&mut self, part: &str, now: Instant) {
        self.sent.push((part.to_string(), now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_separator_and_trims() {
        let parts = split_parts("Hello there.\n---\nHow can I help?\n---\n");
        assert_eq!(parts, vec!["Hello there.", "How can I help?"]);
    }

    #[test]
    fn no_separator_is_single_part() {
        assert_eq!(split_parts("just one part"), vec!["just one part"]);
    }

    #[test]
    fn exact_repeat_within_window_is_duplicate() {
        let mut state = DedupState::new();
        let now = Instant::now();
        state.record("hello", now);
        assert!(state.is_duplicate("hello", now));
    }

    #[test]
    fn substring_of_sent_part_is_duplicate() {
        let mut state = DedupState::new();
        let now = Instant::now();
        state.record("Hello, how can I help you today?", now);
        assert!(state.is_duplicate("how can I help", now));
    }

    #[test]
    fn sent_part_as_substring_of_candidate_is_duplicate() {
        let mut state = DedupState::new();
        let now = Instant::now();
        state.record("hello", now);
        assert!(state.is_duplicate("hello there, friend", now));
    }

    #[test]
    fn unrelated_part_is_not_duplicate() {
        let mut state = DedupState::new();
        let now = Instant::now();
        state.record("hello", now);
        assert!(!state.is_duplicate("goodbye", now));
    }
}
