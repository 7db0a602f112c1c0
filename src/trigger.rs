//! Trigger Detector (C1)
//!
//! Pure, side-effect-free classification of whether the latest
//! representative utterance requests assistance.

use crate::state::{Message, MessageRole};

/// Default phrases that indicate the representative is asking for help.
pub fn default_trigger_phrases() -> Vec<String> {
    vec![
        "let me take a look".to_string(),
        "let me check".to_string(),
        "i'll look into".to_string(),
        "checking that for you".to_string(),
    ]
}

/// Outcome of a trigger check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerVerdict {
    pub triggered: bool,
    pub matched_phrase: Option<String>,
}

impl TriggerVerdict {
    fn not_triggered() -> Self {
        Self {
            triggered: false,
            matched_phrase: None,
        }
    }

    fn matched(phrase: impl Into<String>) -> Self {
        Self {
            triggered: true,
            matched_phrase: Some(phrase.into()),
        }
    }

    fn forced() -> Self {
        Self {
            triggered: true,
            matched_phrase: None,
        }
    }
}

/// Scans the most recent representative message against a configurable
/// phrase list. Older matches are intentionally ignored: re-triggering on
/// them would cause duplicate runs as the conversation grows.
pub struct TriggerDetector {
    phrases: Vec<String>,
}

impl TriggerDetector {
    pub fn new(phrases: Vec<String>) -> Self {
        Self { phrases }
    }

    pub fn detect(&self, history: &[Message], force: bool) -> TriggerVerdict {
        if force {
            return TriggerVerdict::forced();
        }

        let Some(latest_rep) = history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Representative)
        else {
            return TriggerVerdict::not_triggered();
        };

        let lowered = latest_rep.content.to_lowercase();
        for phrase in &self.phrases {
            if lowered.contains(&phrase.to_lowercase()) {
                return TriggerVerdict::matched(phrase.clone());
            }
        }

        TriggerVerdict::not_triggered()
    }
}

impl Default for TriggerDetector {
    fn default() -> Self {
        Self::new(default_trigger_phrases())
    }
}
