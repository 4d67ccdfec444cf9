//! Text helpers for transcribed speech
//!
//! Transcripts come back with arbitrary casing, accents and trailing
//! punctuation ("¡Adiós!", "Salir."). Exit phrases are compared on a folded
//! form: lowercase, combining marks removed, punctuation dropped and
//! whitespace collapsed.

use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold text for phrase comparison
pub fn normalize_phrase(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Configured set of utterances that end the conversation
#[derive(Debug, Clone, Default)]
pub struct ExitPhrases {
    phrases: HashSet<String>,
}

impl ExitPhrases {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        let phrases = phrases
            .iter()
            .map(|p| normalize_phrase(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// True if the whole utterance is one of the exit phrases
    pub fn matches(&self, text: &str) -> bool {
        let normalized = normalize_phrase(text);
        !normalized.is_empty() && self.phrases.contains(&normalized)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }
}
