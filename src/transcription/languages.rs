//! Source/target language state of a session.

use crate::error::{SessionError, SessionResult};

/// Whisper language codes, plus `auto` for engine-side detection.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "auto", "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs",
    "cy", "da", "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha",
    "haw", "he", "hi", "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km",
    "kn", "ko", "la", "lb", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms",
    "mt", "my", "ne", "nl", "nn", "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd",
    "si", "sk", "sl", "sn", "so", "sq", "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk",
    "tl", "tr", "tt", "uk", "ur", "uz", "vi", "yi", "yo", "yue", "zh",
];

pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&code)
}

/// Outcome of a language update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageUpdate {
    NoChange,
    TargetChanged,
    /// The recognizer must be recreated for the new source language.
    SourceChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSettings {
    source: String,
    target: String,
}

impl LanguageSettings {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Decide what an update to (`source`, `target`) requires, without
    /// mutating anything.
    pub fn classify(&self, source: &str, target: &str) -> SessionResult<LanguageUpdate> {
        if source == self.source && target == self.target {
            return Ok(LanguageUpdate::NoChange);
        }
        if !is_supported_language(source) {
            return Err(SessionError::UnsupportedLanguage(source.to_string()));
        }
        if target.trim().is_empty() {
            return Err(SessionError::InvalidTargetLanguage(target.to_string()));
        }

        if source != self.source {
            Ok(LanguageUpdate::SourceChanged)
        } else {
            Ok(LanguageUpdate::TargetChanged)
        }
    }

    /// Store both languages. Callers classify first and, for a source
    /// change, only apply once the new recognizer exists.
    pub fn apply(&mut self, source: &str, target: &str) {
        self.source = source.to_string();
        self.target = target.to_string();
    }
}
