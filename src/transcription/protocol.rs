//! JSON text-frame messages exchanged with clients.
//!
//! Binary frames carry raw PCM and never pass through here.

use serde::{Deserialize, Serialize};

use super::languages::LanguageSettings;
use super::TranscriptionEvent;
use crate::error::{SessionError, SessionResult};

/// Control message sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Start,
    Stop,
    #[serde(rename_all = "camelCase")]
    SetLanguages {
        source_language: String,
        target_language: String,
    },
}

impl ClientMessage {
    pub fn parse(text: &str) -> SessionResult<Self> {
        serde_json::from_str(text).map_err(|e| {
            if e.is_syntax() || e.is_eof() {
                SessionError::InvalidMessage("Invalid JSON".to_string())
            } else {
                SessionError::InvalidMessage(e.to_string())
            }
        })
    }
}

/// Message sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Status {
        message: String,
        source_language: String,
        target_language: String,
    },
    #[serde(rename_all = "camelCase")]
    Transcription {
        text: String,
        start: u64,
        end: u64,
        is_final: bool,
    },
    #[serde(rename_all = "camelCase")]
    Translation {
        text: String,
        start: u64,
        end: u64,
        is_final: bool,
        source_language: String,
        target_language: String,
    },
    Error {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    LanguageChangeRestart {
        message: String,
        source_language: String,
        target_language: String,
    },
    #[serde(rename_all = "camelCase")]
    TargetLanguageChanged {
        message: String,
        source_language: String,
        target_language: String,
    },
}

impl ServerMessage {
    pub fn status(message: &str, languages: &LanguageSettings) -> Self {
        Self::Status {
            message: message.to_string(),
            source_language: languages.source().to_string(),
            target_language: languages.target().to_string(),
        }
    }

    pub fn transcription(event: &TranscriptionEvent) -> Self {
        Self::Transcription {
            text: event.text.clone(),
            start: event.start_ms,
            end: event.end_ms,
            is_final: event.is_final,
        }
    }

    pub fn translation(event: &TranscriptionEvent, text: String, languages: &LanguageSettings) -> Self {
        Self::Translation {
            text,
            start: event.start_ms,
            end: event.end_ms,
            is_final: true,
            source_language: languages.source().to_string(),
            target_language: languages.target().to_string(),
        }
    }

    pub fn error(err: &SessionError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    pub fn language_change_restart(languages: &LanguageSettings) -> Self {
        Self::LanguageChangeRestart {
            message: format!("Recognizer restarted for source language {}", languages.source()),
            source_language: languages.source().to_string(),
            target_language: languages.target().to_string(),
        }
    }

    pub fn target_language_changed(languages: &LanguageSettings) -> Self {
        Self::TargetLanguageChanged {
            message: format!("Target language set to {}", languages.target()),
            source_language: languages.source().to_string(),
            target_language: languages.target().to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerMessage::Error { .. })
    }
}
