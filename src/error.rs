use thiserror::Error;

/// Failure while handling one message of a session.
///
/// Everything except [`SessionError::Fatal`] is reported to the client as an
/// `error` event and leaves the connection open.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("Unsupported source language: {0}")]
    UnsupportedLanguage(String),
    #[error("Invalid target language: {0:?}")]
    InvalidTargetLanguage(String),
    #[error("Audio buffer holds {0} bytes, not a whole number of 16-bit samples")]
    OddAudioLength(usize),
    #[error("Recognition failed: {0:#}")]
    Engine(anyhow::Error),
    #[error("Failed to switch recognizer to {language}: {cause:#}")]
    Reconfiguration {
        language: String,
        cause: anyhow::Error,
    },
    #[error("Recognizer unavailable: {0:#}")]
    Fatal(anyhow::Error),
}

impl SessionError {
    /// Whether the connection must be closed after reporting this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Fatal(_))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
