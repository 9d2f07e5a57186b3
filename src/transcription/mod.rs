//! Transcription session layer.
//!
//! This module sits between raw client audio and an external recognizer:
//! - PCM16 buffering until a chunk threshold is reached
//! - Recognizer backends (SimulStreaming TCP, OpenAI-compatible HTTP)
//! - Stitching recognized segments into a monotonic transcript
//! - Mid-session language reconfiguration
//! - Translation of final text
//! - The per-connection protocol state machine and WebSocket server

pub mod backends;
mod buffer;
mod handler;
mod languages;
mod protocol;
mod session;
mod stitcher;
mod translation;
mod warmup;

pub use backends::{BackendFactory, Recognizer, RecognizerFactory};
pub use buffer::{pcm16_to_samples, samples_to_pcm16, threshold_bytes, AudioBuffer, SampleBlock};
pub use handler::{handle_connection, serve};
pub use languages::{is_supported_language, LanguageSettings, LanguageUpdate, SUPPORTED_LANGUAGES};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{Session, SessionContext, SessionState};
pub use stitcher::TranscriptStitcher;
pub use translation::{GoogleTranslator, TranslationRelay, Translator};
pub use warmup::{load_warmup_audio, warm_up};

/// Recognizers expect 16kHz, mono, S16_LE PCM.
pub const SAMPLE_RATE: u32 = 16000;

/// Segment produced by a recognizer, times in seconds from stream start.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizedSegment {
    /// Fixed time bounds; will not be revised.
    Final { start: f64, end: f64, text: String },
    /// In-progress hypothesis without placement.
    Partial { text: String },
}

impl RecognizedSegment {
    pub fn text(&self) -> &str {
        match self {
            RecognizedSegment::Final { text, .. } | RecognizedSegment::Partial { text } => text,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, RecognizedSegment::Final { .. })
    }
}

/// Client-visible transcription unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionEvent {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub is_final: bool,
}
