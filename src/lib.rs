//! Streaming transcription relay.
//!
//! Clients stream 16kHz mono PCM over a WebSocket; the relay buffers it,
//! submits chunks to a speech recognizer, stitches the recognized segments
//! into a time-monotonic transcript and optionally translates final text.

pub mod config;
pub mod error;
pub mod transcription;

pub use config::{RecognizerConfig, ServerConfig, TranslationConfig};
pub use error::SessionError;
