//! Server, recognizer and translation configuration.
//!
//! Everything here is read-only once the server is running; the binary fills
//! it from command-line flags.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::transcription::{threshold_bytes, SAMPLE_RATE};

/// Which recognition engine sessions talk to.
#[derive(Debug, Clone)]
pub enum RecognizerConfig {
    /// whisper_online / SimulStreaming TCP server.
    SimulStreaming {
        /// Server used when no language-specific address is configured.
        address: String,
        /// Language code -> server address, for servers started with a fixed `--lan`.
        language_addresses: HashMap<String, String>,
        connect_timeout: Duration,
        /// How long `finish` waits for trailing lines after half-closing.
        finish_timeout: Duration,
    },
    /// OpenAI-compatible `/audio/transcriptions` endpoint.
    OpenAi {
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    },
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self::simul_streaming("127.0.0.1:43001")
    }
}

impl RecognizerConfig {
    /// Single SimulStreaming server for every language.
    pub fn simul_streaming(address: &str) -> Self {
        Self::SimulStreaming {
            address: address.to_string(),
            language_addresses: HashMap::new(),
            connect_timeout: Duration::from_secs(10),
            finish_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_openai(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self::OpenAi {
            api_key,
            base_url,
            model,
        }
    }

    /// Short name used in logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            RecognizerConfig::SimulStreaming { .. } => "simul-streaming",
            RecognizerConfig::OpenAi { .. } => "openai",
        }
    }
}

/// Translation of final transcript text.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub enabled: bool,
    /// Base URL of the Google-translate compatible endpoint.
    pub endpoint: String,
    /// Upper bound on one translation request.
    pub timeout: Duration,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Top-level configuration of the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind, a hostname or an IP address.
    pub host: String,
    pub port: u16,
    pub sample_rate: u32,
    /// Minimum audio duration buffered before a recognizer submission.
    pub chunk_seconds: f64,
    /// Source language every new session starts with.
    pub source_language: String,
    /// Target language every new session starts with.
    pub target_language: String,
    pub recognizer: RecognizerConfig,
    pub translation: TranslationConfig,
    /// WAV file pushed through a recognizer once at startup.
    pub warmup_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 43007,
            sample_rate: SAMPLE_RATE,
            chunk_seconds: 0.3,
            source_language: "en".to_string(),
            target_language: "en".to_string(),
            recognizer: RecognizerConfig::default(),
            translation: TranslationConfig::default(),
            warmup_file: None,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Number of buffered bytes that triggers a submission (2 bytes per sample).
    pub fn threshold_bytes(&self) -> usize {
        threshold_bytes(self.chunk_seconds, self.sample_rate)
    }
}
