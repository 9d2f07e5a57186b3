pub mod openai;
pub mod simul_streaming;

pub use openai::OpenAiRecognizer;
pub use simul_streaming::{parse_line, SimulStreamingRecognizer};

use anyhow::Result;
use async_trait::async_trait;
use log::info;

use super::{RecognizedSegment, SampleBlock};
use crate::config::RecognizerConfig;

/// One recognizer instance, bound to a single language hint.
///
/// A session owns its recognizer exclusively; a language change replaces it
/// with a fresh instance from a [`RecognizerFactory`].
#[async_trait]
pub trait Recognizer: Send {
    /// Clear decoding state while keeping the model/connection usable.
    async fn reset(&mut self) -> Result<()>;

    /// Decode one block of normalized 16kHz samples.
    /// Returns every segment the engine produced for it, possibly none.
    async fn submit(&mut self, samples: SampleBlock) -> Result<Vec<RecognizedSegment>>;

    /// Flush whatever the engine still holds as a best-effort final segment.
    async fn finish(&mut self) -> Result<Option<RecognizedSegment>>;
}

/// Creates recognizers for a language hint (`"auto"` lets the engine detect).
#[async_trait]
pub trait RecognizerFactory: Send + Sync {
    async fn create(&self, language: &str) -> Result<Box<dyn Recognizer>>;
}

/// Factory for the backend selected in [`RecognizerConfig`].
pub struct BackendFactory {
    config: RecognizerConfig,
}

impl BackendFactory {
    pub fn new(config: RecognizerConfig) -> Self {
        info!("Creating recognizer factory with {} backend", config.backend_name());
        Self { config }
    }
}

#[async_trait]
impl RecognizerFactory for BackendFactory {
    async fn create(&self, language: &str) -> Result<Box<dyn Recognizer>> {
        match &self.config {
            RecognizerConfig::SimulStreaming {
                address,
                language_addresses,
                connect_timeout,
                finish_timeout,
            } => {
                let addr = language_addresses
                    .get(language)
                    .unwrap_or(address);
                info!("Creating SimulStreaming recognizer ({}) connected to {}", language, addr);
                let recognizer =
                    SimulStreamingRecognizer::connect(addr, *connect_timeout, *finish_timeout).await?;
                Ok(Box::new(recognizer))
            }
            RecognizerConfig::OpenAi {
                api_key,
                base_url,
                model,
            } => {
                info!("Creating OpenAI recognizer ({})", language);
                Ok(Box::new(OpenAiRecognizer::new(
                    api_key.clone(),
                    base_url.clone(),
                    model.clone(),
                    language,
                )?))
            }
        }
    }
}
