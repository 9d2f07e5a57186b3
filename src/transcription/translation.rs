//! Translation of final transcript text.
//!
//! The relay is shared by every session. It never fails loudly: any problem
//! with the translation service only means no translation event is sent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;

use crate::config::TranslationConfig;

/// External text translation service.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` (possibly `"auto"`) into `target`.
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Client for the Google `translate_a/single?client=gtx` endpoint.
pub struct GoogleTranslator {
    client: Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build translation HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// The response is a nested array; `[0]` holds `[translated, original, ..]`
    /// pairs, one per sentence.
    fn parse_response(json: &serde_json::Value) -> Option<String> {
        let sentences = json.get(0)?.as_array()?;
        let text: String = sentences
            .iter()
            .filter_map(|sentence| sentence.get(0).and_then(|s| s.as_str()))
            .collect();

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let res = self
            .client
            .get(&self.endpoint)
            .header("User-Agent", "Mozilla/5.0")
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .context("Failed to send translation request")?;

        if !res.status().is_success() {
            let status = res.status();
            let error_text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Translation API error {}: {}", status, error_text));
        }

        let json: serde_json::Value = res
            .json()
            .await
            .context("Malformed translation response")?;

        Self::parse_response(&json).ok_or_else(|| anyhow::anyhow!("Translation response had no text"))
    }
}

/// Timeout-bounded, failure-swallowing front for a [`Translator`].
pub struct TranslationRelay {
    translator: Arc<dyn Translator>,
    timeout: Duration,
}

impl TranslationRelay {
    pub fn new(translator: Arc<dyn Translator>, timeout: Duration) -> Self {
        Self { translator, timeout }
    }

    /// Relay backed by [`GoogleTranslator`].
    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        let translator = GoogleTranslator::new(config.endpoint.clone(), config.timeout)?;
        Ok(Self::new(Arc::new(translator), config.timeout))
    }

    /// Translate final transcript text, or `None` if no translation should
    /// be emitted.
    ///
    /// Identical languages short-circuit to the input text without a
    /// request.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> Option<String> {
        if source == target {
            return Some(text.to_string());
        }

        match tokio::time::timeout(self.timeout, self.translator.translate(text, source, target)).await {
            Ok(Ok(translated)) => {
                debug!("Translated [{} -> {}] {:?} -> {:?}", source, target, text, translated);
                Some(translated)
            }
            Ok(Err(e)) => {
                warn!("Translation {} -> {} failed: {:#}", source, target, e);
                None
            }
            Err(_) => {
                warn!(
                    "Translation {} -> {} timed out after {:?}",
                    source, target, self.timeout
                );
                None
            }
        }
    }
}
