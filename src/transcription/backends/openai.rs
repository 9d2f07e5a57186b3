use super::Recognizer;
use crate::transcription::{samples_to_pcm16, RecognizedSegment, SampleBlock, SAMPLE_RATE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info};
use reqwest::Client;
use std::io::Cursor;
use std::time::Duration;

/// Recognizer backed by an OpenAI-compatible `/audio/transcriptions` endpoint.
///
/// Every submitted block is transcribed on its own; returned segment times
/// are shifted by the audio already sent so they stay relative to the
/// session's stream start.
pub struct OpenAiRecognizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    /// `None` lets the service detect the language.
    language: Option<String>,
    app_name: Option<String>,
    stream_offset_secs: f64,
}

impl OpenAiRecognizer {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        language: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build transcription HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: {
                let mut url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
                if url.ends_with("/models") {
                    url = url.trim_end_matches("/models").to_string();
                }
                url
            },
            model: model.unwrap_or_else(|| "whisper-1".to_string()),
            language: if language == "auto" {
                None
            } else {
                Some(language.to_string())
            },
            app_name: Some("whisper-relay".to_string()),
            stream_offset_secs: 0.0,
        })
    }

    async fn transcribe_chunk(&self, pcm_data: Vec<i16>) -> Result<serde_json::Value> {
        let wav_data = encode_wav(&pcm_data)?;

        let part = reqwest::multipart::Part::bytes(wav_data)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));

        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key));

        if let Some(name) = &self.app_name {
            req = req.header("X-Title", name);
        }

        let res = req
            .multipart(form)
            .send()
            .await
            .context("Failed to send request")?;

        if !res.status().is_success() {
            let error_text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("API Error: {}", error_text));
        }

        Ok(res.json().await?)
    }
}

/// Turn a `verbose_json` (or plain `json`) response into segments placed at
/// `offset` seconds. A response without a segment list becomes one segment
/// covering the whole block.
fn parse_transcription(json: &serde_json::Value, offset: f64, duration: f64) -> Vec<RecognizedSegment> {
    if let Some(segments) = json["segments"].as_array() {
        return segments
            .iter()
            .filter_map(|segment| {
                let text = segment["text"].as_str()?;
                let start = segment["start"].as_f64()?;
                let end = segment["end"].as_f64()?;
                Some(RecognizedSegment::Final {
                    start: offset + start,
                    end: offset + end,
                    text: text.to_string(),
                })
            })
            .collect();
    }

    match json["text"].as_str() {
        Some(text) if !text.trim().is_empty() => vec![RecognizedSegment::Final {
            start: offset,
            end: offset + duration,
            text: text.to_string(),
        }],
        _ => Vec::new(),
    }
}

#[async_trait]
impl Recognizer for OpenAiRecognizer {
    async fn reset(&mut self) -> Result<()> {
        self.stream_offset_secs = 0.0;
        Ok(())
    }

    async fn submit(&mut self, samples: SampleBlock) -> Result<Vec<RecognizedSegment>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let duration = samples.len() as f64 / SAMPLE_RATE as f64;
        let offset = self.stream_offset_secs;
        // Advance before the request so a failed chunk does not shift later ones.
        self.stream_offset_secs += duration;

        info!("Sending audio chunk of {:.0}ms to OpenAI...", duration * 1000.0);
        let json = self.transcribe_chunk(samples_to_pcm16(&samples)).await?;
        let segments = parse_transcription(&json, offset, duration);
        debug!("OpenAI returned {} segments", segments.len());

        Ok(segments)
    }

    async fn finish(&mut self) -> Result<Option<RecognizedSegment>> {
        // every submission is decoded synchronously, nothing is pending
        Ok(None)
    }
}

/// Mono 16-bit WAV at [`SAMPLE_RATE`], as uploaded to the endpoint.
fn encode_wav(pcm: &[i16]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut bytes = Vec::with_capacity(44 + pcm.len() * 2);
    let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec)?;
    for &sample in pcm {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verbose_segments_are_offset() {
        let response = json!({
            "text": "hello world",
            "segments": [
                {"start": 0.0, "end": 0.4, "text": " hello"},
                {"start": 0.4, "end": 0.9, "text": " world"}
            ]
        });
        let segments = parse_transcription(&response, 10.0, 1.0);
        assert_eq!(
            segments,
            vec![
                RecognizedSegment::Final { start: 10.0, end: 10.4, text: " hello".into() },
                RecognizedSegment::Final { start: 10.4, end: 10.9, text: " world".into() },
            ]
        );
    }

    #[test]
    fn test_plain_text_covers_block() {
        let segments = parse_transcription(&json!({"text": "hi"}), 2.0, 0.3);
        assert_eq!(
            segments,
            vec![RecognizedSegment::Final { start: 2.0, end: 2.3, text: "hi".into() }]
        );
        assert!(parse_transcription(&json!({"text": "  "}), 0.0, 0.3).is_empty());
        assert!(parse_transcription(&json!({}), 0.0, 0.3).is_empty());
    }

    #[test]
    fn test_auto_language_is_omitted() {
        let recognizer = OpenAiRecognizer::new("key".into(), None, None, "auto").unwrap();
        assert!(recognizer.language.is_none());
        assert_eq!(recognizer.base_url, "https://api.openai.com/v1");
        assert_eq!(recognizer.model, "whisper-1");

        let recognizer =
            OpenAiRecognizer::new("key".into(), Some("http://localhost:8000/v1/models".into()), None, "de")
                .unwrap();
        assert_eq!(recognizer.language.as_deref(), Some("de"));
        assert_eq!(recognizer.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn test_wav_upload_encoding() {
        let wav = encode_wav(&[1, -1, i16::MAX, i16::MIN]).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!((spec.channels, spec.sample_rate, spec.bits_per_sample), (1, 16000, 16));
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, -1, i16::MAX, i16::MIN]);
    }

    #[tokio::test]
    async fn test_reset_rewinds_offset() {
        let mut recognizer = OpenAiRecognizer::new("key".into(), None, None, "en").unwrap();
        recognizer.stream_offset_secs = 12.5;
        recognizer.reset().await.unwrap();
        assert_eq!(recognizer.stream_offset_secs, 0.0);
        assert_eq!(recognizer.finish().await.unwrap(), None);
        assert!(recognizer.submit(Vec::new()).await.unwrap().is_empty());
    }
}
