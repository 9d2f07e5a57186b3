use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use whisper_relay::transcription::{
    serve, RecognizedSegment, Recognizer, RecognizerFactory, SampleBlock, SessionContext,
    TranslationRelay, Translator,
};

/// Answers every submission with one final segment per 0.3s of audio.
struct EchoRecognizer {
    language: String,
    position: f64,
}

#[async_trait]
impl Recognizer for EchoRecognizer {
    async fn reset(&mut self) -> Result<()> {
        self.position = 0.0;
        Ok(())
    }

    async fn submit(&mut self, samples: SampleBlock) -> Result<Vec<RecognizedSegment>> {
        let start = self.position;
        self.position += samples.len() as f64 / 16000.0;
        Ok(vec![RecognizedSegment::Final {
            start,
            end: self.position,
            text: format!(" chunk in {}", self.language),
        }])
    }

    async fn finish(&mut self) -> Result<Option<RecognizedSegment>> {
        Ok(Some(RecognizedSegment::Partial {
            text: "tail".to_string(),
        }))
    }
}

struct EchoFactory;

#[async_trait]
impl RecognizerFactory for EchoFactory {
    async fn create(&self, language: &str) -> Result<Box<dyn Recognizer>> {
        Ok(Box::new(EchoRecognizer {
            language: language.to_string(),
            position: 0.0,
        }))
    }
}

struct UppercaseTranslator;

#[async_trait]
impl Translator for UppercaseTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String> {
        Ok(text.to_uppercase())
    }
}

struct StalledTranslator;

#[async_trait]
impl Translator for StalledTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(text.to_string())
    }
}

async fn start_server() -> (String, async_broadcast::Sender<()>) {
    start_server_with(Arc::new(UppercaseTranslator), Duration::from_secs(5)).await
}

async fn start_server_with(
    translator: Arc<dyn Translator>,
    translation_timeout: Duration,
) -> (String, async_broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let ctx = SessionContext {
        factory: Arc::new(EchoFactory),
        translator: Arc::new(TranslationRelay::new(translator, translation_timeout)),
        translation_enabled: true,
        threshold_bytes: 9600,
        source_language: "en".to_string(),
        target_language: "de".to_string(),
    };

    let (stop_tx, stop_rx) = async_broadcast::broadcast::<()>(1);
    tokio::spawn(serve(listener, ctx, stop_rx));

    (format!("ws://{}", addr), stop_tx)
}

async fn next_json<S>(stream: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for server")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_full_session_over_websocket() {
    let (url, stop_tx) = start_server().await;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut tx, mut rx) = ws.split();

    let greeting = next_json(&mut rx).await;
    assert_eq!(greeting["type"], "status");
    assert_eq!(greeting["sourceLanguage"], "en");
    assert_eq!(greeting["targetLanguage"], "de");

    // audio before start is never transcribed
    tx.send(Message::Binary(vec![0u8; 9600])).await.unwrap();

    tx.send(Message::Text(r#"{"type":"start"}"#.to_string())).await.unwrap();
    let started = next_json(&mut rx).await;
    assert_eq!(started["type"], "status");
    assert_eq!(started["message"], "Started transcription");

    tx.send(Message::Binary(vec![0u8; 4800])).await.unwrap();
    tx.send(Message::Binary(vec![0u8; 4800])).await.unwrap();

    let transcription = next_json(&mut rx).await;
    assert_eq!(transcription["type"], "transcription");
    assert_eq!(transcription["text"], "chunk in en");
    assert_eq!(transcription["start"], 0);
    assert_eq!(transcription["end"], 300);
    assert_eq!(transcription["isFinal"], true);

    let translation = next_json(&mut rx).await;
    assert_eq!(translation["type"], "translation");
    assert_eq!(translation["text"], "CHUNK IN EN");
    assert_eq!(translation["end"], 300);
    assert_eq!(translation["targetLanguage"], "de");

    tx.send(Message::Text(
        r#"{"type":"setLanguages","sourceLanguage":"fr","targetLanguage":"de"}"#.to_string(),
    ))
    .await
    .unwrap();
    let restarted = next_json(&mut rx).await;
    assert_eq!(restarted["type"], "languageChangeRestart");
    assert_eq!(restarted["sourceLanguage"], "fr");

    tx.send(Message::Text("{broken".to_string())).await.unwrap();
    let error = next_json(&mut rx).await;
    assert_eq!(error["type"], "error");

    tx.send(Message::Text(r#"{"type":"stop"}"#.to_string())).await.unwrap();
    let tail = next_json(&mut rx).await;
    assert_eq!(tail["type"], "transcription");
    assert_eq!(tail["text"], "tail");
    assert_eq!(tail["isFinal"], false);
    let stopped = next_json(&mut rx).await;
    assert_eq!(stopped["type"], "status");
    assert_eq!(stopped["message"], "Stopped transcription");

    tx.send(Message::Close(None)).await.unwrap();
    let _ = stop_tx.broadcast(()).await;
}

#[tokio::test]
async fn test_transcription_is_not_held_back_by_translation() {
    let (url, stop_tx) = start_server_with(Arc::new(StalledTranslator), Duration::from_secs(2)).await;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let (mut tx, mut rx) = ws.split();

    next_json(&mut rx).await;
    tx.send(Message::Text(r#"{"type":"start"}"#.to_string())).await.unwrap();
    next_json(&mut rx).await;

    let sent_at = tokio::time::Instant::now();
    tx.send(Message::Binary(vec![0u8; 9600])).await.unwrap();
    let transcription = next_json(&mut rx).await;
    assert_eq!(transcription["type"], "transcription");
    assert!(
        sent_at.elapsed() < Duration::from_millis(500),
        "transcription arrived after {:?}",
        sent_at.elapsed()
    );

    // the stalled translation times out without an event or an error
    tx.send(Message::Text(r#"{"type":"stop"}"#.to_string())).await.unwrap();
    let tail = next_json(&mut rx).await;
    assert_eq!(tail["type"], "transcription");
    assert_eq!(tail["text"], "tail");
    let stopped = next_json(&mut rx).await;
    assert_eq!(stopped["type"], "status");
    assert_eq!(stopped["message"], "Stopped transcription");

    tx.send(Message::Close(None)).await.unwrap();
    let _ = stop_tx.broadcast(()).await;
}

#[tokio::test]
async fn test_server_stops_accepting_after_shutdown() {
    let (url, stop_tx) = start_server().await;
    stop_tx.broadcast(()).await.unwrap();

    // give the accept loop a moment to observe the signal
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tokio_tungstenite::connect_async(url.as_str()).await.is_err());
}
