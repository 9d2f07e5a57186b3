//! Per-connection protocol state machine.
//!
//! A [`Session`] is owned by exactly one connection task and handles that
//! connection's messages one at a time, so none of its parts need locking.

use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info, trace, warn};

use super::backends::{BackendFactory, Recognizer, RecognizerFactory};
use super::buffer::AudioBuffer;
use super::languages::{is_supported_language, LanguageSettings, LanguageUpdate};
use super::protocol::{ClientMessage, ServerMessage};
use super::stitcher::TranscriptStitcher;
use super::translation::TranslationRelay;
use super::{RecognizedSegment, TranscriptionEvent};
use crate::config::ServerConfig;
use crate::error::{SessionError, SessionResult};

/// Read-only state shared by all sessions of a server.
#[derive(Clone)]
pub struct SessionContext {
    pub factory: Arc<dyn RecognizerFactory>,
    pub translator: Arc<TranslationRelay>,
    pub translation_enabled: bool,
    /// Buffered bytes that trigger a recognizer submission.
    pub threshold_bytes: usize,
    pub source_language: String,
    pub target_language: String,
}

impl SessionContext {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        if !is_supported_language(&config.source_language) {
            anyhow::bail!("Unsupported source language: {}", config.source_language);
        }

        Ok(Self {
            factory: Arc::new(BackendFactory::new(config.recognizer.clone())),
            translator: Arc::new(TranslationRelay::from_config(&config.translation)?),
            translation_enabled: config.translation.enabled,
            threshold_bytes: config.threshold_bytes(),
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, waiting for `start`.
    Idle,
    /// Audio is submitted to the recognizer.
    Active,
    /// After `stop`; a new `start` restarts.
    Stopped,
}

pub struct Session {
    ctx: SessionContext,
    state: SessionState,
    languages: LanguageSettings,
    buffer: AudioBuffer,
    stitcher: TranscriptStitcher,
    recognizer: Box<dyn Recognizer>,
    pending_translations: Vec<TranscriptionEvent>,
    closed: bool,
}

impl Session {
    /// Create a session with a recognizer for the default source language.
    ///
    /// Failure here is unrecoverable for the connection.
    pub async fn open(ctx: SessionContext) -> SessionResult<Self> {
        let recognizer = ctx
            .factory
            .create(&ctx.source_language)
            .await
            .map_err(SessionError::Fatal)?;
        let languages = LanguageSettings::new(ctx.source_language.clone(), ctx.target_language.clone());

        Ok(Self {
            ctx,
            state: SessionState::Idle,
            languages,
            buffer: AudioBuffer::new(),
            stitcher: TranscriptStitcher::new(),
            recognizer,
            pending_translations: Vec::new(),
            closed: false,
        })
    }

    /// Greeting sent right after the connection is established.
    pub fn connected_status(&self) -> ServerMessage {
        ServerMessage::status("Connected to transcription server", &self.languages)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn languages(&self) -> &LanguageSettings {
        &self.languages
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn last_end_ms(&self) -> Option<u64> {
        self.stitcher.last_end_ms()
    }

    /// Set after a fatal error; the connection must be closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle one binary audio frame.
    pub async fn handle_binary(&mut self, frame: &[u8]) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        let result = self.process_audio(frame, &mut out).await;
        self.finish_message(result, out)
    }

    /// Handle one JSON control message.
    pub async fn handle_text(&mut self, text: &str) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        let result = match ClientMessage::parse(text) {
            Ok(message) => self.process_control(message, &mut out).await,
            Err(e) => Err(e),
        };
        self.finish_message(result, out)
    }

    fn finish_message(&mut self, result: SessionResult<()>, mut out: Vec<ServerMessage>) -> Vec<ServerMessage> {
        if let Err(e) = result {
            error!("Error processing message: {}", e);
            if e.is_fatal() {
                self.closed = true;
            }
            out.push(ServerMessage::error(&e));
        }
        out
    }

    async fn process_audio(&mut self, frame: &[u8], out: &mut Vec<ServerMessage>) -> SessionResult<()> {
        self.buffer.add(frame);
        if self.state != SessionState::Active {
            trace!("Buffering {} bytes while {:?}", frame.len(), self.state);
            return Ok(());
        }

        let Some(block) = self.buffer.drain_if_ready(self.ctx.threshold_bytes)? else {
            return Ok(());
        };

        debug!("Submitting {} samples", block.len());
        let segments = self.recognizer.submit(block).await.map_err(SessionError::Engine)?;
        self.emit_segments(segments, out);
        Ok(())
    }

    async fn process_control(&mut self, message: ClientMessage, out: &mut Vec<ServerMessage>) -> SessionResult<()> {
        match message {
            ClientMessage::Start => self.start(out).await,
            ClientMessage::Stop => self.stop(out).await,
            ClientMessage::SetLanguages {
                source_language,
                target_language,
            } => self.set_languages(&source_language, &target_language, out).await,
        }
    }

    async fn start(&mut self, out: &mut Vec<ServerMessage>) -> SessionResult<()> {
        self.recognizer.reset().await.map_err(SessionError::Fatal)?;
        self.buffer.clear();
        self.stitcher.reset();
        self.state = SessionState::Active;

        info!(
            "Started transcription ({} -> {})",
            self.languages.source(),
            self.languages.target()
        );
        out.push(ServerMessage::status("Started transcription", &self.languages));
        Ok(())
    }

    async fn stop(&mut self, out: &mut Vec<ServerMessage>) -> SessionResult<()> {
        if self.state == SessionState::Idle {
            out.push(ServerMessage::status("Transcription not started", &self.languages));
            return Ok(());
        }

        let trailing = self.recognizer.finish().await.map_err(SessionError::Engine)?;
        if let Some(segment) = trailing {
            self.emit_segments(vec![segment], out);
        }

        if !self.buffer.is_empty() {
            debug!("Dropping {} unsubmitted bytes at stop", self.buffer.len());
            self.buffer.clear();
        }
        self.state = SessionState::Stopped;

        info!("Stopped transcription");
        out.push(ServerMessage::status("Stopped transcription", &self.languages));
        Ok(())
    }

    async fn set_languages(&mut self, source: &str, target: &str, out: &mut Vec<ServerMessage>) -> SessionResult<()> {
        match self.languages.classify(source, target)? {
            LanguageUpdate::NoChange => {
                out.push(ServerMessage::status("Languages unchanged", &self.languages));
            }
            LanguageUpdate::TargetChanged => {
                self.languages.apply(source, target);
                info!("Target language changed to {}", target);
                out.push(ServerMessage::target_language_changed(&self.languages));
            }
            LanguageUpdate::SourceChanged => {
                // the old recognizer stays in place unless the new one exists
                let recognizer = self.ctx.factory.create(source).await.map_err(|e| {
                    SessionError::Reconfiguration {
                        language: source.to_string(),
                        cause: e,
                    }
                })?;
                self.recognizer = recognizer;

                if !self.buffer.is_empty() {
                    debug!("Discarding {} buffered bytes after source change", self.buffer.len());
                    self.buffer.clear();
                }
                self.languages.apply(source, target);

                info!(
                    "Recognizer restarted for source language {} (target {})",
                    source, target
                );
                out.push(ServerMessage::language_change_restart(&self.languages));
            }
        }
        Ok(())
    }

    /// Stitch segments into transcription events. Finals are queued for
    /// [`Session::translate_pending`].
    fn emit_segments(&mut self, segments: Vec<RecognizedSegment>, out: &mut Vec<ServerMessage>) {
        for segment in &segments {
            if let Some(event) = self.stitcher.stitch(segment) {
                debug!("Sending result: {:?}", event);
                out.push(ServerMessage::transcription(&event));
                if segment.is_final() && self.should_translate() {
                    self.pending_translations.push(event);
                }
            }
        }
    }

    /// Translate the finals produced by the last handled message.
    ///
    /// Call after the replies of that message have been delivered; a slow
    /// translator only ever delays translation events.
    pub async fn translate_pending(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        for event in std::mem::take(&mut self.pending_translations) {
            match self
                .ctx
                .translator
                .translate(&event.text, self.languages.source(), self.languages.target())
                .await
            {
                Some(text) => out.push(ServerMessage::translation(&event, text, &self.languages)),
                None => warn!("No translation for {:?}", event.text),
            }
        }
        out
    }

    fn should_translate(&self) -> bool {
        self.ctx.translation_enabled && self.languages.source() != self.languages.target()
    }
}
