use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use tokio::net::TcpListener;

use whisper_relay::transcription::{is_supported_language, serve, warm_up, SessionContext};
use whisper_relay::{RecognizerConfig, ServerConfig, TranslationConfig};

#[derive(Default, Debug, Copy, Clone, clap::ValueEnum)]
enum Level {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<Level> for log::LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => log::LevelFilter::Error,
            Level::Warn => log::LevelFilter::Warn,
            Level::Info => log::LevelFilter::Info,
            Level::Debug => log::LevelFilter::Debug,
            Level::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
enum Backend {
    /// whisper_online / SimulStreaming TCP server
    SimulStreaming,
    /// OpenAI-compatible /audio/transcriptions endpoint
    Openai,
}

#[derive(Parser)]
#[command(name = "whisper-relay")]
#[command(version = "0.1.0")]
#[command(about = "WebSocket relay for streaming Whisper transcription", long_about = None)]
struct Cli {
    #[arg(long, default_value_t = String::from("localhost"))]
    host: String,

    #[arg(long, default_value_t = 43007)]
    port: u16,

    /// Default source language of new sessions ("auto" to detect)
    #[arg(long, visible_alias = "lan", default_value_t = String::from("en"))]
    language: String,

    /// Default target language of new sessions
    #[arg(long, default_value_t = String::from("en"))]
    target_language: String,

    #[arg(long, value_enum, default_value_t = Backend::SimulStreaming)]
    backend: Backend,

    /// SimulStreaming server address
    #[arg(long, default_value_t = String::from("127.0.0.1:43001"))]
    simul_addr: String,

    /// Language specific SimulStreaming server, as `lang=host:port` (repeatable)
    #[arg(long = "simul-lang-addr", value_parser = parse_language_address)]
    simul_lang_addrs: Vec<(String, String)>,

    /// Model name passed to the OpenAI backend
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Minimum audio duration in seconds submitted to the recognizer
    #[arg(long, visible_alias = "min-chunk-size", default_value_t = 0.3)]
    chunk_size: f64,

    /// Translate final transcripts into the target language
    #[arg(long)]
    translate: bool,

    /// Seconds before a translation request is abandoned
    #[arg(long, default_value_t = 5.0)]
    translation_timeout: f64,

    /// 16kHz WAV file used to warm up the recognizer at startup
    #[arg(long)]
    warmup_file: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Level::Info)]
    log_level: Level,
}

fn parse_language_address(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((language, addr)) if !language.is_empty() && !addr.is_empty() => {
            Ok((language.to_string(), addr.to_string()))
        }
        _ => Err(format!("expected lang=host:port, got {:?}", value)),
    }
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        if !is_supported_language(&self.language) {
            anyhow::bail!("Unsupported source language: {}", self.language);
        }
        if self.chunk_size <= 0.0 {
            anyhow::bail!("--chunk-size must be positive, got {}", self.chunk_size);
        }

        let recognizer = match self.backend {
            Backend::SimulStreaming => {
                let mut config = RecognizerConfig::simul_streaming(&self.simul_addr);
                if let RecognizerConfig::SimulStreaming { language_addresses, .. } = &mut config {
                    *language_addresses = self.simul_lang_addrs.into_iter().collect::<HashMap<_, _>>();
                }
                config
            }
            Backend::Openai => {
                let api_key = self
                    .api_key
                    .context("--api-key or OPENAI_API_KEY is required for the openai backend")?;
                RecognizerConfig::with_openai(api_key, self.base_url, self.model)
            }
        };

        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            chunk_seconds: self.chunk_size,
            source_language: self.language,
            target_language: self.target_language,
            recognizer,
            translation: TranslationConfig {
                enabled: self.translate,
                timeout: Duration::from_secs_f64(self.translation_timeout),
                ..Default::default()
            },
            warmup_file: self.warmup_file,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} [{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                chrono::Local::now().format("%H:%M:%S.%6f"),
                record.args()
            )
        })
        .filter(None, cli.log_level.into())
        .init();

    let config = cli.into_config()?;
    info!(
        "Using {} backend, chunk size {}s, languages {} -> {}, translation {}",
        config.recognizer.backend_name(),
        config.chunk_seconds,
        config.source_language,
        config.target_language,
        if config.translation.enabled { "on" } else { "off" }
    );

    let ctx = SessionContext::from_config(&config)?;

    match &config.warmup_file {
        Some(path) => {
            if let Err(e) = warm_up(ctx.factory.as_ref(), &config.source_language, path).await {
                error!("Warm up failed: {:#}", e);
                return Err(e);
            }
        }
        None => warn!(
            "Recognizer is not warmed up. The first chunk processing may take longer than usual."
        ),
    }

    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);

    let (stop_tx, stop_rx) = async_broadcast::broadcast::<()>(1);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C");
        let _ = stop_tx.broadcast(()).await;
    });

    serve(listener, ctx, stop_rx).await?;
    info!("Server stopped");

    Ok(())
}
