//! SimulStreaming / whisper_online TCP recognizer.
//!
//! The server takes raw 16kHz mono S16_LE PCM on the socket and writes one
//! committed segment per line as `"<start_ms> <end_ms> <text>"`. Closing the
//! write side tells it to flush its last hypothesis and close.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Recognizer;
use crate::transcription::{samples_to_pcm16, RecognizedSegment, SampleBlock};

/// Parse one output line into a final segment (times converted to seconds).
pub fn parse_line(line: &str) -> Option<RecognizedSegment> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    if parts.len() < 3 {
        return None;
    }
    let start_ms = parts[0].parse::<f64>().ok()?;
    let end_ms = parts[1].parse::<f64>().ok()?;

    Some(RecognizedSegment::Final {
        start: start_ms / 1000.0,
        end: end_ms / 1000.0,
        text: parts[2].to_string(),
    })
}

/// Concatenate trailing segments into one spanning all of them.
fn merge_segments(segments: Vec<RecognizedSegment>) -> Option<RecognizedSegment> {
    let mut merged: Option<(f64, f64, String)> = None;
    for segment in segments {
        if let RecognizedSegment::Final { start, end, text } = segment {
            merged = Some(match merged {
                None => (start, end, text),
                Some((first_start, _, mut joined)) => {
                    joined.push_str(&text);
                    (first_start, end, joined)
                }
            });
        }
    }
    merged.map(|(start, end, text)| RecognizedSegment::Final { start, end, text })
}

struct Connection {
    write_half: Option<OwnedWriteHalf>,
    result_rx: mpsc::Receiver<RecognizedSegment>,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn open(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .with_context(|| format!("Timed out connecting to SimulStreaming at {}", addr))?
            .with_context(|| format!("Failed to connect to SimulStreaming at {}", addr))?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(100);
        let reader = tokio::spawn(read_results(read_half, tx));

        info!("Connected to SimulStreaming server at {}", addr);

        Ok(Self {
            write_half: Some(write_half),
            result_rx: rx,
            reader,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_results(read_half: OwnedReadHalf, tx: mpsc::Sender<RecognizedSegment>) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("SimulStreaming connection closed (EOF)");
                break;
            }
            Ok(_) => match parse_line(&line) {
                Some(segment) => {
                    debug!("Received segment: {:?}", segment);
                    if tx.send(segment).await.is_err() {
                        break;
                    }
                }
                None => {
                    if !line.trim().is_empty() {
                        warn!("Failed to parse transcription line: {}", line.trim_end());
                    }
                }
            },
            Err(e) => {
                error!("Error reading from SimulStreaming: {}", e);
                break;
            }
        }
    }
}

/// Streaming recognizer speaking the SimulStreaming line protocol.
pub struct SimulStreamingRecognizer {
    addr: String,
    connect_timeout: Duration,
    finish_timeout: Duration,
    connection: Connection,
}

impl SimulStreamingRecognizer {
    pub async fn connect(addr: &str, connect_timeout: Duration, finish_timeout: Duration) -> Result<Self> {
        let connection = Connection::open(addr, connect_timeout).await?;
        Ok(Self {
            addr: addr.to_string(),
            connect_timeout,
            finish_timeout,
            connection,
        })
    }

    fn drain_ready(&mut self) -> Vec<RecognizedSegment> {
        let mut segments = Vec::new();
        while let Ok(segment) = self.connection.result_rx.try_recv() {
            segments.push(segment);
        }
        segments
    }
}

#[async_trait]
impl Recognizer for SimulStreamingRecognizer {
    /// The server keeps decoder state per connection, so a reset reconnects.
    async fn reset(&mut self) -> Result<()> {
        self.connection = Connection::open(&self.addr, self.connect_timeout).await?;
        Ok(())
    }

    async fn submit(&mut self, samples: SampleBlock) -> Result<Vec<RecognizedSegment>> {
        let write_half = self
            .connection
            .write_half
            .as_mut()
            .context("SimulStreaming stream already finished")?;

        let bytes: Vec<u8> = samples_to_pcm16(&samples)
            .iter()
            .flat_map(|&sample| sample.to_le_bytes())
            .collect();

        write_half.write_all(&bytes).await?;
        write_half.flush().await?;
        debug!("Sent {} audio samples ({} bytes)", samples.len(), bytes.len());

        Ok(self.drain_ready())
    }

    async fn finish(&mut self) -> Result<Option<RecognizedSegment>> {
        let mut segments = self.drain_ready();

        if let Some(mut write_half) = self.connection.write_half.take() {
            write_half.shutdown().await?;

            let deadline = tokio::time::Instant::now() + self.finish_timeout;
            loop {
                match tokio::time::timeout_at(deadline, self.connection.result_rx.recv()).await {
                    Ok(Some(segment)) => segments.push(segment),
                    Ok(None) => break,
                    Err(_) => {
                        warn!("SimulStreaming did not close within {:?}", self.finish_timeout);
                        break;
                    }
                }
            }
        }

        Ok(merge_segments(segments))
    }
}
