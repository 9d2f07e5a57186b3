//! PCM16 ingest buffer and sample conversion.
//!
//! Clients send arbitrary-sized chunks of little-endian 16-bit PCM. The
//! buffer accumulates them until a chunk threshold is reached and then hands
//! the whole content off as normalized `f32` samples.

use log::trace;

use crate::error::{SessionError, SessionResult};

/// Normalized samples in [-1.0, 1.0], consumed by a recognizer submission.
pub type SampleBlock = Vec<f32>;

/// Bytes of PCM16 audio covering `chunk_seconds` at `sample_rate`.
pub fn threshold_bytes(chunk_seconds: f64, sample_rate: u32) -> usize {
    (chunk_seconds * sample_rate as f64 * 2.0).round() as usize
}

/// Convert little-endian PCM16 bytes to normalized samples.
///
/// Fails if `bytes` does not hold a whole number of samples.
pub fn pcm16_to_samples(bytes: &[u8]) -> SessionResult<SampleBlock> {
    if bytes.len() % 2 != 0 {
        return Err(SessionError::OddAudioLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Convert normalized samples back to PCM16 for engines that take raw audio.
/// Exact inverse of [`pcm16_to_samples`]; out-of-range input saturates.
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Per-session accumulator of raw audio bytes.
#[derive(Debug, Default)]
pub struct AudioBuffer {
    bytes: Vec<u8>,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one client frame.
    pub fn add(&mut self, frame: &[u8]) {
        self.bytes.extend_from_slice(frame);
        trace!("Buffered {} bytes ({} total)", frame.len(), self.bytes.len());
    }

    /// Take everything buffered once at least `threshold` bytes are present.
    ///
    /// Below the threshold the buffer is left untouched and `None` is
    /// returned. At or above it the buffer is emptied, even when the content
    /// turns out to be an odd number of bytes and an error is returned.
    pub fn drain_if_ready(&mut self, threshold: usize) -> SessionResult<Option<SampleBlock>> {
        if self.bytes.len() < threshold {
            return Ok(None);
        }

        let bytes = std::mem::take(&mut self.bytes);
        pcm16_to_samples(&bytes).map(Some)
    }

    /// Buffered byte count.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Drop buffered audio without submitting it.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}
