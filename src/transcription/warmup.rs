//! Startup warm-up: push a short speech file through a recognizer once so
//! the first real chunk of the first client is not slowed down by lazy
//! model loading on the engine side.

use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use log::info;

use super::{RecognizerFactory, SampleBlock, SAMPLE_RATE};

/// Seconds of audio taken from the start of the warm-up file.
const WARMUP_SECONDS: u32 = 1;

/// Read up to one second of a 16kHz WAV file as normalized samples.
/// Multi-channel files contribute their first channel.
pub fn load_warmup_audio(path: &Path) -> Result<SampleBlock> {
    let reader = WavReader::open(path)
        .with_context(|| format!("The warm up file is not available: {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE {
        anyhow::bail!(
            "Warm up file must be {}Hz, got {}Hz",
            SAMPLE_RATE,
            spec.sample_rate
        );
    }

    let channels = spec.channels.max(1) as usize;
    let wanted = (SAMPLE_RATE * WARMUP_SECONDS) as usize * channels;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .take(wanted)
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .take(wanted)
            .collect::<Result<_, _>>()?,
        (format, bits) => anyhow::bail!("Unsupported warm up sample format {:?}/{}", format, bits),
    };

    Ok(interleaved.into_iter().step_by(channels).collect())
}

/// Feed the warm-up file through a fresh recognizer for `language`.
pub async fn warm_up(factory: &dyn RecognizerFactory, language: &str, path: &Path) -> Result<()> {
    let samples = load_warmup_audio(path)?;
    let mut recognizer = factory
        .create(language)
        .await
        .context("Failed to create recognizer for warm up")?;

    let sample_count = samples.len();
    recognizer.submit(samples).await.context("Warm up submission failed")?;
    recognizer.finish().await.context("Warm up flush failed")?;

    info!("Recognizer is warmed up ({} samples).", sample_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for channel in 0..channels {
                let value = if channel == 0 { 16384 } else { -16384 };
                writer.write_sample(if i % 2 == 0 { value } else { 0i16 }).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_loads_at_most_one_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warmup.wav");
        write_wav(&path, 16000, 1, 24000);

        let samples = load_warmup_audio(&path).unwrap();
        assert_eq!(samples.len(), 16000);
        assert_eq!(samples[0], 0.5);
        assert_eq!(samples[1], 0.0);
    }

    #[test]
    fn test_takes_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 16000, 2, 100);

        let samples = load_warmup_audio(&path).unwrap();
        assert_eq!(samples.len(), 100);
        assert!(samples.iter().all(|&s| s >= 0.0));
    }

    #[test]
    fn test_rejects_other_sample_rates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd.wav");
        write_wav(&path, 44100, 1, 100);
        assert!(load_warmup_audio(&path).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_warmup_audio(Path::new("/nonexistent/warmup.wav")).unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
