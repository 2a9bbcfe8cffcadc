use std::io::Cursor;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::domain::DomainError;

/// Finalized audio produced when a recording session stops.
///
/// The WAV bytes are zeroed on drop; audio never outlives the transcription
/// call unless the user has opted into keeping recordings. Consumed exactly
/// once by the provider router.
#[derive(Debug, Zeroize)]
#[zeroize(drop)]
pub struct AudioArtifact {
    /// Encoded WAV (16-bit PCM mono).
    wav_bytes: Vec<u8>,
    /// Unix timestamp in milliseconds at which recording started.
    #[zeroize(skip)]
    started_at_ms: i64,
    /// Wall-clock recording duration in seconds.
    #[zeroize(skip)]
    duration_secs: f64,
}

impl AudioArtifact {
    pub fn new(wav_bytes: Vec<u8>, started_at_ms: i64, duration_secs: f64) -> Self {
        Self {
            wav_bytes,
            started_at_ms,
            duration_secs,
        }
    }

    pub fn wav_bytes(&self) -> &[u8] {
        &self.wav_bytes
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn is_empty(&self) -> bool {
        self.wav_bytes.is_empty()
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Maximum recording duration in seconds (ring buffer size).
    pub buffer_duration_secs: u32,
    /// Target sample rate in Hz.
    pub sample_rate: u32,
    /// Level updates per second pushed to the visualization.
    pub level_updates_per_sec: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_duration_secs: 120,
            sample_rate: 16_000, // 16kHz mono, what speech models expect
            level_updates_per_sec: 10,
        }
    }
}

impl CaptureConfig {
    /// Ring buffer capacity in samples.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_duration_secs as usize * self.sample_rate as usize
    }
}

/// Aggregate loudness of a finalized WAV artifact.
#[derive(Debug, Clone, Copy)]
pub struct AudioAnalysis {
    pub rms: f32,
    pub peak: f32,
}

impl AudioAnalysis {
    const RMS_THRESHOLD: f32 = 0.01;
    const PEAK_THRESHOLD: f32 = 0.02;

    /// Whether the audio is effectively silent (no speech to transcribe).
    /// Diagnostic only; a finalized recording always produces a history
    /// entry regardless.
    pub fn is_silent(&self) -> bool {
        self.rms < Self::RMS_THRESHOLD && self.peak < Self::PEAK_THRESHOLD
    }
}

/// Analyze a WAV buffer and report RMS and peak amplitude, normalized to
/// the [0, 1] range.
pub fn analyze_wav(wav_bytes: &[u8]) -> Result<AudioAnalysis, DomainError> {
    let mut reader = hound::WavReader::new(Cursor::new(wav_bytes))
        .map_err(|e| DomainError::Capture(format!("Failed to parse WAV audio: {}", e)))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::Capture(format!("Failed to read samples: {}", e)))?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::Capture(format!("Failed to read samples: {}", e)))?,
    };

    if samples.is_empty() {
        return Ok(AudioAnalysis { rms: 0.0, peak: 0.0 });
    }

    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();
    let peak = samples.iter().map(|&s| s.abs()).fold(0.0f32, f32::max);

    Ok(AudioAnalysis { rms, peak })
}

/// Encode 16-bit PCM samples into an in-memory WAV buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, DomainError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| DomainError::Capture(format!("Failed to create WAV writer: {}", e)))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| DomainError::Capture(format!("Failed to write sample: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| DomainError::Capture(format!("Failed to finalize WAV: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_accessors() {
        let artifact = AudioArtifact::new(vec![1, 2, 3], 1_700_000_000_000, 3.2);
        assert_eq!(artifact.wav_bytes(), &[1, 2, 3]);
        assert_eq!(artifact.started_at_ms(), 1_700_000_000_000);
        assert!((artifact.duration_secs() - 3.2).abs() < f64::EPSILON);
        assert!(!artifact.is_empty());
    }

    #[test]
    fn test_capture_config_buffer_capacity() {
        let config = CaptureConfig::default();
        assert_eq!(config.buffer_capacity(), 120 * 16_000);
    }

    #[test]
    fn test_encode_then_analyze_silence() {
        let wav = encode_wav(&vec![0i16; 1600], 16_000).unwrap();
        let analysis = analyze_wav(&wav).unwrap();
        assert!(analysis.is_silent());
        assert_eq!(analysis.peak, 0.0);
    }

    #[test]
    fn test_loud_audio_is_not_silent() {
        let samples: Vec<i16> = (0..1600)
            .map(|i| if i % 2 == 0 { 12_000 } else { -12_000 })
            .collect();
        let wav = encode_wav(&samples, 16_000).unwrap();
        let analysis = analyze_wav(&wav).unwrap();
        assert!(!analysis.is_silent());
        assert!(analysis.rms > 0.3);
    }

    #[test]
    fn test_analyze_empty_wav() {
        let wav = encode_wav(&[], 16_000).unwrap();
        let analysis = analyze_wav(&wav).unwrap();
        assert!(analysis.is_silent());
    }

    #[test]
    fn test_analyze_rejects_garbage() {
        assert!(analyze_wav(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }
}
