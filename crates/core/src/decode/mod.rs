mod resample;
mod symphonia;

#[cfg(feature = "ffmpeg")]
mod ffmpeg;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use self::symphonia::SymphoniaAudioLoader;
pub use resample::resample_mono;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegAudioLoader;

/// Mono PCM at a fixed sample rate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Waveform {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        duration_from_sample_count(self.sample_rate, 1, self.samples.len())
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        (sum_sq / self.samples.len() as f64).sqrt() as f32
    }
}

/// Container formats accepted for upload. Only used as a probe hint.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            _ => None,
        }
    }
}

/// One uploaded file: its bytes plus the name it was submitted under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new<S: Into<String>>(name: S, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|e| e.to_str())
    }

    pub fn declared_format(&self) -> Option<AudioFormat> {
        self.extension().and_then(AudioFormat::from_extension)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("audio payload is empty")]
    Empty,

    #[error("unsupported or unrecognised audio: {0}")]
    Unsupported(String),

    #[error("no decodable audio track")]
    NoAudioTrack,

    #[error("audio stream decoded to zero samples")]
    NoSamples,

    #[error("audio stream is corrupt: {0}")]
    Corrupt(String),

    #[error("resampling {from_hz} Hz -> {to_hz} Hz failed: {details}")]
    Resample {
        from_hz: u32,
        to_hz: u32,
        details: String,
    },

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Turns an uploaded byte stream into mono PCM at `target_rate`.
pub trait AudioLoader: Send + Sync {
    fn load(&self, upload: &Upload, target_rate: u32) -> Result<Waveform>;
}

impl<T: AudioLoader + ?Sized> AudioLoader for std::sync::Arc<T> {
    fn load(&self, upload: &Upload, target_rate: u32) -> Result<Waveform> {
        (**self).load(upload, target_rate)
    }
}

/// A container that decodes cleanly but holds no samples is rejected like an empty upload.
pub fn require_samples(samples: Vec<f32>) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Err(DecodeError::NoSamples);
    }
    Ok(samples)
}

/// Averages the channels of each interleaved frame. A trailing partial frame is dropped.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

pub fn duration_from_sample_count(
    sample_rate_hz: u32,
    channels: u16,
    sample_count: usize,
) -> Duration {
    if sample_rate_hz == 0 || channels == 0 {
        return Duration::from_secs(0);
    }
    let frames = sample_count / usize::from(channels);
    let micros = (u128::from(frames as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}
