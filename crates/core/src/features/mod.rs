//! Waveform to classifier input: MFCC, delta and delta-delta stacked as
//! three channels of a `(time, band, channel)` tensor.

mod delta;
mod mfcc;
pub mod normalize;
mod spectrum;

use crate::config::{
    FEATURE_CHANNELS, FEATURE_SHAPE, N_MFCC, SAMPLE_RATE_HZ, TARGET_DURATION_SECS, TIME_FRAMES,
};
use crate::decode::Waveform;
use ndarray::{s, Array2, Array3, Array4, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

pub use delta::{delta, DELTA_WIDTH};
pub use mfcc::dct_basis;
pub use normalize::{pad_or_crop, NormalizedWaveform};
pub use spectrum::{hann_window, hz_to_mel, mel_filterbank, mel_to_hz, power_to_db, Stft};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("feature shape mismatch: got {actual:?}, expected {expected:?}")]
pub struct ShapeMismatchError {
    pub actual: [usize; 3],
    pub expected: [usize; 3],
}

/// Parameters of the short-time cepstral transform.
///
/// These are pinned to what the classifier was trained with; changing any of
/// them changes the numeric input distribution even when the shape still fits.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeatureParams {
    pub sample_rate: u32,
    pub duration_secs: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
    pub fmin_hz: f64,
    /// Upper mel edge; `None` means Nyquist.
    pub fmax_hz: Option<f64>,
    pub amin: f32,
    pub top_db: f32,
    pub delta_width: usize,
    pub time_frames: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE_HZ,
            duration_secs: TARGET_DURATION_SECS,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            n_mfcc: N_MFCC,
            fmin_hz: 0.0,
            fmax_hz: None,
            amin: 1e-10,
            top_db: 80.0,
            delta_width: DELTA_WIDTH,
            time_frames: TIME_FRAMES,
        }
    }
}

/// Classifier input without the batch dimension.
///
/// Any 3-D array can be wrapped; the shape contract is checked where the
/// tensor is consumed (see [`FeatureTensor::ensure_shape`]).
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTensor(Array3<f32>);

impl FeatureTensor {
    pub fn from_array(array: Array3<f32>) -> Self {
        Self(array)
    }

    pub fn shape(&self) -> [usize; 3] {
        let (t, b, c) = self.0.dim();
        [t, b, c]
    }

    pub fn ensure_shape(&self, expected: [usize; 3]) -> Result<(), ShapeMismatchError> {
        let actual = self.shape();
        if actual != expected {
            return Err(ShapeMismatchError { actual, expected });
        }
        Ok(())
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.0.view()
    }

    /// Copy with a leading batch axis of size 1.
    pub fn to_batch(&self) -> Array4<f32> {
        self.0.clone().insert_axis(Axis(0))
    }
}

pub struct FeatureExtractor {
    params: FeatureParams,
    stft: Stft,
    mel_basis: Array2<f32>,
    dct: Array2<f32>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureParams::default())
    }
}

impl FeatureExtractor {
    pub fn new(params: FeatureParams) -> Self {
        let fmax = params
            .fmax_hz
            .unwrap_or(f64::from(params.sample_rate) / 2.0);
        let mel_basis = mel_filterbank(
            params.sample_rate,
            params.n_fft,
            params.n_mels,
            params.fmin_hz,
            fmax,
        );
        let dct = dct_basis(params.n_mfcc, params.n_mels);
        let stft = Stft::new(params.n_fft, params.hop_length);

        tracing::debug!(
            sample_rate = params.sample_rate,
            n_fft = params.n_fft,
            hop_length = params.hop_length,
            n_mels = params.n_mels,
            n_mfcc = params.n_mfcc,
            "feature extractor initialized"
        );

        Self {
            params,
            stft,
            mel_basis,
            dct,
        }
    }

    pub fn params(&self) -> &FeatureParams {
        &self.params
    }

    /// Output shape of [`FeatureExtractor::extract`].
    pub fn output_shape(&self) -> [usize; 3] {
        [self.params.time_frames, self.params.n_mfcc, FEATURE_CHANNELS]
    }

    /// Frame count of the transform before the time axis is fitted.
    pub fn natural_frames(&self) -> usize {
        let len = normalize::target_len(self.params.sample_rate, self.params.duration_secs);
        self.stft.n_frames(len)
    }

    /// MFCC matrix with shape `(n_mfcc, n_frames)`.
    pub fn mfcc(&self, samples: &[f32]) -> Array2<f32> {
        let power = self.stft.power(samples);
        let mel = self.mel_basis.dot(&power);
        let db = power_to_db(&mel, self.params.amin, self.params.top_db);
        self.dct.dot(&db)
    }

    pub fn extract(&self, waveform: &Waveform) -> FeatureTensor {
        if waveform.sample_rate != self.params.sample_rate {
            tracing::warn!(
                got = waveform.sample_rate,
                expected = self.params.sample_rate,
                "waveform sample rate differs from extractor rate"
            );
        }

        let normalized = pad_or_crop(waveform, self.params.duration_secs);
        let mfcc = self.mfcc(normalized.samples());
        let d1 = delta(&mfcc, self.params.delta_width, 1);
        let d2 = delta(&mfcc, self.params.delta_width, 2);

        let natural_frames = mfcc.ncols();
        let stacked = stack_channels([&mfcc, &d1, &d2]);
        let fitted = fit_time_axis(stacked, self.params.time_frames);

        tracing::debug!(
            input_samples = waveform.len(),
            natural_frames,
            shape = ?fitted.dim(),
            "extracted features"
        );

        let tensor = FeatureTensor(fitted);
        debug_assert_eq!(tensor.shape(), self.output_shape());
        if self.params == FeatureParams::default() {
            debug_assert_eq!(tensor.shape(), FEATURE_SHAPE);
        }
        tensor
    }
}

/// Transposes each `(bands, frames)` matrix and stacks them on a trailing channel axis.
pub fn stack_channels(channels: [&Array2<f32>; 3]) -> Array3<f32> {
    let (bands, frames) = channels[0].dim();
    Array3::from_shape_fn((frames, bands, channels.len()), |(t, b, c)| {
        channels[c][[b, t]]
    })
}

/// Zero-pads the time axis at the end, or keeps its first `frames` entries.
pub fn fit_time_axis(features: Array3<f32>, frames: usize) -> Array3<f32> {
    let (t, bands, channels) = features.dim();
    if t == frames {
        return features;
    }
    let keep = t.min(frames);
    let mut out = Array3::<f32>::zeros((frames, bands, channels));
    out.slice_mut(s![..keep, .., ..])
        .assign(&features.slice(s![..keep, .., ..]));
    out
}
