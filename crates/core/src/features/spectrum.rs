//! Short-time power spectrum and mel projection.
//!
//! Follows the conventions of the feature pipeline the classifier was trained
//! on: centered frames with zero padding, periodic Hann window, power
//! spectrum, Slaney-style mel scale with area normalisation, and a decibel
//! conversion clipped to a fixed dynamic range below the peak.

use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

pub struct Stft {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    n_fft: usize,
    hop_length: usize,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n_fft);
        Self {
            fft,
            window: hann_window(n_fft),
            n_fft,
            hop_length,
        }
    }

    pub fn n_freqs(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frame count for a signal of `len` samples once padded by `n_fft / 2` on each side.
    pub fn n_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Power spectrogram with shape `(n_fft / 2 + 1, n_frames)`.
    pub fn power(&self, signal: &[f32]) -> Array2<f32> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let n_frames = self.n_frames(signal.len());
        let n_freqs = self.n_freqs();
        let mut power = Array2::<f32>::zeros((n_freqs, n_frames));

        let mut scratch = vec![Complex::new(0.0f32, 0.0f32); self.fft.get_inplace_scratch_len()];
        let mut buffer = vec![Complex::new(0.0f32, 0.0f32); self.n_fft];

        for frame_idx in 0..n_frames {
            let start = frame_idx * self.hop_length;
            let frame = &padded[start..start + self.n_fft];

            for ((dst, &w), &s) in buffer.iter_mut().zip(&self.window).zip(frame) {
                *dst = Complex::new(s * w, 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (i, c) in buffer.iter().take(n_freqs).enumerate() {
                power[[i, frame_idx]] = c.norm_sqr();
            }
        }

        power
    }
}

/// Periodic Hann window (the DFT-even variant used for spectral analysis).
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()) as f32)
        .collect()
}

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filters with shape `(n_mels, n_fft / 2 + 1)`, each scaled to unit area.
pub fn mel_filterbank(
    sample_rate: u32,
    n_fft: usize,
    n_mels: usize,
    fmin: f64,
    fmax: f64,
) -> Array2<f32> {
    let n_freqs = n_fft / 2 + 1;
    let sr = f64::from(sample_rate);
    let fft_freqs: Vec<f64> = (0..n_freqs).map(|k| k as f64 * sr / n_fft as f64).collect();

    let min_mel = hz_to_mel(fmin);
    let max_mel = hz_to_mel(fmax);
    let n_points = n_mels + 2;
    let mel_f: Vec<f64> = (0..n_points)
        .map(|i| {
            let mel = min_mel + (max_mel - min_mel) * i as f64 / (n_points - 1) as f64;
            mel_to_hz(mel)
        })
        .collect();

    let mut weights = Array2::<f32>::zeros((n_mels, n_freqs));
    for m in 0..n_mels {
        let lower_width = mel_f[m + 1] - mel_f[m];
        let upper_width = mel_f[m + 2] - mel_f[m + 1];
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);

        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_f[m]) / lower_width;
            let upper = (mel_f[m + 2] - f) / upper_width;
            let w = lower.min(upper).max(0.0);
            weights[[m, k]] = (w * enorm) as f32;
        }
    }

    weights
}

/// `10 * log10(max(amin, S))`, clipped to `top_db` below the global peak.
pub fn power_to_db(power: &Array2<f32>, amin: f32, top_db: f32) -> Array2<f32> {
    let mut db = power.mapv(|v| 10.0 * v.max(amin).log10());
    let peak = db.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let floor = peak - top_db;
    db.mapv_inplace(|v| v.max(floor));
    db
}
