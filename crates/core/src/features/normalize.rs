use crate::decode::Waveform;
use std::ops::Deref;

/// A waveform whose length is exactly `sample_rate * duration_secs` samples.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedWaveform {
    inner: Waveform,
    duration_secs: u32,
}

impl NormalizedWaveform {
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }
}

impl Deref for NormalizedWaveform {
    type Target = Waveform;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub fn target_len(sample_rate: u32, duration_secs: u32) -> usize {
    sample_rate as usize * duration_secs as usize
}

/// Right-pads with zeros or keeps the leading samples.
pub fn pad_or_crop(waveform: &Waveform, duration_secs: u32) -> NormalizedWaveform {
    let max_len = target_len(waveform.sample_rate, duration_secs);
    let mut samples = waveform.samples.clone();
    samples.resize(max_len, 0.0);

    NormalizedWaveform {
        inner: Waveform::new(waveform.sample_rate, samples),
        duration_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Waveform {
        Waveform::new(16_000, (0..len).map(|i| i as f32 + 1.0).collect())
    }

    #[test]
    fn exact_length_is_unchanged() {
        let w = ramp(80_000);
        let n = pad_or_crop(&w, 5);
        assert_eq!(n.samples(), w.samples.as_slice());
    }

    #[test]
    fn short_input_is_zero_padded_on_the_right() {
        let w = ramp(32_000);
        let n = pad_or_crop(&w, 5);
        assert_eq!(n.len(), 80_000);
        assert_eq!(&n.samples()[..32_000], w.samples.as_slice());
        assert!(n.samples()[32_000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn long_input_keeps_the_start() {
        let w = ramp(128_000);
        let n = pad_or_crop(&w, 5);
        assert_eq!(n.len(), 80_000);
        assert_eq!(n.samples(), &w.samples[..80_000]);
    }

    #[test]
    fn empty_input_becomes_silence() {
        let n = pad_or_crop(&Waveform::new(16_000, Vec::new()), 5);
        assert_eq!(n.len(), 80_000);
        assert!(n.samples().iter().all(|&s| s == 0.0));
        assert_eq!(n.sample_rate, 16_000);
        assert_eq!(n.duration_secs(), 5);
    }
}
