use serde::Serialize;
use std::fmt::Write as _;
use voice_emotion_core::decode::Waveform;
use voice_emotion_core::emotion::{Emotion, Prediction};
use voice_emotion_core::pipeline::Recognition;

const BAR_WIDTH: usize = 40;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct WaveformSummary {
    pub sample_rate: u32,
    pub samples: usize,
    pub duration_secs: f64,
    pub peak: f32,
    pub rms: f32,
}

impl From<&Waveform> for WaveformSummary {
    fn from(w: &Waveform) -> Self {
        Self {
            sample_rate: w.sample_rate,
            samples: w.len(),
            duration_secs: w.duration().as_secs_f64(),
            peak: w.peak(),
            rms: w.rms(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub source: &'a str,
    pub waveform: WaveformSummary,
    pub label: Emotion,
    pub probability: f32,
    pub probabilities: &'a Prediction,
}

impl<'a> Report<'a> {
    pub fn new(source: &'a str, recognition: &'a Recognition) -> Self {
        let prediction = &recognition.prediction;
        Self {
            source,
            waveform: WaveformSummary::from(&recognition.waveform),
            label: prediction.top(),
            probability: prediction.top_probability(),
            probabilities: prediction,
        }
    }

    pub fn to_text(&self) -> String {
        let w = &self.waveform;
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.source);
        let _ = writeln!(
            out,
            "  waveform  {} Hz, {} samples, {:.2} s, peak {:.3}, rms {:.3}",
            w.sample_rate, w.samples, w.duration_secs, w.peak, w.rms
        );
        let _ = writeln!(
            out,
            "  emotion   {} ({:.1}%)",
            self.label.as_str().to_uppercase(),
            self.probability * 100.0
        );
        for (emotion, p) in self.probabilities.distribution() {
            let _ = writeln!(
                out,
                "  {:<10}{} {:>5.1}%",
                emotion.as_str(),
                bar(p),
                p * 100.0
            );
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub source: &'a str,
    pub error: String,
}

impl FailureReport<'_> {
    pub fn to_text(&self) -> String {
        format!("{}\n  error     {}\n", self.source, self.error)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn bar(p: f32) -> String {
    let filled = ((p.clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize).min(BAR_WIDTH);
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}
