use ndarray::{Array3, Array4};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use voice_emotion_core::config::{FEATURE_SHAPE, NORMALIZED_LEN, SAMPLE_RATE_HZ};
use voice_emotion_core::decode::{SymphoniaAudioLoader, Upload};
use voice_emotion_core::emotion::Emotion;
use voice_emotion_core::features::{pad_or_crop, FeatureTensor};
use voice_emotion_core::model::{
    EmotionModel, InferenceError, ModelLoadError, ModelLoader, ModelState, PredictError,
};
use voice_emotion_core::pipeline::{RecognizeError, Recognizer};

/// Softmax over per-channel means, so the output depends on the input.
struct MeanSoftmaxModel {
    calls: Arc<AtomicUsize>,
    last_shape: Arc<Mutex<Option<(usize, usize, usize, usize)>>>,
}

impl EmotionModel for MeanSoftmaxModel {
    fn forward(&self, batch: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_shape.lock().expect("lock") = Some(batch.dim());

        let mean = batch.mean().unwrap_or(0.0);
        let logits: Vec<f32> = (0..8).map(|i| (i as f32 * mean * 1e-3).sin()).collect();
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        Ok(exps.into_iter().map(|e| e / sum).collect())
    }
}

#[derive(Clone, Default)]
struct Counters {
    loads: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    last_shape: Arc<Mutex<Option<(usize, usize, usize, usize)>>>,
}

struct FakeLoader {
    counters: Counters,
    fail: bool,
}

impl ModelLoader for FakeLoader {
    type Model = MeanSoftmaxModel;

    fn load(&self) -> Result<MeanSoftmaxModel, ModelLoadError> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ModelLoadError::Invalid {
                path: "emotion_recognition_model.onnx".into(),
                details: "truncated file".to_owned(),
            });
        }
        Ok(MeanSoftmaxModel {
            calls: Arc::clone(&self.counters.calls),
            last_shape: Arc::clone(&self.counters.last_shape),
        })
    }
}

fn recognizer(fail: bool) -> (Recognizer<SymphoniaAudioLoader, FakeLoader>, Counters) {
    let counters = Counters::default();
    let loader = FakeLoader {
        counters: counters.clone(),
        fail,
    };
    (Recognizer::new(SymphoniaAudioLoader::new(), loader), counters)
}

fn wav_upload(name: &str, sample_rate: u32, channels: u16, samples: &[f32]) -> Upload {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for &s in samples {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    Upload::new(name, cursor.into_inner())
}

#[test]
fn two_seconds_of_silence() {
    let (rec, counters) = recognizer(false);
    let upload = wav_upload("silence.wav", 16_000, 1, &vec![0.0; 32_000]);

    let waveform = rec.decode(&upload).expect("decodable");
    assert_eq!(waveform.sample_rate, SAMPLE_RATE_HZ);
    assert_eq!(waveform.len(), 32_000);

    let normalized = pad_or_crop(&waveform, 5);
    assert_eq!(normalized.len(), NORMALIZED_LEN);
    assert!(normalized.samples().iter().all(|&s| s == 0.0));

    let tensor = rec.features(&waveform);
    assert_eq!(tensor.shape(), FEATURE_SHAPE);

    let result = rec.recognize(&upload).expect("recognized");
    assert_eq!(result.waveform.len(), 32_000);

    let p = result.prediction;
    let entries: Vec<(Emotion, f32)> = p.distribution().collect();
    assert_eq!(entries.len(), 8);
    assert!(entries.iter().all(|&(_, v)| v >= 0.0));
    assert!((p.total() - 1.0).abs() < 1e-4);

    let argmax = p
        .probabilities()
        .iter()
        .enumerate()
        .fold(0, |best, (i, &v)| if v > p.probabilities()[best] { i } else { best });
    assert_eq!(p.top(), Emotion::ALL[argmax]);

    assert_eq!(
        *counters.last_shape.lock().expect("lock"),
        Some((1, 157, 40, 3))
    );
}

#[test]
fn eight_second_stereo_clip_is_truncated() {
    let (rec, _) = recognizer(false);
    let frames = 8 * 22_050;
    let interleaved: Vec<f32> = (0..frames)
        .flat_map(|i| {
            let v = 0.2 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22_050.0).sin();
            [v, v]
        })
        .collect();
    let upload = wav_upload("long.wav", 22_050, 2, &interleaved);

    let waveform = rec.decode(&upload).expect("decodable");
    assert_eq!(waveform.len(), 8 * 16_000);
    assert_eq!(pad_or_crop(&waveform, 5).len(), NORMALIZED_LEN);

    let tensor = rec.features(&waveform);
    assert_eq!(tensor.shape(), FEATURE_SHAPE);

    let result = rec.recognize(&upload).expect("recognized");
    assert_eq!(result.prediction.distribution().count(), 8);
}

#[test]
fn mp3_upload_is_recognized() {
    let (rec, counters) = recognizer(false);
    let upload = Upload::new(
        "tone.mp3",
        include_bytes!("fixtures/tone_517hz.mp3").to_vec(),
    );

    let result = rec.recognize(&upload).expect("recognized");
    assert_eq!(result.waveform.sample_rate, SAMPLE_RATE_HZ);
    assert_eq!(result.waveform.len(), 16_719);
    assert!(result.waveform.peak() > 1e-3);
    assert_eq!(result.prediction.distribution().count(), 8);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn text_bytes_fail_to_decode_without_touching_the_model() {
    let (rec, counters) = recognizer(false);
    let upload = Upload::new("notes.wav", b"hello, this is plain text".to_vec());

    let err = rec.recognize(&upload).unwrap_err();
    assert!(matches!(err, RecognizeError::Decode(_)), "{err}");
    assert_eq!(counters.loads.load(Ordering::SeqCst), 0);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 0);
    assert_eq!(rec.model_state(), ModelState::Unloaded);
}

#[test]
fn decode_failure_leaves_loaded_model_intact() {
    let (rec, counters) = recognizer(false);
    let good = wav_upload("a.wav", 16_000, 1, &vec![0.01; 16_000]);

    rec.recognize(&good).expect("first request");
    assert!(rec.recognize(&Upload::new("b.mp3", vec![1, 2, 3])).is_err());
    rec.recognize(&good).expect("third request");

    assert_eq!(rec.model_state(), ModelState::Loaded);
    assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn malformed_tensor_is_stopped_by_the_shape_guard() {
    let (rec, counters) = recognizer(false);
    let bad = FeatureTensor::from_array(Array3::zeros((157, 20, 3)));

    match rec.classify(&bad) {
        Err(PredictError::ShapeMismatch(e)) => {
            assert_eq!(e.actual, [157, 20, 3]);
            assert_eq!(e.expected, [157, 40, 3]);
        }
        other => panic!("expected shape mismatch, got {other:?}"),
    }
    assert_eq!(counters.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn model_load_failure_is_reported_per_request() {
    let (rec, counters) = recognizer(true);
    let upload = wav_upload("a.wav", 16_000, 1, &vec![0.0; 8_000]);

    for _ in 0..2 {
        let err = rec.recognize(&upload).unwrap_err();
        assert!(matches!(
            err,
            RecognizeError::Predict(PredictError::ModelLoad(ModelLoadError::Invalid { .. }))
        ));
    }
    assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
    assert_eq!(rec.model_state(), ModelState::LoadFailed);
}
