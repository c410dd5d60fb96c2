use crate::{
    decode::{AudioLoader, DecodeError, Upload, Waveform},
    emotion::Prediction,
    features::{FeatureExtractor, FeatureParams, FeatureTensor},
    model::{CachedModel, ModelLoader, ModelState, PredictError},
};
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum RecognizeError {
    #[error("could not decode audio: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Predict(#[from] PredictError),
}

/// Everything the presentation layer needs for one upload.
#[derive(Clone, Debug)]
pub struct Recognition {
    pub waveform: Waveform,
    pub prediction: Prediction,
}

/// One-request-at-a-time recognizer: decode, featurize, classify.
///
/// Owns the cached model, so a single `Recognizer` should live for the whole
/// process and serve every upload.
pub struct Recognizer<A, L: ModelLoader> {
    loader: A,
    extractor: FeatureExtractor,
    model: CachedModel<L>,
}

impl<A, L> Recognizer<A, L>
where
    A: AudioLoader,
    L: ModelLoader,
{
    pub fn new(loader: A, model_loader: L) -> Self {
        Self::with_params(loader, model_loader, FeatureParams::default())
    }

    pub fn with_params(loader: A, model_loader: L, params: FeatureParams) -> Self {
        Self {
            loader,
            extractor: FeatureExtractor::new(params),
            model: CachedModel::new(model_loader),
        }
    }

    pub fn model_state(&self) -> ModelState {
        self.model.state()
    }

    /// Rate every decoded waveform is delivered at.
    pub fn sample_rate(&self) -> u32 {
        self.extractor.params().sample_rate
    }

    pub fn decode(&self, upload: &Upload) -> Result<Waveform, DecodeError> {
        if upload.declared_format().is_none() {
            tracing::warn!(
                name = %upload.name,
                "upload is not .wav or .mp3; attempting to decode anyway"
            );
        }
        self.loader.load(upload, self.sample_rate())
    }

    pub fn features(&self, waveform: &Waveform) -> FeatureTensor {
        self.extractor.extract(waveform)
    }

    pub fn classify(&self, tensor: &FeatureTensor) -> Result<Prediction, PredictError> {
        self.model.predict(tensor)
    }

    pub fn recognize(&self, upload: &Upload) -> Result<Recognition, RecognizeError> {
        let started = Instant::now();
        let span = tracing::info_span!("recognize", name = %upload.name, bytes = upload.bytes.len());
        let _enter = span.enter();

        let waveform = self.decode(upload)?;
        tracing::debug!(
            samples = waveform.len(),
            sample_rate = waveform.sample_rate,
            "decoded upload"
        );

        let tensor = self.features(&waveform);
        let prediction = self.classify(&tensor)?;

        tracing::info!(
            label = %prediction.top(),
            probability = prediction.top_probability(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recognized"
        );

        Ok(Recognition {
            waveform,
            prediction,
        })
    }
}
