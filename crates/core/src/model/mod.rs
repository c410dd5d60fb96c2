mod cache;

#[cfg(feature = "onnx")]
mod onnx;

use crate::config::FEATURE_SHAPE;
use crate::emotion::{InvalidScores, Prediction};
use crate::features::{FeatureTensor, ShapeMismatchError};
use ndarray::Array4;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub use cache::{ModelCache, ModelState};

#[cfg(feature = "onnx")]
pub use onnx::{OnnxEmotionModel, OnnxModelLoader};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadError {
    #[error("model artifact not found at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("model artifact at {} could not be loaded: {details}", .path.display())]
    Invalid { path: PathBuf, details: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

#[derive(thiserror::Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeMismatchError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("model output is not a probability distribution: {0}")]
    InvalidOutput(#[from] InvalidScores),
}

/// A loaded classifier.
pub trait EmotionModel: Send + Sync {
    /// Runs the network on a `(1, time, band, channel)` batch and returns its output row.
    fn forward(&self, batch: Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

pub trait ModelLoader: Send + Sync {
    type Model: EmotionModel;

    fn load(&self) -> Result<Self::Model, ModelLoadError>;
}

/// Runs `model` on one tensor after checking it against [`FEATURE_SHAPE`].
pub fn run_model<M: EmotionModel + ?Sized>(
    model: &M,
    tensor: &FeatureTensor,
) -> Result<Prediction, PredictError> {
    tensor.ensure_shape(FEATURE_SHAPE)?;
    let scores = model.forward(tensor.to_batch())?;
    Ok(Prediction::from_scores(&scores)?)
}

/// Model wrapper that loads lazily, once, and is shared for the process lifetime.
pub struct CachedModel<L: ModelLoader> {
    loader: L,
    cache: ModelCache<L::Model>,
}

impl<L: ModelLoader> CachedModel<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cache: ModelCache::new(),
        }
    }

    pub fn load(&self) -> Result<Arc<L::Model>, ModelLoadError> {
        self.cache.get_or_try_load(|| {
            let started = Instant::now();
            tracing::info!("loading emotion model");
            let result = self.loader.load();
            match &result {
                Ok(_) => tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "emotion model loaded"
                ),
                Err(e) => tracing::error!(error = %e, "emotion model failed to load"),
            }
            result
        })
    }

    pub fn state(&self) -> ModelState {
        self.cache.state()
    }

    /// Rejects a mis-shaped tensor before the model is loaded or invoked.
    pub fn predict(&self, tensor: &FeatureTensor) -> Result<Prediction, PredictError> {
        tensor.ensure_shape(FEATURE_SHAPE)?;
        let model = self.load()?;
        run_model(model.as_ref(), tensor)
    }
}
