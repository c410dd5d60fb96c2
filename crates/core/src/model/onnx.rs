//! ONNX Runtime backend.
//!
//! The classifier ships as an ONNX export of the Keras network with input
//! `(N, 157, 40, 3)` f32 and a softmax output `(N, 8)`. Inputs and outputs
//! are bound by position, so the graph's tensor names do not matter.

use crate::config::ModelConfig;
use crate::model::{EmotionModel, InferenceError, ModelLoadError, ModelLoader};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::Mutex;

pub struct OnnxModelLoader {
    path: PathBuf,
    intra_threads: usize,
}

impl OnnxModelLoader {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            path: config.path.as_path().to_path_buf(),
            intra_threads: config.intra_threads.get(),
        }
    }

    fn invalid(&self, details: impl std::fmt::Display) -> ModelLoadError {
        ModelLoadError::Invalid {
            path: self.path.clone(),
            details: details.to_string(),
        }
    }
}

impl ModelLoader for OnnxModelLoader {
    type Model = OnnxEmotionModel;

    fn load(&self) -> Result<OnnxEmotionModel, ModelLoadError> {
        if !self.path.is_file() {
            return Err(ModelLoadError::NotFound {
                path: self.path.clone(),
            });
        }

        tracing::debug!(
            path = %self.path.display(),
            intra_threads = self.intra_threads,
            "creating ONNX session"
        );

        let session = Session::builder()
            .map_err(|e| self.invalid(e))?
            .with_intra_threads(self.intra_threads)
            .map_err(|e| self.invalid(e))?
            .commit_from_file(&self.path)
            .map_err(|e| self.invalid(e))?;

        Ok(OnnxEmotionModel {
            session: Mutex::new(session),
        })
    }
}

/// Loaded ONNX session. Running a session needs exclusive access, hence the mutex.
pub struct OnnxEmotionModel {
    session: Mutex<Session>,
}

impl EmotionModel for OnnxEmotionModel {
    fn forward(&self, batch: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let mut session = match self.session.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("ONNX session lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        };

        let input = Tensor::from_array(batch)
            .map_err(|e| InferenceError(format!("failed to create input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| InferenceError(e.to_string()))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| InferenceError("model produced no output".to_owned()))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError(format!("failed to extract output: {e}")))?;

        let output_shape: Vec<i64> = shape.iter().copied().collect();
        tracing::debug!(?output_shape, "model output");

        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelPath;

    #[test]
    fn missing_artifact_is_not_found() {
        let config = ModelConfig {
            path: ModelPath::new("does/not/exist.onnx").expect("non-empty"),
            ..Default::default()
        };
        let err = OnnxModelLoader::new(&config).load().err().expect("load must fail");
        assert_eq!(
            err,
            ModelLoadError::NotFound {
                path: PathBuf::from("does/not/exist.onnx")
            }
        );
    }

    #[test]
    fn garbage_artifact_is_invalid() {
        let path = std::env::temp_dir().join(format!(
            "voice-emotion-garbage-{}.onnx",
            std::process::id()
        ));
        std::fs::write(&path, b"not a protobuf").expect("write temp model");

        let config = ModelConfig {
            path: ModelPath::new(path.clone()).expect("non-empty"),
            ..Default::default()
        };
        let result = OnnxModelLoader::new(&config).load();
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(ModelLoadError::Invalid { .. })));
    }
}
