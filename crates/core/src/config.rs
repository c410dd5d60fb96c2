use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const TARGET_DURATION_SECS: u32 = 5;
pub const NORMALIZED_LEN: usize = (SAMPLE_RATE_HZ * TARGET_DURATION_SECS) as usize;

pub const N_MFCC: usize = 40;
pub const TIME_FRAMES: usize = 157;
pub const FEATURE_CHANNELS: usize = 3;

/// Input shape of the classifier, excluding the batch dimension.
///
/// Both the feature extractor's output and the model wrapper's input check
/// refer to this constant.
pub const FEATURE_SHAPE: [usize; 3] = [TIME_FRAMES, N_MFCC, FEATURE_CHANNELS];

/// ONNX export of the trained Keras network `emotion_recognition_model(new).h5`.
pub const DEFAULT_MODEL_PATH: &str = "emotion_recognition_model.onnx";
pub const DEFAULT_INTRA_THREADS: usize = 1;
pub const ENV_MODEL_PATH: &str = "VOICE_EMOTION_MODEL";
pub const ENV_INTRA_THREADS: &str = "VOICE_EMOTION_INTRA_THREADS";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Stdin,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelPath(PathBuf);

impl ModelPath {
    pub fn new<P: Into<PathBuf>>(value: P) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.as_os_str().is_empty() {
            return Err(ConfigError::EmptyModelPath);
        }
        Ok(Self(v))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl Default for ModelPath {
    fn default() -> Self {
        Self(PathBuf::from(DEFAULT_MODEL_PATH))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntraThreads(usize);

impl IntraThreads {
    pub fn new(value: usize) -> Result<Self, ConfigError> {
        if value == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for IntraThreads {
    fn default() -> Self {
        Self(DEFAULT_INTRA_THREADS)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    pub path: ModelPath,
    pub intra_threads: IntraThreads,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DecoderKind {
    #[default]
    Symphonia,
    Ffmpeg,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub input: InputSource,
    pub model: ModelConfig,
    pub decoder: DecoderKind,
    pub output: OutputFormat,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("model path must not be empty")]
    EmptyModelPath,
    #[error("intra-op thread count must be > 0")]
    ZeroThreads,
    #[error("{key} is not a valid thread count: {value:?}")]
    InvalidThreads { key: String, value: String },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_model_path(
    cli_value: Option<PathBuf>,
    env_key: &str,
    env: &impl Env,
) -> Result<ModelPath, ConfigError> {
    match cli_value {
        Some(v) => ModelPath::new(v),
        None => match env.var(env_key) {
            Some(v) => ModelPath::new(v),
            None => Ok(ModelPath::default()),
        },
    }
}

pub fn resolve_intra_threads(
    cli_value: Option<usize>,
    env_key: &str,
    env: &impl Env,
) -> Result<IntraThreads, ConfigError> {
    match cli_value {
        Some(v) => IntraThreads::new(v),
        None => match env.var(env_key) {
            Some(v) => {
                let n = v
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidThreads {
                        key: env_key.to_owned(),
                        value: v.clone(),
                    })?;
                IntraThreads::new(n)
            }
            None => Ok(IntraThreads::default()),
        },
    }
}
