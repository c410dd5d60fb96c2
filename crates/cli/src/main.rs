#![deny(warnings)]

#[cfg(feature = "onnx")]
mod report;
#[cfg(feature = "onnx")]
mod run;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use voice_emotion_core::config::{
    resolve_intra_threads, resolve_model_path, AppConfig, DecoderKind, Env, InputSource,
    ModelConfig, OutputFormat, StdEnv, ENV_INTRA_THREADS, ENV_MODEL_PATH,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderArg {
    Symphonia,
    Ffmpeg,
}

impl From<DecoderArg> for DecoderKind {
    fn from(d: DecoderArg) -> Self {
        match d {
            DecoderArg::Symphonia => DecoderKind::Symphonia,
            DecoderArg::Ffmpeg => DecoderKind::Ffmpeg,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "voice-emotion")]
#[command(about = "Predict the emotion expressed in a short speech recording")]
struct Args {
    /// .wav or .mp3 file. Without it, one path per line is read from stdin.
    input: Option<PathBuf>,

    #[arg(long, env = ENV_MODEL_PATH)]
    model: Option<PathBuf>,

    #[arg(long, env = ENV_INTRA_THREADS)]
    intra_threads: Option<usize>,

    #[arg(long, value_enum, default_value_t = DecoderArg::Symphonia)]
    decoder: DecoderArg,

    /// Emit one JSON object per request instead of the text report.
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        model = %cfg.model.path.as_path().display(),
        intra_threads = cfg.model.intra_threads.get(),
        decoder = ?cfg.decoder,
        "config loaded"
    );

    execute(cfg)
}

#[cfg(feature = "onnx")]
fn execute(cfg: AppConfig) -> anyhow::Result<()> {
    run::run(cfg)
}

#[cfg(not(feature = "onnx"))]
fn execute(_cfg: AppConfig) -> anyhow::Result<()> {
    anyhow::bail!("voice-emotion was built without the `onnx` feature; no model backend is available")
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let input = match args.input {
        Some(path) => InputSource::File(path),
        None => InputSource::Stdin,
    };

    let model = ModelConfig {
        path: resolve_model_path(args.model, ENV_MODEL_PATH, env)?,
        intra_threads: resolve_intra_threads(args.intra_threads, ENV_INTRA_THREADS, env)?,
    };

    Ok(AppConfig {
        input,
        model,
        decoder: args.decoder.into(),
        output: if args.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_emotion_core::config::MapEnv;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).expect("valid arguments")
    }

    #[test]
    fn file_argument_selects_single_file_mode() {
        let cfg = build_config(parse(&["voice-emotion", "clip.wav", "--json"]), &MapEnv::default())
            .expect("config");
        assert_eq!(cfg.input, InputSource::File(PathBuf::from("clip.wav")));
        assert_eq!(cfg.output, OutputFormat::Json);
        assert_eq!(cfg.decoder, DecoderKind::Symphonia);
    }

    #[test]
    fn no_argument_reads_stdin() {
        let cfg = build_config(parse(&["voice-emotion"]), &MapEnv::default()).expect("config");
        assert_eq!(cfg.input, InputSource::Stdin);
        assert_eq!(cfg.output, OutputFormat::Text);
    }

    #[test]
    fn zero_threads_is_rejected() {
        let err = build_config(
            parse(&["voice-emotion", "--intra-threads", "0", "a.wav"]),
            &MapEnv::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("thread count"));
    }

    #[test]
    fn decoder_flag_parses() {
        let args = parse(&["voice-emotion", "--decoder", "ffmpeg", "a.mp3"]);
        assert_eq!(DecoderKind::from(args.decoder), DecoderKind::Ffmpeg);
    }
}
