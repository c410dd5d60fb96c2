use crate::report::{FailureReport, Report};
use anyhow::Context;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use voice_emotion_core::config::{AppConfig, DecoderKind, InputSource, OutputFormat};
use voice_emotion_core::decode::{AudioLoader, SymphoniaAudioLoader, Upload};
use voice_emotion_core::model::{ModelLoader, OnnxModelLoader};
use voice_emotion_core::pipeline::{Recognition, Recognizer};

/// Per-run request counts for line-oriented input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub requests: usize,
    pub failures: usize,
}

pub fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let recognizer = Recognizer::new(
        audio_loader(cfg.decoder)?,
        OnnxModelLoader::new(&cfg.model),
    );
    let mut out = std::io::stdout().lock();
    let mut err = std::io::stderr().lock();

    match &cfg.input {
        InputSource::File(path) => {
            let source = path.display().to_string();
            match recognize_file(&recognizer, path) {
                Ok(recognition) => emit(&Report::new(&source, &recognition), cfg.output, &mut out),
                Err(e) => {
                    if cfg.output == OutputFormat::Json {
                        emit_failure(&source, &e, cfg.output, &mut out, &mut err)?;
                    }
                    Err(e)
                }
            }
        }
        InputSource::Stdin => {
            let input = std::io::stdin().lock();
            let summary = serve_lines(&recognizer, input, cfg.output, &mut out, &mut err)?;
            tracing::info!(
                requests = summary.requests,
                failures = summary.failures,
                "input closed"
            );
            Ok(())
        }
    }
}

fn audio_loader(kind: DecoderKind) -> anyhow::Result<Arc<dyn AudioLoader>> {
    match kind {
        DecoderKind::Symphonia => Ok(Arc::new(SymphoniaAudioLoader::new())),
        #[cfg(feature = "ffmpeg")]
        DecoderKind::Ffmpeg => Ok(Arc::new(
            voice_emotion_core::decode::FfmpegAudioLoader::new(),
        )),
        #[cfg(not(feature = "ffmpeg"))]
        DecoderKind::Ffmpeg => {
            anyhow::bail!("--decoder ffmpeg needs a build with the `ffmpeg` feature")
        }
    }
}

/// Reads one path per line until EOF. A failed request is reported and the loop moves on.
fn serve_lines<A, L>(
    recognizer: &Recognizer<A, L>,
    input: impl BufRead,
    output: OutputFormat,
    out: &mut impl Write,
    err: &mut impl Write,
) -> anyhow::Result<ServeSummary>
where
    A: AudioLoader,
    L: ModelLoader,
{
    let mut summary = ServeSummary::default();

    for line in input.lines() {
        let line = line.context("failed to read path from input")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        summary.requests += 1;

        match recognize_file(recognizer, Path::new(trimmed)) {
            Ok(recognition) => emit(&Report::new(trimmed, &recognition), output, out)?,
            Err(e) => {
                summary.failures += 1;
                tracing::warn!(source = trimmed, error = %format!("{e:#}"), "request failed");
                emit_failure(trimmed, &e, output, out, err)?;
            }
        }
    }

    Ok(summary)
}

fn recognize_file<A, L>(recognizer: &Recognizer<A, L>, path: &Path) -> anyhow::Result<Recognition>
where
    A: AudioLoader,
    L: ModelLoader,
{
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    recognizer
        .recognize(&Upload::new(name, bytes))
        .with_context(|| format!("failed to recognize {}", path.display()))
}

fn emit(report: &Report<'_>, output: OutputFormat, out: &mut impl Write) -> anyhow::Result<()> {
    let written = match output {
        OutputFormat::Text => write!(out, "{}", report.to_text()),
        OutputFormat::Json => writeln!(out, "{}", report.to_json().context("failed to encode report")?),
    };
    written.context("failed to write report")
}

/// Text failures go to `err`; JSON failures stay in the `out` stream so every request gets one line.
fn emit_failure(
    source: &str,
    error: &anyhow::Error,
    output: OutputFormat,
    out: &mut impl Write,
    err: &mut impl Write,
) -> anyhow::Result<()> {
    let failure = FailureReport {
        source,
        error: format!("{error:#}"),
    };
    let written = match output {
        OutputFormat::Text => write!(err, "{}", failure.to_text()),
        OutputFormat::Json => writeln!(out, "{}", failure.to_json().context("failed to encode report")?),
    };
    written.context("failed to write report")
}
