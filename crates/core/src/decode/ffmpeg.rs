use crate::decode::{require_samples, AudioLoader, DecodeError, Result, Upload, Waveform};
use ffmpeg_sidecar::{download::auto_download, paths::ffmpeg_path};
use std::io::{Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, ScopedJoinHandle};

/// Decoder that shells out to ffmpeg, which handles the resampling and downmix itself.
///
/// The upload is streamed through stdin and raw `f32le` mono PCM is read back
/// from stdout, so nothing touches the filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegAudioLoader;

impl FfmpegAudioLoader {
    pub fn new() -> Self {
        Self
    }

    fn command(target_rate: u32) -> Command {
        let mut cmd = Command::new(ffmpeg_path());
        cmd.args(["-hide_banner", "-loglevel", "error", "-i", "pipe:0"])
            .args(["-vn", "-ac", "1", "-ar"])
            .arg(target_rate.to_string())
            .args(["-f", "f32le", "-acodec", "pcm_f32le", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(upload: &Upload, target_rate: u32) -> Result<Vec<u8>> {
        let mut child = Self::command(target_rate)
            .spawn()
            .map_err(|e| DecodeError::FfmpegUnavailable(format!("spawn failed: {e}")))?;

        let (mut stdin, mut stdout, mut stderr) = take_pipes(&mut child)?;
        let payload = &upload.bytes;

        // All three pipes are serviced at once; a full pipe would otherwise deadlock.
        let (fed, pcm, diagnostics) = thread::scope(|s| {
            let feeder = s.spawn(move || stdin.write_all(payload));
            let drain = s.spawn(move || {
                let mut buf = Vec::new();
                stderr.read_to_end(&mut buf).map(|_| buf)
            });

            let mut pcm = Vec::new();
            let read = stdout.read_to_end(&mut pcm).map(|_| pcm);
            (join(feeder), read, join(drain))
        });

        let status = child
            .wait()
            .map_err(|e| DecodeError::FfmpegFailed(format!("wait failed: {e}")))?;

        if !status.success() {
            let diagnostics = diagnostics.unwrap_or_default();
            return Err(status_error(status, &diagnostics));
        }

        match fed {
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                return Err(DecodeError::FfmpegFailed(format!("writing input: {e}")));
            }
            _ => {}
        }

        pcm.map_err(|e| DecodeError::FfmpegFailed(format!("reading output: {e}")))
    }
}

/// On failure the child is killed and reaped before the error is returned.
fn take_pipes(child: &mut Child) -> Result<(ChildStdin, ChildStdout, ChildStderr)> {
    match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
        (Some(stdin), Some(stdout), Some(stderr)) => Ok((stdin, stdout, stderr)),
        (stdin, stdout, stderr) => {
            let missing: Vec<&str> = [
                ("stdin", stdin.is_none()),
                ("stdout", stdout.is_none()),
                ("stderr", stderr.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, gone)| gone.then_some(name))
            .collect();
            drop((stdin, stdout, stderr));

            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
            if let Err(e) = child.wait() {
                tracing::warn!(error = %e, "failed to reap ffmpeg");
            }
            Err(DecodeError::FfmpegFailed(format!(
                "ffmpeg {} not piped",
                missing.join(", ")
            )))
        }
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, std::io::Result<T>>) -> std::io::Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(std::io::Error::other("ffmpeg pipe thread panicked")))
}

fn status_error(status: ExitStatus, diagnostics: &[u8]) -> DecodeError {
    let message = String::from_utf8_lossy(diagnostics);
    let last_line = message.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    match status.code() {
        Some(code) => DecodeError::FfmpegFailed(format!("exit {code}: {}", last_line.trim())),
        None => DecodeError::FfmpegFailed(format!("terminated by signal: {}", last_line.trim())),
    }
}

/// Little-endian f32 samples; a trailing partial sample is an error.
fn pcm_from_f32le(raw: &[u8]) -> Result<Vec<f32>> {
    let chunks = raw.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        return Err(DecodeError::InvalidPcm(format!(
            "{} bytes is not a whole number of f32 samples",
            raw.len()
        )));
    }
    Ok(chunks
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

impl AudioLoader for FfmpegAudioLoader {
    fn load(&self, upload: &Upload, target_rate: u32) -> Result<Waveform> {
        if upload.bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        auto_download().map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))?;

        let samples = require_samples(pcm_from_f32le(&Self::run(upload, target_rate)?)?)?;

        tracing::debug!(samples = samples.len(), target_rate, "ffmpeg decoded upload");
        Ok(Waveform::new(target_rate, samples))
    }
}
