use crate::decode::{
    downmix_to_mono, require_samples, resample_mono, AudioLoader, DecodeError, Result, Upload,
    Waveform,
};
use ::symphonia::core::audio::SampleBuffer;
use ::symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use ::symphonia::core::errors::Error as SymphoniaError;
use ::symphonia::core::formats::FormatOptions;
use ::symphonia::core::io::MediaSourceStream;
use ::symphonia::core::meta::MetadataOptions;
use ::symphonia::core::probe::Hint;
use std::io::Cursor;

/// In-memory decoder for WAV and MP3 uploads.
#[derive(Clone, Debug, Default)]
pub struct SymphoniaAudioLoader;

impl SymphoniaAudioLoader {
    pub fn new() -> Self {
        Self
    }

    /// Decodes every packet of the first audio track into interleaved f32.
    fn decode_interleaved(upload: &Upload) -> Result<(Vec<f32>, u32, usize)> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(upload.bytes.clone())),
            Default::default(),
        );

        let mut hint = Hint::new();
        if let Some(ext) = upload.extension() {
            hint.with_extension(ext);
        }

        let probed = ::symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = ::symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        let mut sample_rate = codec_params.sample_rate;
        let mut channels = codec_params.channels.map(|c| c.count());
        let mut samples: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut decoded_packets = 0usize;
        let mut skipped_packets = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) if decoded_packets > 0 => {
                    tracing::warn!(error = %e, "stopping at unreadable packet");
                    break;
                }
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(details)) => {
                    tracing::warn!(details, "skipping undecodable packet");
                    skipped_packets += 1;
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(DecodeError::Corrupt(e.to_string())),
            };

            let spec = *decoded.spec();
            let needed = decoded.capacity() * spec.channels.count();
            if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
                sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }

            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }

            sample_rate = Some(spec.rate);
            channels = Some(spec.channels.count());
            decoded_packets += 1;
        }

        if decoded_packets == 0 && skipped_packets > 0 {
            return Err(DecodeError::Corrupt(format!(
                "none of {skipped_packets} packets could be decoded"
            )));
        }

        let sample_rate = sample_rate
            .filter(|&r| r > 0)
            .ok_or_else(|| DecodeError::Corrupt("unknown sample rate".to_owned()))?;
        let channels = channels.unwrap_or(1).max(1);

        tracing::debug!(
            decoded_packets,
            skipped_packets,
            sample_rate,
            channels,
            samples = samples.len(),
            "decoded audio track"
        );

        Ok((samples, sample_rate, channels))
    }
}

impl AudioLoader for SymphoniaAudioLoader {
    fn load(&self, upload: &Upload, target_rate: u32) -> Result<Waveform> {
        if upload.bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let (interleaved, source_rate, channels) = Self::decode_interleaved(upload)?;
        let mono = require_samples(downmix_to_mono(&interleaved, channels))?;
        let samples = resample_mono(&mono, source_rate, target_rate)?;

        Ok(Waveform::new(target_rate, samples))
    }
}
