use crate::decode::{DecodeError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const SINC_LEN: usize = 256;

/// Smallest chunk fed to the resampler. Shorter inputs are zero-padded up to
/// it, since a chunk much under the filter length yields no output frames.
const MIN_CHUNK: usize = 4 * SINC_LEN;

/// Upper bound on zero-filled flush calls after the real input.
const MAX_FLUSHES: usize = 4;

/// Resamples mono audio with a band-limited sinc filter.
///
/// Output sample `k` is centred on input position `k * from_hz / to_hz`
/// (to within one sample) and the result holds exactly
/// `ceil(len * to_hz / from_hz)` samples.
pub fn resample_mono(samples: &[f32], from_hz: u32, to_hz: u32) -> Result<Vec<f32>> {
    if from_hz == to_hz {
        return Ok(samples.to_vec());
    }
    if from_hz == 0 || to_hz == 0 {
        return Err(DecodeError::Resample {
            from_hz,
            to_hz,
            details: "sample rate must be > 0".to_owned(),
        });
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let err = |e: &dyn std::fmt::Display| DecodeError::Resample {
        from_hz,
        to_hz,
        details: e.to_string(),
    };

    let expected_len = output_len(samples.len(), from_hz, to_hz);

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        f64::from(to_hz) / f64::from(from_hz),
        1.0,
        params,
        samples.len().max(MIN_CHUNK),
        1,
    )
    .map_err(|e| err(&e))?;

    // SincFixedIn starts its read position half a filter back, so the first
    // call is already aligned with the input; only the tail is still inside
    // the filter and has to be pushed out with zeros.
    let input = [samples];
    let first = resampler
        .process_partial(Some(&input[..]), None)
        .map_err(|e| err(&e))?;
    let mut out = first.into_iter().next().unwrap_or_default();

    let mut flushes = 0;
    while out.len() < expected_len && flushes < MAX_FLUSHES {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| err(&e))?;
        out.extend(tail.into_iter().next().unwrap_or_default());
        flushes += 1;
    }

    out.resize(expected_len, 0.0);

    tracing::debug!(
        from_hz,
        to_hz,
        input_len = samples.len(),
        output_len = out.len(),
        flushes,
        "resampled"
    );
    Ok(out)
}

fn output_len(len: usize, from_hz: u32, to_hz: u32) -> usize {
    let num = len as u64 * u64::from(to_hz);
    num.div_ceil(u64::from(from_hz)) as usize
}
