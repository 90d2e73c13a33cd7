//! Rubato-based sample rate conversion.
//!
//! Converts a whole mono buffer in one call. Pure Rust, no FFI.

use rubato::{FftFixedInOut, Resampler};

use crate::error::AudioError;

/// Number of frames per processing block.
const CHUNK_FRAMES: usize = 1024;

/// Resamples mono `f32` audio from `from_rate` to `to_rate`.
///
/// The output length is `len * to_rate / from_rate` (rounded down), with the
/// resampler's internal delay removed.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid sample rate: {from_rate} -> {to_rate}"
        )));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_FRAMES, 1)?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES);

    // Full blocks.
    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > samples.len() {
            break;
        }
        let block = resampler.process(&[&samples[pos..pos + needed]], None)?;
        output.extend_from_slice(&block[0]);
        pos += needed;
    }

    // Remaining frames, zero-padded by rubato.
    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let block = resampler.process_partial(Some(&tail[..]), None)?;
        output.extend_from_slice(&block[0]);
    }

    // Flush the delay line.
    while output.len() < expected + delay {
        let block = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if block[0].is_empty() {
            break;
        }
        output.extend_from_slice(&block[0]);
    }

    Ok(output.into_iter().skip(delay).take(expected).collect())
}
