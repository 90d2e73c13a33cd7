//! Partial utterance slicing.
//!
//! An utterance is embedded as the average of fixed-length partial
//! utterances. Partials overlap; their spacing is set by how many partials
//! per second are wanted.

use std::ops::Range;

/// Configures [`compute_partial_slices`].
#[derive(Debug, Clone)]
pub struct PartialConfig {
    /// Sample rate in Hz (default: 16000).
    pub sample_rate: usize,
    /// Samples per mel frame, i.e. the mel hop (default: 160).
    pub samples_per_frame: usize,
    /// Mel frames per partial utterance (default: 160 = 1.6s).
    pub frames_per_partial: usize,
    /// Partials per second of audio (default: 1.3).
    pub rate: f64,
    /// Drop the last partial when it covers less than this fraction of
    /// real audio, unless it is the only one (default: 0.75).
    pub min_coverage: f64,
}

impl Default for PartialConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            samples_per_frame: 160,
            frames_per_partial: 160,
            rate: 1.3,
            min_coverage: 0.75,
        }
    }
}

/// Splits an utterance of `n_samples` samples into partial utterances.
///
/// Returns `(wav_slices, mel_slices)`: sample ranges and the matching mel
/// frame ranges. There is always at least one partial. The last sample
/// range may extend past `n_samples`; the caller pads with zeros.
pub fn compute_partial_slices(
    n_samples: usize,
    cfg: &PartialConfig,
) -> (Vec<Range<usize>>, Vec<Range<usize>>) {
    let spf = cfg.samples_per_frame.max(1);
    let partial = cfg.frames_per_partial.max(1);

    let n_frames = (n_samples + 1).div_ceil(spf);
    let frame_step = ((cfg.sample_rate as f64 / cfg.rate) / spf as f64).round() as usize;
    let frame_step = frame_step.clamp(1, partial);

    let steps = (n_frames + frame_step + 1).saturating_sub(partial).max(1);

    let mut wav_slices = Vec::new();
    let mut mel_slices = Vec::new();
    for i in (0..steps).step_by(frame_step) {
        mel_slices.push(i..i + partial);
        wav_slices.push(i * spf..(i + partial) * spf);
    }

    if let Some(last) = wav_slices.last() {
        let covered = n_samples.saturating_sub(last.start) as f64;
        let coverage = covered / (last.end - last.start) as f64;
        if coverage < cfg.min_coverage && mel_slices.len() > 1 {
            wav_slices.pop();
            mel_slices.pop();
        }
    }

    (wav_slices, mel_slices)
}
