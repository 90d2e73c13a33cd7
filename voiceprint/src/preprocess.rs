//! Waveform preprocessing ahead of embedding.
//!
//! Mirrors the canonical speaker-encoder recipe: resample to 16kHz, raise
//! the loudness to a target dBFS, then cut out long runs of silence so the
//! embedding is computed over voiced audio only.

use serde::Deserialize;
use voicedesc_audio::resample;

use crate::encoder::SAMPLE_RATE;
use crate::error::VoiceprintError;

/// Configures [`preprocess_wav`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Target sample rate in Hz (default: 16000).
    pub sample_rate: u32,
    /// Loudness target in dBFS (default: -30).
    pub target_dbfs: f64,
    /// Only amplify, never attenuate (default: true).
    pub increase_only: bool,
    /// Remove long silences (default: true).
    pub trim_silence: bool,
    /// VAD window length in milliseconds (default: 30).
    pub vad_window_ms: u32,
    /// A window is voiced when its RMS level exceeds this (default: -50 dBFS).
    pub vad_threshold_dbfs: f64,
    /// Width of the moving average smoothing the voice flags (default: 8).
    pub vad_moving_average_width: usize,
    /// Longest silence, in windows, kept between voiced regions (default: 6).
    pub vad_max_silence_windows: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            target_dbfs: -30.0,
            increase_only: true,
            trim_silence: true,
            vad_window_ms: 30,
            vad_threshold_dbfs: -50.0,
            vad_moving_average_width: 8,
            vad_max_silence_windows: 6,
        }
    }
}

/// Prepares raw samples for embedding.
///
/// Returns an empty vector when nothing voiced remains.
pub fn preprocess_wav(
    samples: &[f32],
    source_rate: u32,
    cfg: &PreprocessConfig,
) -> Result<Vec<f32>, VoiceprintError> {
    let mut wav = if source_rate != cfg.sample_rate {
        resample(samples, source_rate, cfg.sample_rate)?
    } else {
        samples.to_vec()
    };

    normalize_volume(&mut wav, cfg.target_dbfs, cfg.increase_only);

    if cfg.trim_silence {
        wav = trim_long_silences(&wav, cfg);
    }
    Ok(wav)
}

/// Scales `wav` so its mean power sits at `target_dbfs`.
///
/// Digital silence is left untouched.
pub fn normalize_volume(wav: &mut [f32], target_dbfs: f64, increase_only: bool) {
    if wav.is_empty() {
        return;
    }
    let mean_power = wav.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / wav.len() as f64;
    if mean_power <= 0.0 || !mean_power.is_finite() {
        return;
    }

    let change_db = target_dbfs - 10.0 * mean_power.log10();
    if change_db < 0.0 && increase_only {
        return;
    }

    let gain = 10f64.powf(change_db / 20.0) as f32;
    for x in wav.iter_mut() {
        *x *= gain;
    }
}

/// Drops silent stretches longer than `vad_max_silence_windows` windows.
///
/// Trailing samples that do not fill a whole VAD window are discarded.
pub fn trim_long_silences(wav: &[f32], cfg: &PreprocessConfig) -> Vec<f32> {
    let window = (cfg.vad_window_ms as usize * cfg.sample_rate as usize) / 1000;
    if window == 0 || wav.len() < window {
        return Vec::new();
    }
    let usable = wav.len() - wav.len() % window;

    let voiced: Vec<bool> = wav[..usable]
        .chunks_exact(window)
        .map(|w| rms_dbfs(w) > cfg.vad_threshold_dbfs)
        .collect();

    // Ties at exactly 0.5 round down, as numpy's round-half-to-even does.
    let smoothed = moving_average(&voiced, cfg.vad_moving_average_width.max(1));
    let mask: Vec<bool> = smoothed.iter().map(|&v| v > 0.5).collect();
    let mask = dilate(&mask, cfg.vad_max_silence_windows + 1);

    let mut out = Vec::with_capacity(usable);
    for (w, keep) in wav[..usable].chunks_exact(window).zip(mask) {
        if keep {
            out.extend_from_slice(w);
        }
    }
    out
}

fn rms_dbfs(window: &[f32]) -> f64 {
    let power = window.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / window.len() as f64;
    if power <= 0.0 {
        return f64::NEG_INFINITY;
    }
    10.0 * power.log10()
}

/// Centered moving average of boolean flags, zero-padded at both ends.
/// Output has the same length as the input.
fn moving_average(flags: &[bool], width: usize) -> Vec<f64> {
    let left = (width - 1) / 2;
    let right = width / 2;
    let n = flags.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(left);
            let hi = (i + right).min(n - 1);
            let count = flags[lo..=hi].iter().filter(|&&f| f).count();
            count as f64 / width as f64
        })
        .collect()
}

/// Binary dilation with a flat structuring element of `size` elements.
fn dilate(mask: &[bool], size: usize) -> Vec<bool> {
    let left = size / 2;
    let right = size.saturating_sub(1) - left;
    let n = mask.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(left);
            let hi = (i + right).min(n - 1);
            mask[lo..=hi].iter().any(|&m| m)
        })
        .collect()
}
