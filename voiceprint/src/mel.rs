use std::f64::consts::PI;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Configures mel spectrogram extraction.
///
/// Default configuration matches the GE2E speaker encoder frontend
/// (librosa `melspectrogram` defaults): periodic Hann window, 25ms frames
/// with a 400-point FFT, 10ms hop, 40 Slaney-normalized mel bands over
/// 0-8000 Hz, centered frames, power magnitudes (no log).
#[derive(Debug, Clone)]
pub struct MelConfig {
    /// Input sample rate in Hz (default: 16000).
    pub sample_rate: usize,
    /// Number of mel channels (default: 40).
    pub num_mels: usize,
    /// Window length and FFT size in samples (default: 400 = 25ms @ 16kHz).
    pub window_length: usize,
    /// Hop between frames in samples (default: 160 = 10ms @ 16kHz).
    pub hop_length: usize,
    /// Low cutoff frequency for mel bins (default: 0 Hz).
    pub low_freq: f64,
    /// High cutoff frequency, non-positive = offset from Nyquist (default: 0).
    pub high_freq: f64,
    /// Reflect-pad half a window on both sides so frame `t` is centered on
    /// sample `t * hop_length` (default: true).
    pub center: bool,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            num_mels: 40,
            window_length: 400, // 25ms @ 16kHz
            hop_length: 160,    // 10ms @ 16kHz
            low_freq: 0.0,
            high_freq: 0.0, // Nyquist
            center: true,
        }
    }
}

/// Computes a mel power spectrogram.
///
/// Output: `[num_frames][num_mels]`. With `center` enabled there are
/// `samples.len() / hop_length + 1` frames; otherwise one frame per full
/// window. Returns an empty vec when no frame fits.
pub fn mel_spectrogram(samples: &[f32], cfg: &MelConfig) -> Vec<Vec<f32>> {
    if cfg.hop_length == 0 || cfg.window_length == 0 || cfg.num_mels == 0 || samples.is_empty() {
        return Vec::new();
    }

    let n_fft = cfg.window_length;
    let signal: Vec<f64> = if cfg.center {
        reflect_pad(samples, n_fft / 2)
    } else {
        samples.iter().map(|&s| s as f64).collect()
    };
    if signal.len() < n_fft {
        return Vec::new();
    }
    let num_frames = (signal.len() - n_fft) / cfg.hop_length + 1;
    let n_freq = n_fft / 2 + 1;

    let window = hann_window(n_fft);
    let high_freq = if cfg.high_freq <= 0.0 {
        cfg.sample_rate as f64 / 2.0 + cfg.high_freq
    } else {
        cfg.high_freq
    };
    let filterbank = mel_filterbank(cfg.num_mels, n_fft, cfg.sample_rate, cfg.low_freq, high_freq);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buf = vec![Complex::new(0.0f64, 0.0); n_fft];
    let mut power = vec![0.0f64; n_freq];

    let mut result = Vec::with_capacity(num_frames);
    for f in 0..num_frames {
        let offset = f * cfg.hop_length;
        for (i, b) in buf.iter_mut().enumerate() {
            *b = Complex::new(signal[offset + i] * window[i], 0.0);
        }
        fft.process(&mut buf);

        for (p, c) in power.iter_mut().zip(buf.iter()) {
            *p = c.norm_sqr();
        }

        let frame: Vec<f32> = filterbank
            .iter()
            .map(|band| band.iter().zip(power.iter()).map(|(w, p)| w * p).sum::<f64>() as f32)
            .collect();
        result.push(frame);
    }

    result
}

/// numpy-style reflect padding: mirrors around the edge samples without
/// repeating them, bouncing back and forth when `pad` exceeds the signal.
fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f64> {
    let n = samples.len();
    (0..n + 2 * pad)
        .map(|k| samples[reflect_index(k as isize - pad as isize, n)] as f64)
        .collect()
}

fn reflect_index(i: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let j = i.rem_euclid(period);
    if j >= len as isize {
        (period - j) as usize
    } else {
        j as usize
    }
}

/// Periodic Hann window.
fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

// Slaney mel scale: linear below 1 kHz, logarithmic above.
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filterbank with Slaney area normalization, evaluated at
/// the exact FFT bin frequencies. Returns `[num_mels][n_fft / 2 + 1]`.
fn mel_filterbank(
    num_mels: usize,
    n_fft: usize,
    sample_rate: usize,
    low_freq: f64,
    high_freq: f64,
) -> Vec<Vec<f64>> {
    let n_freq = n_fft / 2 + 1;
    let mel_low = hz_to_mel(low_freq);
    let mel_high = hz_to_mel(high_freq);

    let edges: Vec<f64> = (0..num_mels + 2)
        .map(|i| mel_to_hz(mel_low + i as f64 * (mel_high - mel_low) / (num_mels + 1) as f64))
        .collect();
    let bin_hz: Vec<f64> = (0..n_freq)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    (0..num_mels)
        .map(|m| {
            let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
            let rise = (center - left).max(f64::MIN_POSITIVE);
            let fall = (right - center).max(f64::MIN_POSITIVE);
            let enorm = 2.0 / (right - left).max(f64::MIN_POSITIVE);
            bin_hz
                .iter()
                .map(|&f| ((f - left) / rise).min((right - f) / fall).max(0.0) * enorm)
                .collect()
        })
        .collect()
}
