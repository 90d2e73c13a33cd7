//! Fakes and fixtures shared by the pipeline tests.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use voicedesc_audio::encode_wav;
use voicedesc_voiceprint::{l2_normalize, LstmEncoder, LstmEncoderConfig, VoiceEncoder, VoiceprintError};

use crate::error::DescriptorError;
use crate::transcode::Transcoder;

/// PCM16 mono WAV of a sine tone.
pub fn voice_wav(rate: u32, freq: f32, n: usize) -> Vec<u8> {
    let samples: Vec<f32> = (0..n)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / rate as f32).sin())
        .collect();
    encode_wav(&samples, rate).unwrap()
}

pub fn silent_wav(rate: u32, n: usize) -> Vec<u8> {
    encode_wav(&vec![0.0; n], rate).unwrap()
}

/// Deterministic encoder deriving a few signal statistics.
pub struct FakeEncoder;

impl FakeEncoder {
    pub const DIM: usize = 4;
}

impl VoiceEncoder for FakeEncoder {
    fn dimension(&self) -> usize {
        Self::DIM
    }

    fn preprocess(&self, samples: &[f32], _source_rate: u32) -> Result<Vec<f32>, VoiceprintError> {
        if samples.iter().all(|s| s.abs() < 1e-3) {
            return Ok(Vec::new());
        }
        Ok(samples.to_vec())
    }

    fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, VoiceprintError> {
        let n = samples.len() as f32;
        let rms = (samples.iter().map(|s| s * s).sum::<f32>() / n).sqrt();
        let mean_abs = samples.iter().map(|s| s.abs()).sum::<f32>() / n;
        let crossings = samples.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count() as f32;
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let mut v = vec![rms, mean_abs, crossings / n, peak];
        l2_normalize(&mut v);
        Ok(v)
    }
}

/// Encoders whose `embed` misbehaves in different ways.
pub enum BrokenEncoder {
    Fails,
    Empty,
    NonFinite,
    WrongLength,
}

impl VoiceEncoder for BrokenEncoder {
    fn dimension(&self) -> usize {
        FakeEncoder::DIM
    }

    fn preprocess(&self, samples: &[f32], _source_rate: u32) -> Result<Vec<f32>, VoiceprintError> {
        Ok(samples.to_vec())
    }

    fn embed(&self, _samples: &[f32]) -> Result<Vec<f32>, VoiceprintError> {
        match self {
            BrokenEncoder::Fails => Err(VoiceprintError::Model("weights exploded".into())),
            BrokenEncoder::Empty => Ok(Vec::new()),
            BrokenEncoder::NonFinite => Ok(vec![f32::NAN; FakeEncoder::DIM]),
            BrokenEncoder::WrongLength => Ok(vec![0.5; FakeEncoder::DIM + 1]),
        }
    }
}

/// Real LSTM encoder (3 layers, 40 mels) with small random weights.
pub fn lstm_encoder() -> LstmEncoder {
    const HIDDEN: usize = 16;
    const DIM: usize = 8;
    let dev = Device::Cpu;
    let mut w = HashMap::new();
    let mut input = 40;
    for l in 0..3 {
        w.insert(
            format!("lstm.weight_ih_l{l}"),
            Tensor::randn(0f32, 0.3, (4 * HIDDEN, input), &dev).unwrap(),
        );
        w.insert(
            format!("lstm.weight_hh_l{l}"),
            Tensor::randn(0f32, 0.3, (4 * HIDDEN, HIDDEN), &dev).unwrap(),
        );
        w.insert(format!("lstm.bias_ih_l{l}"), Tensor::zeros(4 * HIDDEN, DType::F32, &dev).unwrap());
        w.insert(format!("lstm.bias_hh_l{l}"), Tensor::zeros(4 * HIDDEN, DType::F32, &dev).unwrap());
        input = HIDDEN;
    }
    w.insert(
        "linear.weight".to_string(),
        Tensor::randn(0f32, 0.3, (DIM, HIDDEN), &dev).unwrap(),
    );
    w.insert("linear.bias".to_string(), Tensor::ones(DIM, DType::F32, &dev).unwrap());
    LstmEncoder::from_tensors(w, LstmEncoderConfig::default()).unwrap()
}

/// Writes a fixed WAV to the output path and records its inputs.
pub struct FakeTranscoder {
    output: Vec<u8>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<PathBuf>>,
}

impl FakeTranscoder {
    pub fn new(output: Vec<u8>) -> Self {
        Self {
            output,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn saw_input_suffix(&self, suffix: &str) -> bool {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.extension().is_some_and(|e| e == suffix))
    }
}

impl Transcoder for FakeTranscoder {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), DescriptorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(input.exists(), "input must be persisted before transcoding");
        self.inputs.lock().unwrap().push(input.to_path_buf());
        fs::write(output, &self.output).map_err(|e| DescriptorError::Internal(e.to_string()))
    }
}

/// Leaves a partial output behind and fails, like a crashed ffmpeg.
pub struct FailingTranscoder;

impl Transcoder for FailingTranscoder {
    fn transcode(&self, _input: &Path, output: &Path) -> Result<(), DescriptorError> {
        let _ = fs::write(output, b"RIFF");
        Err(DescriptorError::AudioConversion("exit status: 1".into()))
    }
}
