//! [`VoiceEncoder`] implementation using an LSTM speaker encoder on candle.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module};
use tracing::debug;

use crate::encoder::{VoiceEncoder, SAMPLE_RATE};
use crate::error::VoiceprintError;
use crate::mel::{mel_spectrogram, MelConfig};
use crate::partials::{compute_partial_slices, PartialConfig};
use crate::preprocess::{preprocess_wav, PreprocessConfig};
use crate::similarity::l2_normalize;

/// Configuration for [`LstmEncoder`].
#[derive(Debug, Clone)]
pub struct LstmEncoderConfig {
    /// Mel frontend; `num_mels` must match the first LSTM layer's input size.
    pub mel: MelConfig,
    /// Partial utterance slicing.
    pub partials: PartialConfig,
    /// Waveform preprocessing.
    pub preprocess: PreprocessConfig,
    /// Number of stacked LSTM layers (default: 3).
    pub num_layers: usize,
}

impl Default for LstmEncoderConfig {
    fn default() -> Self {
        Self {
            mel: MelConfig::default(),
            partials: PartialConfig::default(),
            preprocess: PreprocessConfig::default(),
            num_layers: 3,
        }
    }
}

/// One LSTM layer, weights pre-transposed for `x @ W` products.
struct LstmLayer {
    /// `[input, 4 * hidden]`
    w_ih: Tensor,
    /// `[hidden, 4 * hidden]`
    w_hh: Tensor,
    /// `[4 * hidden]`, input and hidden biases summed.
    bias: Tensor,
}

/// [`VoiceEncoder`] implementation backed by a stacked LSTM.
///
/// # Weights
///
/// Loaded from safetensors using PyTorch `nn.LSTM` / `nn.Linear` names:
///
/// ```text
/// lstm.weight_ih_l{n}  [4H, I]     lstm.weight_hh_l{n}  [4H, H]
/// lstm.bias_ih_l{n}    [4H]        lstm.bias_hh_l{n}    [4H]
/// linear.weight        [D, H]      linear.bias          [D]
/// ```
///
/// Gate order is PyTorch's: input, forget, cell, output.
///
/// # Thread Safety
///
/// Weights are immutable after construction; `embed` only allocates
/// per-call tensors, so one encoder can serve concurrent requests.
pub struct LstmEncoder {
    layers: Vec<LstmLayer>,
    linear: Linear,
    hidden: usize,
    dim: usize,
    device: Device,
    cfg: LstmEncoderConfig,
}

impl LstmEncoder {
    /// Loads weights from a safetensors file.
    pub fn load(path: impl AsRef<Path>, cfg: LstmEncoderConfig) -> Result<Self, VoiceprintError> {
        let device = Device::Cpu;
        let tensors = candle_core::safetensors::load(path.as_ref(), &device)?;
        Self::from_tensors(tensors, cfg)
    }

    /// Builds the encoder from named tensors, validating every shape.
    pub fn from_tensors(
        mut tensors: HashMap<String, Tensor>,
        cfg: LstmEncoderConfig,
    ) -> Result<Self, VoiceprintError> {
        if cfg.num_layers == 0 {
            return Err(VoiceprintError::Model("num_layers must be positive".into()));
        }
        // Mel frontend and partial slicing assume the fixed input rate.
        let rate = SAMPLE_RATE as usize;
        if cfg.preprocess.sample_rate != SAMPLE_RATE
            || cfg.mel.sample_rate != rate
            || cfg.partials.sample_rate != rate
        {
            return Err(VoiceprintError::Model(format!(
                "encoder runs at {SAMPLE_RATE} Hz, got preprocess={} mel={} partials={}",
                cfg.preprocess.sample_rate, cfg.mel.sample_rate, cfg.partials.sample_rate
            )));
        }
        let device = Device::Cpu;

        let mut take = |name: String| -> Result<Tensor, VoiceprintError> {
            let t = tensors
                .remove(&name)
                .ok_or(VoiceprintError::MissingWeight(name))?;
            Ok(t.to_dtype(DType::F32)?.to_device(&device)?)
        };

        let mut layers = Vec::with_capacity(cfg.num_layers);
        let mut hidden = 0;
        let mut input = cfg.mel.num_mels;
        for l in 0..cfg.num_layers {
            let w_ih = take(format!("lstm.weight_ih_l{l}"))?;
            let w_hh = take(format!("lstm.weight_hh_l{l}"))?;
            let b_ih = take(format!("lstm.bias_ih_l{l}"))?;
            let b_hh = take(format!("lstm.bias_hh_l{l}"))?;

            let (gates, h) = w_hh.dims2()?;
            if gates != 4 * h {
                return Err(VoiceprintError::DimensionMismatch {
                    expected: 4 * h,
                    got: gates,
                });
            }
            expect_dims(&w_ih, &[4 * h, input])?;
            expect_dims(&b_ih, &[4 * h])?;
            expect_dims(&b_hh, &[4 * h])?;

            layers.push(LstmLayer {
                w_ih: w_ih.t()?.contiguous()?,
                w_hh: w_hh.t()?.contiguous()?,
                bias: b_ih.add(&b_hh)?,
            });
            hidden = h;
            input = h;
        }

        let weight = take("linear.weight".to_string())?;
        let bias = take("linear.bias".to_string())?;
        let (dim, linear_in) = weight.dims2()?;
        if linear_in != hidden {
            return Err(VoiceprintError::DimensionMismatch {
                expected: hidden,
                got: linear_in,
            });
        }
        expect_dims(&bias, &[dim])?;

        debug!(
            layers = cfg.num_layers,
            hidden,
            dim,
            num_mels = cfg.mel.num_mels,
            "lstm encoder ready"
        );

        Ok(Self {
            layers,
            linear: Linear::new(weight, Some(bias)),
            hidden,
            dim,
            device,
            cfg,
        })
    }

    /// Returns the encoder configuration.
    pub fn config(&self) -> &LstmEncoderConfig {
        &self.cfg
    }

    /// Runs a batch of mel partials `[batch, frames, num_mels]` through the
    /// network and returns L2-normalized embeddings `[batch, dim]`.
    fn forward(&self, mels: &Tensor) -> Result<Tensor, VoiceprintError> {
        let (batch, frames, _) = mels.dims3()?;
        let mut xs = mels.clone();
        let mut last_hidden = None;

        for layer in &self.layers {
            let input = xs.dim(2)?;
            // Input projection for every timestep at once.
            let x_proj = xs
                .reshape((batch * frames, input))?
                .matmul(&layer.w_ih)?
                .broadcast_add(&layer.bias)?
                .reshape((batch, frames, 4 * self.hidden))?;

            let mut h = Tensor::zeros((batch, self.hidden), DType::F32, &self.device)?;
            let mut c = Tensor::zeros((batch, self.hidden), DType::F32, &self.device)?;
            let mut outputs = Vec::with_capacity(frames);

            for t in 0..frames {
                let gates = x_proj
                    .narrow(1, t, 1)?
                    .squeeze(1)?
                    .add(&h.matmul(&layer.w_hh)?)?;
                let chunks = gates.chunk(4, 1)?;
                let i = candle_nn::ops::sigmoid(&chunks[0])?;
                let f = candle_nn::ops::sigmoid(&chunks[1])?;
                let g = chunks[2].tanh()?;
                let o = candle_nn::ops::sigmoid(&chunks[3])?;

                c = f.mul(&c)?.add(&i.mul(&g)?)?;
                h = o.mul(&c.tanh()?)?;
                outputs.push(h.clone());
            }
            xs = Tensor::stack(&outputs, 1)?;
            last_hidden = Some(h);
        }

        // Final hidden state of the last layer.
        let h = last_hidden.ok_or_else(|| VoiceprintError::Model("encoder has no layers".into()))?;
        let embeds = self.linear.forward(&h)?.relu()?;
        let norm = embeds.sqr()?.sum_keepdim(1)?.sqrt()?.affine(1.0, 1e-12)?;
        Ok(embeds.broadcast_div(&norm)?)
    }
}

fn expect_dims(t: &Tensor, expected: &[usize]) -> Result<(), VoiceprintError> {
    let got = t.dims();
    if got != expected {
        return Err(VoiceprintError::Model(format!(
            "unexpected weight shape {got:?}, want {expected:?}"
        )));
    }
    Ok(())
}

impl VoiceEncoder for LstmEncoder {
    fn sample_rate(&self) -> u32 {
        self.cfg.preprocess.sample_rate
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn preprocess(&self, samples: &[f32], source_rate: u32) -> Result<Vec<f32>, VoiceprintError> {
        preprocess_wav(samples, source_rate, &self.cfg.preprocess)
    }

    fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, VoiceprintError> {
        if samples.is_empty() {
            return Err(VoiceprintError::AudioTooShort {
                min_samples: 1,
                got_samples: 0,
            });
        }

        // Step 1: Slice into partial utterances and pad to cover the last one.
        let (wav_slices, mel_slices) = compute_partial_slices(samples.len(), &self.cfg.partials);
        let max_len = wav_slices.last().map(|r| r.end).unwrap_or(samples.len());
        let mut wav = samples.to_vec();
        if wav.len() < max_len {
            wav.resize(max_len, 0.0);
        }

        // Step 2: Mel spectrogram of the whole (padded) utterance.
        let frames = mel_spectrogram(&wav, &self.cfg.mel);
        let num_mels = self.cfg.mel.num_mels;
        let per_partial = self.cfg.partials.frames_per_partial;

        // Step 3: Stack partials into one batch.
        let mut flat = Vec::with_capacity(mel_slices.len() * per_partial * num_mels);
        for range in &mel_slices {
            if range.end > frames.len() {
                return Err(VoiceprintError::AudioTooShort {
                    min_samples: max_len,
                    got_samples: samples.len(),
                });
            }
            for frame in &frames[range.clone()] {
                flat.extend_from_slice(frame);
            }
        }
        let batch = Tensor::from_vec(flat, (mel_slices.len(), per_partial, num_mels), &self.device)?;

        debug!(
            samples = samples.len(),
            partials = mel_slices.len(),
            "embedding utterance"
        );

        // Step 4: Average partial embeddings + L2 normalize.
        let partial_embeds = self.forward(&batch)?;
        let mut embedding = partial_embeds.mean(0)?.to_vec1::<f32>()?;
        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}
