//! Speaker embedding extraction for voice descriptors.
//!
//! # Architecture
//!
//! Audio flows through two stages exposed by [`VoiceEncoder`]:
//!
//! 1. [`VoiceEncoder::preprocess`]: resample to 16kHz, normalize loudness,
//!    trim long silences
//! 2. [`VoiceEncoder::embed`]: samples -> fixed-length, L2-normalized vector
//!
//! # Embedding
//!
//! [`LstmEncoder`] follows the GE2E speaker encoder layout:
//!
//! ```text
//! samples -> 40-channel mel (25ms window, 10ms hop)
//!         -> 160-frame partial utterances (1.3 partials/s)
//!         -> 3-layer LSTM -> linear -> ReLU -> L2 norm   (per partial)
//!         -> mean over partials -> L2 norm               (utterance)
//! ```
//!
//! Comparing two descriptors is a dot product of unit vectors, see
//! [`cosine_similarity`].

mod encoder;
mod error;
pub mod mel;
mod model_lstm;
pub mod partials;
pub mod preprocess;
mod similarity;

pub use encoder::{VoiceEncoder, SAMPLE_RATE};
pub use error::VoiceprintError;
pub use mel::{mel_spectrogram, MelConfig};
pub use model_lstm::{LstmEncoder, LstmEncoderConfig};
pub use partials::{compute_partial_slices, PartialConfig};
pub use preprocess::{normalize_volume, preprocess_wav, trim_long_silences, PreprocessConfig};
pub use similarity::{cosine_similarity, l2_normalize};
