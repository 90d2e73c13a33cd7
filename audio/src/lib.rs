//! Audio utilities for voice descriptor extraction.
//!
//! This crate provides:
//!
//! - `wav`: WAV decoding into mono `f32` samples, and PCM16 encoding
//! - `resample`: sample rate conversion backed by rubato
//!
//! # Example
//!
//! ```rust
//! use voicedesc_audio::{decode_wav, encode_wav};
//!
//! // 100ms of silence at 16kHz
//! let bytes = encode_wav(&vec![0.0f32; 1600], 16000).unwrap();
//! let audio = decode_wav(std::io::Cursor::new(bytes)).unwrap();
//! assert_eq!(audio.sample_rate, 16000);
//! assert_eq!(audio.samples.len(), 1600);
//! ```

mod error;
pub mod resample;
pub mod wav;

pub use error::AudioError;
pub use resample::resample;
pub use wav::{decode_wav, downmix, encode_wav, read_wav, DecodedAudio};
