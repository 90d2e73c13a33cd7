//! Voice descriptor extraction pipeline.
//!
//! Turns one uploaded audio clip into a [`VoiceDescriptor`]:
//!
//! ```text
//! upload -> temp file -> [transcode] -> decode -> 16kHz gate
//!        -> preprocess -> embed -> descriptor
//! ```
//!
//! Every temp file is a [`TempAudio`] guard and is removed when
//! [`Pipeline::extract`] returns, whatever the outcome. Failures are
//! classified by [`DescriptorError`], which also decides whether the caller
//! is at fault.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voicedesc_descriptor::{AudioUpload, FfmpegTranscoder, Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(
//!     encoder,
//!     Some(Arc::new(FfmpegTranscoder::default())),
//!     PipelineConfig::default(),
//! );
//! let descriptor = pipeline.extract(&AudioUpload::new(bytes).with_filename("clip.webm"))?;
//! ```

mod descriptor;
mod error;
mod pipeline;
mod temp;
mod transcode;
mod upload;

pub use descriptor::{compare, Comparison, VoiceDescriptor, DEFAULT_MATCH_THRESHOLD};
pub use error::DescriptorError;
pub use pipeline::{Pipeline, PipelineConfig, Stage};
pub use temp::{sweep_stale, TempAudio, TEMP_PREFIX};
pub use transcode::{FfmpegTranscoder, Transcoder};
pub use upload::{AudioUpload, UploadFormat};

#[cfg(test)]
mod testutil;
