use crate::VoiceprintError;

/// Sample rate every encoder in this crate works at.
pub const SAMPLE_RATE: u32 = 16000;

/// Turns decoded audio into a speaker embedding vector.
///
/// Preprocessing and inference are separate calls so the caller can tell
/// "nothing left to embed" apart from a model failure.
///
/// # Audio Requirements
///
/// - Samples: mono `f32` in `[-1, 1]`
/// - [`embed`](Self::embed) input: output of [`preprocess`](Self::preprocess),
///   at [`sample_rate`](Self::sample_rate)
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use. Models that are not
/// reentrant should be serialized by the caller.
pub trait VoiceEncoder: Send + Sync {
    /// Sample rate the encoder expects after preprocessing.
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Returns the dimensionality of the embedding vectors (e.g., 256).
    fn dimension(&self) -> usize;

    /// Resamples, normalizes and trims silence. May return an empty vector
    /// when the clip contains no voiced audio.
    fn preprocess(&self, samples: &[f32], source_rate: u32) -> Result<Vec<f32>, VoiceprintError>;

    /// Computes the utterance embedding of preprocessed samples.
    fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, VoiceprintError>;
}
