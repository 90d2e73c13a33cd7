use thiserror::Error;

/// Errors returned by voiceprint operations.
#[derive(Debug, Error)]
pub enum VoiceprintError {
    #[error("audio too short: need at least {min_samples} samples, got {got_samples}")]
    AudioTooShort { min_samples: usize, got_samples: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("vector has zero magnitude")]
    ZeroNorm,

    #[error("missing weight: {0}")]
    MissingWeight(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("audio: {0}")]
    Audio(#[from] voicedesc_audio::AudioError),
}
