use thiserror::Error;

/// Errors returned by audio decoding and conversion.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The WAV container or its sample data could not be parsed.
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    /// The WAV file uses a sample encoding we do not decode.
    #[error("unsupported sample format: {bits}-bit {kind}")]
    UnsupportedFormat { bits: u16, kind: &'static str },

    /// Error from rubato.
    #[error("rubato error: {0}")]
    Resample(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rubato::ResamplerConstructionError> for AudioError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        AudioError::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for AudioError {
    fn from(e: rubato::ResampleError) -> Self {
        AudioError::Resample(e.to_string())
    }
}
