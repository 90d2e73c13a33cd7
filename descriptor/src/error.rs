use thiserror::Error;

/// Why a descriptor could not be produced.
///
/// The first group is the caller's fault (bad or unusable audio) and maps to
/// HTTP 400; the rest are server-side failures.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The transcoder exited non-zero or could not be launched.
    #[error("audio conversion failed: {0}")]
    AudioConversion(String),

    /// The upload is empty, not decodable, or needs a disabled transcoder.
    #[error("invalid audio format: {0}")]
    InvalidAudioFormat(String),

    #[error("Audio must be 16kHz (got {got} Hz, expected {expected} Hz)")]
    UnsupportedSampleRate { got: u32, expected: u32 },

    #[error("no usable audio: the clip is silent or too short after preprocessing")]
    NoUsableAudio,

    /// A descriptor supplied for comparison is malformed.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The encoder failed or produced an unusable vector.
    #[error("descriptor extraction failed: {0}")]
    DescriptorExtraction(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DescriptorError {
    /// Returns true when the request, not the server, caused the failure.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            DescriptorError::DescriptorExtraction(_) | DescriptorError::Internal(_)
        )
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DescriptorError::AudioConversion(_) => "audio_conversion",
            DescriptorError::InvalidAudioFormat(_) => "invalid_audio_format",
            DescriptorError::UnsupportedSampleRate { .. } => "unsupported_sample_rate",
            DescriptorError::NoUsableAudio => "no_usable_audio",
            DescriptorError::InvalidDescriptor(_) => "invalid_descriptor",
            DescriptorError::DescriptorExtraction(_) => "descriptor_extraction",
            DescriptorError::Internal(_) => "internal",
        }
    }

    /// Message safe to return to the caller.
    ///
    /// Server-side failures get a fixed text; the full error belongs in logs.
    pub fn public_message(&self) -> String {
        match self {
            DescriptorError::AudioConversion(_) => "audio conversion failed".to_string(),
            DescriptorError::DescriptorExtraction(_) => "failed to extract voice descriptor".to_string(),
            DescriptorError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
