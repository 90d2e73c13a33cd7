use bytes::Bytes;

/// Container used when nothing else identifies a non-WAV upload. Browser
/// recorders produce webm.
const DEFAULT_CONTAINER: &str = "webm";

/// How the pipeline has to treat an upload before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFormat {
    /// RIFF/WAVE data, decoded directly.
    Wav,
    /// Anything else; transcoded to WAV first.
    Container { suffix: String },
}

impl UploadFormat {
    /// Classifies an upload by content, then filename, then content type.
    pub fn detect(bytes: &[u8], filename: Option<&str>, content_type: Option<&str>) -> Self {
        if is_riff_wave(bytes) {
            return UploadFormat::Wav;
        }
        if let Some(ext) = filename.and_then(extension) {
            return Self::from_suffix(&ext);
        }
        if let Some(suffix) = content_type.and_then(suffix_for_mime) {
            return Self::from_suffix(suffix);
        }
        UploadFormat::Container {
            suffix: DEFAULT_CONTAINER.to_string(),
        }
    }

    fn from_suffix(suffix: &str) -> Self {
        match suffix {
            "wav" | "wave" => UploadFormat::Wav,
            other => UploadFormat::Container {
                suffix: other.to_string(),
            },
        }
    }

    /// File suffix, without the dot, for the persisted upload.
    pub fn suffix(&self) -> &str {
        match self {
            UploadFormat::Wav => "wav",
            UploadFormat::Container { suffix } => suffix,
        }
    }

    pub fn needs_transcode(&self) -> bool {
        matches!(self, UploadFormat::Container { .. })
    }
}

fn is_riff_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Lowercased extension, restricted to short alphanumerics so it is safe to
/// use in a temp file name.
fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn suffix_for_mime(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let suffix = match mime.as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "wav",
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/aac" => "m4a",
        "audio/flac" | "audio/x-flac" => "flac",
        _ => return None,
    };
    Some(suffix)
}

/// One uploaded audio clip, as received.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    bytes: Bytes,
    filename: Option<String>,
    content_type: Option<String>,
}

impl AudioUpload {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: None,
            content_type: None,
        }
    }

    /// Sets the client-declared file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Sets the client-declared content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn format(&self) -> UploadFormat {
        UploadFormat::detect(&self.bytes, self.filename(), self.content_type())
    }
}
