use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info};
use voicedesc_audio::read_wav;
use voicedesc_voiceprint::VoiceEncoder;

use crate::descriptor::VoiceDescriptor;
use crate::error::DescriptorError;
use crate::temp::TempAudio;
use crate::transcode::Transcoder;
use crate::upload::{AudioUpload, UploadFormat};

/// Configures [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory for upload and transcoder temp files.
    pub temp_dir: PathBuf,
    /// Transcode non-WAV uploads. When off they are rejected.
    pub transcode: bool,
    /// Allow only one `embed` call at a time, for non-reentrant encoders.
    pub serialize_inference: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            transcode: true,
            serialize_inference: false,
        }
    }
}

/// Last step a request completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Persisted,
    Transcoded,
    Decoded,
    RateValidated,
    Preprocessed,
    Inferred,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Persisted => "persisted",
            Stage::Transcoded => "transcoded",
            Stage::Decoded => "decoded",
            Stage::RateValidated => "rate_validated",
            Stage::Preprocessed => "preprocessed",
            Stage::Inferred => "inferred",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns uploads into voice descriptors.
///
/// Stateless between calls and safe to share across threads. All work is
/// blocking; async callers should run [`extract`](Self::extract) on a
/// blocking thread.
pub struct Pipeline {
    encoder: Arc<dyn VoiceEncoder>,
    transcoder: Option<Arc<dyn Transcoder>>,
    inference_lock: Option<Mutex<()>>,
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        encoder: Arc<dyn VoiceEncoder>,
        transcoder: Option<Arc<dyn Transcoder>>,
        cfg: PipelineConfig,
    ) -> Self {
        let inference_lock = cfg.serialize_inference.then(|| Mutex::new(()));
        Self {
            encoder,
            transcoder,
            inference_lock,
            cfg,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Dimension of every descriptor this pipeline returns.
    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    /// Runs one upload through the pipeline.
    ///
    /// Temp files created along the way are gone when this returns.
    pub fn extract(&self, upload: &AudioUpload) -> Result<VoiceDescriptor, DescriptorError> {
        let start = Instant::now();
        let mut stage = Stage::Received;
        let result = self.run(upload, &mut stage);

        match &result {
            Ok(d) => info!(
                bytes = upload.len(),
                dim = d.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "descriptor extracted"
            ),
            Err(e) => debug!(
                bytes = upload.len(),
                stage = %stage,
                kind = e.kind(),
                error = %e,
                "extraction failed"
            ),
        }
        result
    }

    fn run(&self, upload: &AudioUpload, stage: &mut Stage) -> Result<VoiceDescriptor, DescriptorError> {
        if upload.is_empty() {
            return Err(DescriptorError::InvalidAudioFormat("empty upload".into()));
        }
        let format = upload.format();

        // Step 1: Persist the upload.
        let input = TempAudio::persist(&self.cfg.temp_dir, format.suffix(), upload.bytes())
            .map_err(|e| DescriptorError::Internal(format!("persist upload: {e}")))?;
        advance(stage, Stage::Persisted);

        // Step 2: Transcode containers to WAV.
        let transcoded;
        let wav_path = match &format {
            UploadFormat::Wav => input.path(),
            UploadFormat::Container { suffix } => {
                let transcoder = self
                    .transcoder
                    .as_ref()
                    .filter(|_| self.cfg.transcode)
                    .ok_or_else(|| {
                        DescriptorError::InvalidAudioFormat(format!(
                            "{suffix} uploads are not accepted, send 16kHz WAV"
                        ))
                    })?;
                transcoded = TempAudio::create(&self.cfg.temp_dir, "wav")
                    .map_err(|e| DescriptorError::Internal(format!("create transcode output: {e}")))?;
                transcoder.transcode(input.path(), transcoded.path())?;
                advance(stage, Stage::Transcoded);
                transcoded.path()
            }
        };

        // Step 3: Decode.
        let audio = read_wav(wav_path).map_err(|e| DescriptorError::InvalidAudioFormat(e.to_string()))?;
        advance(stage, Stage::Decoded);
        debug!(
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            duration_ms = audio.duration().as_millis() as u64,
            "decoded"
        );

        // Step 4: Exact sample-rate gate; never resample here.
        let expected = self.encoder.sample_rate();
        if audio.sample_rate != expected {
            return Err(DescriptorError::UnsupportedSampleRate {
                got: audio.sample_rate,
                expected,
            });
        }
        advance(stage, Stage::RateValidated);

        // Step 5: Preprocess.
        let preprocessed = self
            .encoder
            .preprocess(&audio.samples, audio.sample_rate)
            .map_err(|e| DescriptorError::Internal(format!("preprocess: {e}")))?;
        if preprocessed.is_empty() {
            return Err(DescriptorError::NoUsableAudio);
        }
        advance(stage, Stage::Preprocessed);

        // Step 6: Infer.
        let values = {
            let _guard = self
                .inference_lock
                .as_ref()
                .map(|l| l.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
            self.encoder
                .embed(&preprocessed)
                .map_err(|e| DescriptorError::DescriptorExtraction(e.to_string()))?
        };
        if values.is_empty() {
            return Err(DescriptorError::DescriptorExtraction("encoder returned an empty vector".into()));
        }
        if values.len() != self.encoder.dimension() {
            return Err(DescriptorError::DescriptorExtraction(format!(
                "encoder returned {} values, expected {}",
                values.len(),
                self.encoder.dimension()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DescriptorError::DescriptorExtraction(
                "encoder returned non-finite values".into(),
            ));
        }
        advance(stage, Stage::Inferred);

        Ok(VoiceDescriptor::new(values))
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!(stage = %next, "pipeline stage");
    *stage = next;
}
