use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::DescriptorError;

/// Converts an arbitrary audio file into 16kHz mono PCM16 WAV.
pub trait Transcoder: Send + Sync {
    /// Reads `input` and writes the converted audio to `output`, which may
    /// already exist and is overwritten.
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), DescriptorError>;
}

/// Longest stderr excerpt carried in an error.
const MAX_STDERR: usize = 512;

/// [`Transcoder`] that shells out to an ffmpeg-compatible executable.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for one conversion.
    pub fn args(input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.into());
        args.extend(
            ["-ac", "1", "-ar", "16000", "-acodec", "pcm_s16le", "-f", "wav"]
                .iter()
                .map(OsString::from),
        );
        args.push(output.into());
        args
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), DescriptorError> {
        debug!(program = %self.program.display(), input = %input.display(), "transcoding");

        let out = Command::new(&self.program)
            .args(Self::args(input, output))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                DescriptorError::AudioConversion(format!(
                    "failed to launch {}: {e}",
                    self.program.display()
                ))
            })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stderr = stderr.trim();
            let excerpt: String = stderr.chars().take(MAX_STDERR).collect();
            return Err(DescriptorError::AudioConversion(format!(
                "{} exited with {}: {excerpt}",
                self.program.display(),
                out.status
            )));
        }
        Ok(())
    }
}
