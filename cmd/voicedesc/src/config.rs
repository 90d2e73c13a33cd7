//! Service configuration: YAML file with every field defaulted, then CLI
//! overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use voicedesc_descriptor::DEFAULT_MATCH_THRESHOLD;
use voicedesc_voiceprint::{PreprocessConfig, SAMPLE_RATE};

/// Top-level configuration file format.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub transcoder: TranscoderConfig,
    pub pipeline: PipelineSection,
    pub preprocess: PreprocessConfig,
    pub verify: VerifyConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address; `:port` binds all interfaces.
    pub listen: String,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
    /// Allowed CORS origins; `"*"` mirrors any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: ":5000".to_string(),
            max_upload_bytes: 25 * 1024 * 1024,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "https://localhost:3000".to_string(),
                "https://artconnect-frontend.onrender.com".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Encoder weights (safetensors).
    pub path: PathBuf,
    pub serialize_inference: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/voice_encoder.safetensors"),
            serialize_inference: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub enabled: bool,
    pub program: PathBuf,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Temp file directory; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl PipelineSection {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Default similarity threshold for a match.
    pub threshold: f32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            max_age_secs: 86400,
        }
    }
}

/// Values given on the command line, applied over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub model: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
}

impl Config {
    /// Loads the config file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply(&mut self, o: Overrides) {
        if let Some(listen) = o.listen {
            self.server.listen = listen;
        }
        if let Some(model) = o.model {
            self.model.path = model;
        }
        if let Some(ffmpeg) = o.ffmpeg {
            self.transcoder.program = ffmpeg;
        }
        if let Some(dir) = o.temp_dir {
            self.pipeline.temp_dir = Some(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        parse_addr(&self.server.listen)?;
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("server.max_upload_bytes must be positive");
        }
        let t = self.verify.threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            anyhow::bail!("verify.threshold must be within [-1, 1], got {t}");
        }
        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            anyhow::bail!("sweep.interval_secs must be positive");
        }
        // Uploads are gated at 16 kHz; the encoder cannot run at another rate.
        if self.preprocess.sample_rate != SAMPLE_RATE {
            anyhow::bail!(
                "preprocess.sample_rate must be {SAMPLE_RATE}, got {}",
                self.preprocess.sample_rate
            );
        }
        Ok(())
    }
}

/// Parses a listen address; `:5000` means `0.0.0.0:5000`.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    addr.parse()
        .with_context(|| format!("invalid listen address: {addr}"))
}
