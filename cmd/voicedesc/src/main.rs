//! voicedesc - HTTP service that turns uploaded speech into voice descriptors.

mod config;
mod server;
mod sweeper;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voicedesc_descriptor::{FfmpegTranscoder, Pipeline, PipelineConfig, Transcoder};
use voicedesc_voiceprint::{LstmEncoder, LstmEncoderConfig, VoiceEncoder};

use crate::config::{Config, Overrides};
use crate::server::AppState;

/// Voice descriptor extraction service.
#[derive(Parser, Debug)]
#[command(name = "voicedesc")]
#[command(about = "HTTP service that extracts voice descriptors from uploaded audio")]
struct Args {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (e.g. :5000, 127.0.0.1:8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Encoder weights (safetensors)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Directory for temp audio files
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut cfg = Config::load(args.config.as_deref())?;
    cfg.apply(Overrides {
        listen: args.listen,
        model: args.model,
        ffmpeg: args.ffmpeg,
        temp_dir: args.temp_dir,
    });
    cfg.validate()?;

    // The model must load before the listener binds.
    let encoder = LstmEncoder::load(
        &cfg.model.path,
        LstmEncoderConfig {
            preprocess: cfg.preprocess.clone(),
            ..Default::default()
        },
    )
    .with_context(|| format!("load voice encoder from {}", cfg.model.path.display()))?;
    info!(
        path = %cfg.model.path.display(),
        dim = encoder.dimension(),
        "voice encoder loaded"
    );

    let transcoder = cfg.transcoder.enabled.then(|| {
        Arc::new(FfmpegTranscoder::new(cfg.transcoder.program.clone())) as Arc<dyn Transcoder>
    });
    let temp_dir = cfg.pipeline.temp_dir();
    let pipeline = Pipeline::new(
        Arc::new(encoder),
        transcoder,
        PipelineConfig {
            temp_dir: temp_dir.clone(),
            transcode: cfg.transcoder.enabled,
            serialize_inference: cfg.model.serialize_inference,
        },
    );

    if cfg.sweep.enabled {
        sweeper::spawn(
            temp_dir,
            Duration::from_secs(cfg.sweep.interval_secs),
            Duration::from_secs(cfg.sweep.max_age_secs),
        );
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
        threshold: cfg.verify.threshold,
    };
    server::serve(state, &cfg.server).await
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
