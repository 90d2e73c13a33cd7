//! WAV decoding and encoding.

use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::AudioError;

/// Audio decoded from a WAV container.
///
/// Samples are mono `f32` in `[-1, 1]`. Multi-channel input is averaged
/// down to a single channel; `channels` keeps the original count.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count of the source file.
    pub channels: u16,
}

impl DecodedAudio {
    /// Returns the playback duration of the decoded samples.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Returns true if no samples were decoded.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Reads and decodes a WAV file from disk.
pub fn read_wav(path: impl AsRef<Path>) -> Result<DecodedAudio, AudioError> {
    let reader = WavReader::open(path)?;
    decode(reader)
}

/// Decodes WAV data from any reader.
pub fn decode_wav<R: Read>(reader: R) -> Result<DecodedAudio, AudioError> {
    let reader = WavReader::new(reader)?;
    decode(reader)
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<DecodedAudio, AudioError> {
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, bits) => {
            return Err(AudioError::UnsupportedFormat { bits, kind: "float" });
        }
        (SampleFormat::Int, bits) => {
            return Err(AudioError::UnsupportedFormat { bits, kind: "int" });
        }
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, spec.channels),
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Averages interleaved frames down to mono.
///
/// A trailing partial frame is dropped.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Encodes mono `f32` samples as a PCM16 WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let v = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(v)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
