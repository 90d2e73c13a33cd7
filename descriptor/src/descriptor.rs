use serde::{Deserialize, Serialize};
use voicedesc_voiceprint::cosine_similarity;

use crate::error::DescriptorError;

/// Similarity at or above which two descriptors are the same speaker.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.75;

/// Fixed-length speaker embedding of one utterance.
///
/// Serializes as `{"descriptor": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    pub descriptor: Vec<f32>,
}

impl VoiceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { descriptor: values }
    }

    pub fn values(&self) -> &[f32] {
        &self.descriptor
    }

    pub fn len(&self) -> usize {
        self.descriptor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    /// Compares against an enrolled descriptor.
    pub fn compare(&self, reference: &[f32], threshold: f32) -> Result<Comparison, DescriptorError> {
        compare(reference, &self.descriptor, threshold)
    }
}

/// Result of comparing two descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    pub similarity: f32,
    pub threshold: f32,
    #[serde(rename = "match")]
    pub is_match: bool,
}

/// Cosine similarity of two descriptors against `threshold`.
///
/// Both vectors must be non-empty, finite, equally long and non-zero.
pub fn compare(reference: &[f32], candidate: &[f32], threshold: f32) -> Result<Comparison, DescriptorError> {
    if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
        return Err(DescriptorError::InvalidDescriptor(format!(
            "threshold must be within [-1, 1], got {threshold}"
        )));
    }
    for (name, v) in [("reference", reference), ("candidate", candidate)] {
        if v.is_empty() {
            return Err(DescriptorError::InvalidDescriptor(format!("{name} is empty")));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(DescriptorError::InvalidDescriptor(format!(
                "{name} contains non-finite values"
            )));
        }
    }

    let similarity = cosine_similarity(reference, candidate)
        .map_err(|e| DescriptorError::InvalidDescriptor(e.to_string()))?;
    Ok(Comparison {
        similarity,
        threshold,
        is_match: similarity >= threshold,
    })
}
