use crate::VoiceprintError;

/// Cosine similarity of two embeddings, in `[-1, 1]`.
///
/// Uses f64 accumulation. Fails on length mismatch or a zero-magnitude input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VoiceprintError> {
    if a.len() != b.len() {
        return Err(VoiceprintError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return Err(VoiceprintError::ZeroNorm);
    }
    Ok((dot / denom).clamp(-1.0, 1.0) as f32)
}

/// L2-normalizes a vector to unit length in-place.
/// Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let mut norm: f64 = 0.0;
    for &x in v.iter() {
        norm += (x as f64) * (x as f64);
    }
    norm = norm.sqrt();
    if norm > 0.0 {
        let scale = (1.0 / norm) as f32;
        for x in v.iter_mut() {
            *x *= scale;
        }
    }
}
