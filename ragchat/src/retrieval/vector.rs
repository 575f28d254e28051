//! Embedding vector math.
//!
//! Cosine similarity is the only scoring function the ranker uses. A zero-magnitude
//! vector scores 0 against everything instead of dividing by zero.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SimilarityError {
    #[error("vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("vectors cannot be empty")]
    EmptyVector,
}

pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// L2 norm (magnitude).
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.is_empty() || b.is_empty() {
        return Err(SimilarityError::EmptyVector);
    }
    let product = dot(a, b)?;

    let mag_a = l2_norm(a);
    let mag_b = l2_norm(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return Ok(0.0);
    }

    Ok(product / (mag_a * mag_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_is_symmetric() {
        let a = [0.3, -1.2, 4.0, 0.5];
        let b = [1.0, 0.25, -0.75, 2.0];
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let a = [0.1, 0.2, 0.3, 0.4, 0.5];
        let s = cosine_similarity(&a, &a).unwrap();
        assert!((s - 1.0).abs() < 1e-6, "got {s}");
    }

    #[test]
    fn test_opposite_vectors_score_minus_one() {
        let s = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap();
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            SimilarityError::DimensionMismatch { left: 2, right: 3 }
        );
    }

    #[test]
    fn test_empty_vector() {
        assert_eq!(
            cosine_similarity(&[], &[1.0]).unwrap_err(),
            SimilarityError::EmptyVector
        );
        assert_eq!(
            cosine_similarity(&[1.0], &[]).unwrap_err(),
            SimilarityError::EmptyVector
        );
    }

    #[test]
    fn test_zero_magnitude_is_neutral() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_l2_norm() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < f32::EPSILON);
    }
}
