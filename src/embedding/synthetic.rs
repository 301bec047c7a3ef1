//! Deterministic hash-based embedder.
//!
//! Maps text to a fixed-dimension vector with no network or model files:
//! each token (and each adjacent token bigram) is hashed into a bucket and
//! contributes a signed weight derived from the same hash. The result is
//! L2-normalized, so cosine similarity is a dot product. The same input
//! always produces the same vector, which makes it the reference provider
//! for tests and offline runs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{l2_normalize, validate_vector, EmbeddingProvider};
use crate::error::Result;

#[derive(Debug)]
pub struct SyntheticProvider {
    dim: usize,
    seed: u64,
}

impl SyntheticProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim, seed: 0 }
    }

    /// A seeded variant produces a different (but still deterministic)
    /// projection of the same text. Used by the hybrid blending tier.
    pub fn with_seed(dim: usize, seed: u64) -> Self {
        Self { dim, seed }
    }

    fn token_hash(&self, token: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn scatter(&self, v: &mut [f32], token: &str, weight: f32) {
        let h = self.token_hash(token);
        let bucket = (h % self.dim as u64) as usize;
        // Sign from a high bit so bucket and sign are independent.
        let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
        // Second projection decorrelates tokens that collide on the first.
        let h2 = h.rotate_left(21) ^ 0xa076_1d64_78bd_642f;
        let bucket2 = (h2 % self.dim as u64) as usize;
        let sign2 = if h2 & (1 << 62) == 0 { 1.0 } else { -1.0 };
        v[bucket2] += sign2 * weight * 0.5;
    }
}

impl EmbeddingProvider for SyntheticProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        for token in &tokens {
            self.scatter(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.scatter(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        // Empty or all-punctuation input still yields a valid unit vector.
        if tokens.is_empty() {
            self.scatter(&mut v, "", 1.0);
        }

        l2_normalize(&mut v);
        validate_vector(&v)?;
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }
}
