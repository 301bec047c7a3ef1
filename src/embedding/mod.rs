pub mod synthetic;

use crate::error::{MemoryError, Result};

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly `dimensions()`
/// entries, all finite. All methods are synchronous — callers in async
/// contexts should use `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for
    /// batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;
}

/// Blends two providers: weighted sum of both embeddings, re-normalized so
/// cosine similarity stays equivalent to dot product.
#[derive(Debug)]
pub struct BlendedProvider {
    a: Box<dyn EmbeddingProvider>,
    b: Box<dyn EmbeddingProvider>,
    alpha: f32,
}

impl BlendedProvider {
    /// `alpha` weights provider `a`; `1 - alpha` weights provider `b`.
    pub fn new(a: Box<dyn EmbeddingProvider>, b: Box<dyn EmbeddingProvider>, alpha: f32) -> Result<Self> {
        if a.dimensions() != b.dimensions() {
            return Err(MemoryError::InvalidInput(format!(
                "blended providers must agree on dimensions: {} vs {}",
                a.dimensions(),
                b.dimensions()
            )));
        }
        Ok(Self { a, b, alpha })
    }
}

impl EmbeddingProvider for BlendedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let va = self.a.embed(text)?;
        let vb = self.b.embed(text)?;
        let mut out: Vec<f32> = va
            .iter()
            .zip(vb.iter())
            .map(|(x, y)| self.alpha * x + (1.0 - self.alpha) * y)
            .collect();
        l2_normalize(&mut out);
        validate_vector(&out)?;
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.a.dimensions()
    }
}

/// Create an embedding provider from config, honoring the blending tier.
///
/// `fast`, `smart`, and `deep` all resolve to the single wired provider;
/// `hybrid` blends it with a seed-rotated variant (α = 0.5) so the blend
/// path stays exercised without a hosted adapter.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    let base: Box<dyn EmbeddingProvider> = match config.provider.as_str() {
        "synthetic" => Box::new(synthetic::SyntheticProvider::new(config.dim)),
        other @ ("openai" | "gemini" | "ollama") => {
            return Err(MemoryError::backend(format!(
                "embedding provider '{other}' requires an external adapter that is not wired \
                 into this build. Supported: synthetic"
            )))
        }
        other => {
            return Err(MemoryError::InvalidInput(format!(
                "unknown embedding provider: {other}. Supported: synthetic, openai, gemini, ollama"
            )))
        }
    };

    match config.tier.as_str() {
        "fast" | "smart" | "deep" => Ok(base),
        "hybrid" => {
            let variant = Box::new(synthetic::SyntheticProvider::with_seed(config.dim, 0x9e37));
            Ok(Box::new(BlendedProvider::new(base, variant, 0.5)?))
        }
        other => Err(MemoryError::InvalidInput(format!(
            "unknown tier: {other}. Supported: fast, smart, deep, hybrid"
        ))),
    }
}

/// In-place L2 normalization. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Reject vectors containing NaN or infinity.
pub fn validate_vector(v: &[f32]) -> Result<()> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(MemoryError::Internal(
            "embedding produced a non-finite component".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_synthetic() {
        let cfg = crate::config::EmbeddingConfig {
            provider: "synthetic".into(),
            tier: "fast".into(),
            dim: 64,
        };
        let provider = create_provider(&cfg).unwrap();
        assert_eq!(provider.dimensions(), 64);
        let v = provider.embed("hello world").unwrap();
        assert_eq!(v.len(), 64);
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let cfg = crate::config::EmbeddingConfig {
            provider: "word2vec".into(),
            tier: "fast".into(),
            dim: 64,
        };
        let err = create_provider(&cfg).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn hosted_provider_reports_backend_unavailable() {
        let cfg = crate::config::EmbeddingConfig {
            provider: "openai".into(),
            tier: "fast".into(),
            dim: 64,
        };
        let err = create_provider(&cfg).unwrap_err();
        assert_eq!(err.kind(), "backend_unavailable");
    }

    #[test]
    fn hybrid_tier_output_is_unit_length() {
        let cfg = crate::config::EmbeddingConfig {
            provider: "synthetic".into(),
            tier: "hybrid".into(),
            dim: 128,
        };
        let provider = create_provider(&cfg).unwrap();
        let v = provider.embed("blended embedding output").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn hybrid_differs_from_fast() {
        let mk = |tier: &str| crate::config::EmbeddingConfig {
            provider: "synthetic".into(),
            tier: tier.into(),
            dim: 128,
        };
        let fast = create_provider(&mk("fast")).unwrap();
        let hybrid = create_provider(&mk("hybrid")).unwrap();
        let a = fast.embed("same text").unwrap();
        let b = hybrid.embed("same text").unwrap();
        assert_ne!(a, b);
    }
}
