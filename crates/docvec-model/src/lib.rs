//! # docvec-model
//!
//! Embedding layer for docvec.
//!
//! This crate defines the seam between text and vectors. Everything above it
//! (`docvec-db`, `docvec-core`) only sees the [`EmbeddingModel`] trait, so any
//! provider that maps text to a fixed-dimension vector can be plugged in.
//!
//! ## Providers
//!
//! - `hashing` (built in): deterministic feature-hashing model, see
//!   [`HashingEmbeddingModel`]. It needs no weights and is stable across
//!   processes, which is what a collection rebuild relies on.
//!
//! ## Usage
//!
//! ```ignore
//! use docvec_model::{create_embedding_model, EmbeddingConfig};
//!
//! let model = create_embedding_model(&EmbeddingConfig::default())?;
//! let embeddings = model.embed(&["Hello, world!"])?;
//! assert_eq!(embeddings[0].len(), model.dimension());
//! ```

pub mod config;
pub mod error;

mod hashing;

pub use config::{EmbeddingConfig, EmbeddingProviderKind, ModelInfo};
pub use error::{ModelError, ModelResult};
pub use hashing::HashingEmbeddingModel;

/// Default embedding model ID.
pub const DEFAULT_EMBEDDING_MODEL_ID: &str = "docvec/hashing-v1";

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 384;

// ============================================================================
// Embedding Model Trait
// ============================================================================

/// Trait for embedding models.
///
/// Generates dense vector embeddings from text inputs. Implementations must be
/// deterministic for a given model ID: the same text always maps to the same
/// vector.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single model can be shared by
/// several collections and called from concurrent searches.
pub trait EmbeddingModel: Send + Sync + std::fmt::Debug {
    /// Generate embeddings for a batch of texts.
    ///
    /// Returns one vector per input text, each of length `dimension()`.
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>>;

    /// Generate embeddings for owned strings.
    fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.embed(&refs)
    }

    /// Generate the embedding for a single text.
    fn embed_one(&self, text: &str) -> ModelResult<Vec<f32>> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::embedding_failed(self.model_id(), "empty embedding batch"))
    }

    /// Warm up the model by running a dummy inference.
    fn warm_up(&self) -> ModelResult<()> {
        let _ = self.embed(&["warmup"])?;
        Ok(())
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Get model information (ID, dimension, provider).
    fn model_info(&self) -> &ModelInfo;

    /// Get the model ID.
    fn model_id(&self) -> &str {
        &self.model_info().model_id
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// Create an embedding model from configuration.
///
/// # Errors
///
/// Returns `ModelError` if the configuration is invalid.
pub fn create_embedding_model(config: &EmbeddingConfig) -> ModelResult<Box<dyn EmbeddingModel>> {
    match config.provider {
        EmbeddingProviderKind::Hashing => {
            let model = HashingEmbeddingModel::new(config)?;
            Ok(Box::new(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_default_model() {
        let model = create_embedding_model(&EmbeddingConfig::default()).unwrap();
        assert_eq!(model.dimension(), DEFAULT_DIMENSION);
        assert_eq!(model.model_id(), DEFAULT_EMBEDDING_MODEL_ID);
        model.warm_up().unwrap();
    }

    #[test]
    fn test_embed_batch_matches_embed() {
        let model = create_embedding_model(&EmbeddingConfig::default().with_dimension(16)).unwrap();
        let owned = vec!["alpha".to_string(), "beta".to_string()];
        let from_owned = model.embed_batch(&owned).unwrap();
        let from_refs = model.embed(&["alpha", "beta"]).unwrap();
        assert_eq!(from_owned, from_refs);
        assert_eq!(model.embed_one("beta").unwrap(), from_refs[1]);
    }
}
