//! Configuration types for docvec-model.

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_DIMENSION, DEFAULT_EMBEDDING_MODEL_ID};

// ============================================================================
// EmbeddingProviderKind
// ============================================================================

/// Embedding provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Deterministic feature-hashing model, no weights required.
    #[default]
    Hashing,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashing => write!(f, "hashing"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" | "hash" => Ok(Self::Hashing),
            _ => Err(format!("Unknown provider: '{}'. Use 'hashing'.", s)),
        }
    }
}

// ============================================================================
// ModelInfo
// ============================================================================

/// Information about a loaded model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub model_id: String,
    /// Embedding dimension.
    pub dimension: usize,
    /// Provider that produced this model.
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
}

impl ModelInfo {
    /// Create new model info.
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            provider: EmbeddingProviderKind::default(),
        }
    }
}

// ============================================================================
// EmbeddingConfig
// ============================================================================

/// Configuration for an embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Model ID. Different IDs produce unrelated vector spaces.
    #[serde(default = "default_embedding_model_id")]
    pub model_id: String,

    /// Output dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_embedding_model_id() -> String {
    DEFAULT_EMBEDDING_MODEL_ID.to_string()
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model_id: default_embedding_model_id(),
            dimension: default_dimension(),
        }
    }
}

impl EmbeddingConfig {
    /// Create a config with a specific model ID.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Create a config with a specific dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}
