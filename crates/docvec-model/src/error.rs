//! Error types for docvec-model.

use thiserror::Error;

/// Result type alias for docvec-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while producing embeddings.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model configuration is invalid.
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Embedding generation failed.
    #[error("Embedding failed for model '{model_id}': {message}")]
    EmbeddingFailed { model_id: String, message: String },

    /// Provider not available in this build.
    #[error("Provider '{provider}' not available: {reason}")]
    ProviderNotAvailable { provider: String, reason: String },
}

impl ModelError {
    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an embedding failed error.
    pub fn embedding_failed(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            model_id: model_id.into(),
            message: message.into(),
        }
    }
}
