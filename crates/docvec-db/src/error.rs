//! Error types for docvec-db.

use std::path::PathBuf;
use thiserror::Error;

use docvec_model::ModelError;

/// Result type alias for docvec-db operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in docvec-db operations.
///
/// Backend-native failures (filesystem, bincode, LanceDB) are translated into
/// these variants at the backend boundary.
#[derive(Debug, Error)]
pub enum DbError {
    // ========================================================================
    // Configuration errors (fatal, never retried)
    // ========================================================================
    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Prerequisites for the requested backend are missing.
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    // ========================================================================
    // Storage errors
    // ========================================================================
    /// Reading or writing persisted state failed.
    #[error("Persistence error at {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    // ========================================================================
    // Document errors
    // ========================================================================
    /// Embedding length differs from the collection dimension.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A document with this id is already stored (or repeated in the batch).
    #[error("Document '{id}' already exists")]
    DuplicateDocument { id: String },

    /// The document itself is malformed.
    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String },

    /// The embedding provider failed.
    #[error("Embedding failed: {message}")]
    Embedding { message: String },

    // ========================================================================
    // General errors
    // ========================================================================
    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a backend unavailable error.
    pub fn backend_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid document error.
    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the manager may recover from this error by falling back to
    /// another backend.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

impl From<ModelError> for DbError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidConfig { message } => Self::Configuration { message },
            other => Self::Embedding {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_mapping() {
        let err: DbError = ModelError::embedding_failed("m", "boom").into();
        assert!(matches!(err, DbError::Embedding { .. }));
        assert!(err.to_string().contains("boom"));

        let err: DbError = ModelError::invalid_config("dimension must be positive").into();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[test]
    fn test_backend_unavailable_flag() {
        assert!(DbError::backend_unavailable("managed_store", "not compiled").is_backend_unavailable());
        assert!(!DbError::internal("x").is_backend_unavailable());
    }
}
