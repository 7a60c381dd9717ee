//! Configuration for docvec.
//!
//! [`VectorDbConfig`] is the user-facing configuration, normally stored in
//! `~/.docvec/config.yaml`. Every field has a default, so an empty or missing
//! file is a valid configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! backend_kind: managed_store
//! storage_path: /var/lib/docvec
//! collection_name: notes
//! embedding_model_id: docvec/hashing-v1
//! dimension: 384
//! index_family: graph_approx
//! similarity_metric: cosine
//! max_elements: 100000
//! ```
//!
//! camelCase keys (`backendKind`, `storagePath`, ...) are accepted as well.

use std::fs;
use std::path::{Path, PathBuf};

use docvec_db::{BackendKind, CollectionConfig, DbError, DbResult, IndexFamily, VectorMetric};
use docvec_model::{EmbeddingConfig, DEFAULT_DIMENSION, DEFAULT_EMBEDDING_MODEL_ID};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default collection name.
pub const DEFAULT_COLLECTION_NAME: &str = "documents";

/// Default soft capacity of a collection.
pub const DEFAULT_MAX_ELEMENTS: usize = docvec_db::vector::DEFAULT_MAX_ELEMENTS;

// ============================================================================
// VectorDbConfig
// ============================================================================

/// Configuration of one docvec collection and the backend serving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Requested backend. After a fallback the manager's copy holds the
    /// backend actually in use.
    #[serde(alias = "backendKind", alias = "backend")]
    pub backend_kind: BackendKind,

    /// Root directory for all collections.
    #[serde(alias = "storagePath")]
    pub storage_path: PathBuf,

    /// Collection name, also the subdirectory under `storage_path`.
    #[serde(alias = "collectionName")]
    pub collection_name: String,

    /// Embedding model id.
    #[serde(alias = "embeddingModelId")]
    pub embedding_model_id: String,

    /// Embedding dimension. Must match the provider's output.
    pub dimension: usize,

    /// Raw index family for the self-managed backend.
    #[serde(alias = "indexFamily")]
    pub index_family: IndexFamily,

    /// Similarity metric.
    #[serde(alias = "similarityMetric", alias = "metric")]
    pub similarity_metric: VectorMetric,

    /// Soft capacity hint. Exceeding it only logs a warning.
    #[serde(alias = "maxElements")]
    pub max_elements: usize,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend_kind: BackendKind::default(),
            storage_path: default_storage_path(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            embedding_model_id: DEFAULT_EMBEDDING_MODEL_ID.to_string(),
            dimension: DEFAULT_DIMENSION,
            index_family: IndexFamily::default(),
            similarity_metric: VectorMetric::default(),
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }
}

fn default_storage_path() -> PathBuf {
    VectorDbConfig::default_dir()
        .map(|d| d.join("data"))
        .unwrap_or_else(|| PathBuf::from(".docvec").join("data"))
}

impl VectorDbConfig {
    /// Load the configuration from `~/.docvec/config.yaml`.
    ///
    /// If the file does not exist, returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Configuration`] if the file exists but cannot be
    /// read, parsed or validated.
    pub fn load_default() -> DbResult<Self> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load the configuration from a specific path.
    ///
    /// If the file does not exist, returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Configuration`] if the file exists but cannot be
    /// read, parsed or validated.
    pub fn from_path(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            DbError::configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        // An empty file deserializes to unit, not to a mapping.
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                DbError::configuration(format!("Failed to parse {}: {}", path.display(), e))
            })?
        };

        for warning in config.validate()? {
            warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// Default config directory (`~/.docvec`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".docvec"))
    }

    /// Default config file path (`~/.docvec/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join("config.yaml"))
    }

    /// Set the storage root.
    pub fn with_storage_path(mut self, storage_path: impl Into<PathBuf>) -> Self {
        self.storage_path = storage_path.into();
        self
    }

    pub fn with_backend_kind(mut self, backend_kind: BackendKind) -> Self {
        self.backend_kind = backend_kind;
        self
    }

    pub fn with_collection_name(mut self, collection_name: impl Into<String>) -> Self {
        self.collection_name = collection_name.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_embedding_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.embedding_model_id = model_id.into();
        self
    }

    pub fn with_index_family(mut self, index_family: IndexFamily) -> Self {
        self.index_family = index_family;
        self
    }

    pub fn with_similarity_metric(mut self, metric: VectorMetric) -> Self {
        self.similarity_metric = metric;
        self
    }

    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Configuration`] for a zero dimension, an empty
    /// storage path or collection name, or an index family that cannot serve
    /// the metric.
    ///
    /// # Warnings
    ///
    /// Non-fatal issues are returned as strings for the caller to log.
    pub fn validate(&self) -> DbResult<Vec<String>> {
        self.collection_config().validate()
    }

    /// Storage-layer config for the requested backend.
    pub fn collection_config(&self) -> CollectionConfig {
        self.collection_config_for(self.backend_kind)
    }

    /// Storage-layer config for an explicit backend.
    pub fn collection_config_for(&self, backend: BackendKind) -> CollectionConfig {
        CollectionConfig::new(&self.storage_path, &self.collection_name, self.dimension)
            .with_backend(backend)
            .with_index_family(self.index_family)
            .with_metric(self.similarity_metric)
            .with_embedding_model_id(&self.embedding_model_id)
            .with_max_elements(self.max_elements)
    }

    /// Embedding provider config matching this collection.
    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig::default()
            .with_model_id(&self.embedding_model_id)
            .with_dimension(self.dimension)
    }
}

// ============================================================================
// Tests
// ============================================================================
