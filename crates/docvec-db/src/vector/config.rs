//! Collection configuration and on-disk collection metadata.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DbError, DbResult};

// ============================================================================
// Constants
// ============================================================================

/// Filename for collection metadata, one per backend directory.
pub const INDEX_META_FILENAME: &str = "index.meta.json";

/// Current `index.meta.json` schema version.
pub const INDEX_META_SCHEMA_VERSION: u32 = 1;

/// Default soft capacity of a collection.
pub const DEFAULT_MAX_ELEMENTS: usize = 1_000_000;

// ============================================================================
// BackendKind
// ============================================================================

/// Which backend stores a collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// File-persisted flat/graph index with manual id bookkeeping.
    #[default]
    SelfManaged,
    /// LanceDB-backed store.
    ManagedStore,
}

impl BackendKind {
    /// All kinds, in preference order.
    pub const ALL: [BackendKind; 2] = [BackendKind::SelfManaged, BackendKind::ManagedStore];

    /// Get the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::SelfManaged => "self_managed",
            BackendKind::ManagedStore => "managed_store",
        }
    }

    /// The other backend kind, used for fallback.
    pub fn other(&self) -> BackendKind {
        match self {
            BackendKind::SelfManaged => BackendKind::ManagedStore,
            BackendKind::ManagedStore => BackendKind::SelfManaged,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "self_managed" => Ok(Self::SelfManaged),
            "managed_store" => Ok(Self::ManagedStore),
            _ => Err(DbError::configuration(format!(
                "Unknown backend kind: '{}'. Use 'self_managed' or 'managed_store'.",
                s
            ))),
        }
    }
}

// ============================================================================
// IndexFamily
// ============================================================================

/// Raw index structure used by the self-managed backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFamily {
    /// Exact scan over normalized vectors (inner product).
    #[default]
    FlatIp,
    /// Exact scan with Euclidean distance.
    FlatL2,
    /// Layered navigable graph, approximate.
    GraphApprox,
}

impl IndexFamily {
    /// Get the family name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexFamily::FlatIp => "flat_ip",
            IndexFamily::FlatL2 => "flat_l2",
            IndexFamily::GraphApprox => "graph_approx",
        }
    }

    /// Whether this family can serve the given metric.
    pub fn supports(&self, metric: VectorMetric) -> bool {
        match self {
            IndexFamily::FlatIp => metric == VectorMetric::Cosine,
            IndexFamily::FlatL2 => metric == VectorMetric::L2,
            IndexFamily::GraphApprox => true,
        }
    }
}

impl std::fmt::Display for IndexFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IndexFamily {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "flat_ip" => Ok(Self::FlatIp),
            "flat_l2" => Ok(Self::FlatL2),
            "graph_approx" => Ok(Self::GraphApprox),
            _ => Err(DbError::configuration(format!(
                "Unknown index family: '{}'. Use 'flat_ip', 'flat_l2' or 'graph_approx'.",
                s
            ))),
        }
    }
}

// ============================================================================
// VectorMetric
// ============================================================================

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMetric {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Euclidean (L2) distance.
    L2,
}

impl VectorMetric {
    /// Get the metric name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMetric::Cosine => "cosine",
            VectorMetric::L2 => "l2",
        }
    }
}

impl std::fmt::Display for VectorMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VectorMetric {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            _ => Err(DbError::configuration(format!(
                "Unknown similarity metric: '{}'. Use 'cosine' or 'l2'.",
                s
            ))),
        }
    }
}

// ============================================================================
// CollectionConfig
// ============================================================================

/// Everything a backend needs to open one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConfig {
    /// Root directory shared by all collections.
    pub storage_path: PathBuf,

    /// Collection name, used as a directory and table name.
    pub collection_name: String,

    /// Embedding dimension.
    pub dimension: usize,

    /// Embedding model that produced the stored vectors.
    pub embedding_model_id: String,

    /// Backend that stores this collection.
    #[serde(default)]
    pub backend: BackendKind,

    /// Raw index family (self-managed only).
    #[serde(default)]
    pub index_family: IndexFamily,

    /// Similarity metric.
    #[serde(default)]
    pub metric: VectorMetric,

    /// Soft capacity hint. Exceeding it only logs a warning.
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
}

fn default_max_elements() -> usize {
    DEFAULT_MAX_ELEMENTS
}

impl CollectionConfig {
    /// Create a new config with required fields.
    pub fn new(
        storage_path: impl Into<PathBuf>,
        collection_name: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            storage_path: storage_path.into(),
            collection_name: collection_name.into(),
            dimension,
            embedding_model_id: docvec_model::DEFAULT_EMBEDDING_MODEL_ID.to_string(),
            backend: BackendKind::default(),
            index_family: IndexFamily::default(),
            metric: VectorMetric::default(),
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the index family.
    pub fn with_index_family(mut self, index_family: IndexFamily) -> Self {
        self.index_family = index_family;
        self
    }

    /// Set the similarity metric.
    pub fn with_metric(mut self, metric: VectorMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the embedding model id.
    pub fn with_embedding_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.embedding_model_id = model_id.into();
        self
    }

    /// Set the soft capacity.
    pub fn with_max_elements(mut self, max_elements: usize) -> Self {
        self.max_elements = max_elements;
        self
    }

    /// Directory holding every backend's files for this collection.
    pub fn collection_dir(&self) -> PathBuf {
        self.storage_path.join(&self.collection_name)
    }

    /// Directory owned by one backend for this collection.
    pub fn backend_dir(&self, kind: BackendKind) -> PathBuf {
        self.collection_dir().join(kind.as_str())
    }

    /// Validate the configuration, returning non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Configuration`] for a zero dimension, an empty
    /// storage path, an empty or path-like collection name, or an index
    /// family that cannot serve the metric.
    pub fn validate(&self) -> DbResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.dimension == 0 {
            return Err(DbError::configuration("dimension must be positive"));
        }

        if self.storage_path.as_os_str().is_empty() {
            return Err(DbError::configuration("storage path is required"));
        }

        if self.collection_name.trim().is_empty() {
            return Err(DbError::configuration("collection name is required"));
        }

        if self.collection_name.contains(['/', '\\']) || self.collection_name.starts_with('.') {
            return Err(DbError::configuration(format!(
                "collection name '{}' must not contain path separators or start with '.'",
                self.collection_name
            )));
        }

        if !self.index_family.supports(self.metric) {
            return Err(DbError::configuration(format!(
                "index family '{}' does not support metric '{}'",
                self.index_family, self.metric
            )));
        }

        if self.max_elements == 0 {
            warnings.push("max_elements=0; every insert will exceed the soft capacity".to_string());
        }

        Ok(warnings)
    }
}

// ============================================================================
// CollectionMeta
// ============================================================================

/// Metadata for a persisted collection.
///
/// Stored in `index.meta.json` inside each backend directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    /// Backend that wrote this collection.
    pub backend: BackendKind,

    /// Dimension of vectors.
    pub dimension: usize,

    /// Similarity metric.
    pub metric: VectorMetric,

    /// Raw index family.
    pub index_family: IndexFamily,

    /// Embedding model id.
    pub embedding_model_id: String,

    /// Number of documents (may be stale after a crash).
    #[serde(default)]
    pub count: usize,

    /// Schema version for future migrations.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Creation timestamp (RFC 3339).
    #[serde(default)]
    pub created_at: Option<String>,

    /// Last update timestamp (RFC 3339).
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_schema_version() -> u32 {
    INDEX_META_SCHEMA_VERSION
}

impl CollectionMeta {
    /// Create metadata describing `config` stored by `backend`.
    pub fn new(config: &CollectionConfig, backend: BackendKind) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            backend,
            dimension: config.dimension,
            metric: config.metric,
            index_family: config.index_family,
            embedding_model_id: config.embedding_model_id.clone(),
            count: 0,
            schema_version: INDEX_META_SCHEMA_VERSION,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    /// Update the count and timestamp.
    pub fn update_count(&mut self, count: usize) {
        self.count = count;
        self.updated_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

// ============================================================================
// CollectionCompatibility
// ============================================================================

/// Result of checking an existing collection against a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionCompatibility {
    /// Collection exists and matches.
    Compatible,

    /// No collection metadata yet.
    NotFound,

    /// Stored dimension differs.
    IncompatibleDimension { expected: usize, actual: usize },

    /// Written by another backend.
    IncompatibleBackend {
        expected: BackendKind,
        actual: BackendKind,
    },

    /// Stored metric differs.
    IncompatibleMetric {
        expected: VectorMetric,
        actual: VectorMetric,
    },

    /// Stored index family differs (self-managed only).
    IncompatibleIndexFamily {
        expected: IndexFamily,
        actual: IndexFamily,
    },

    /// Vectors came from a different embedding model.
    IncompatibleModel { expected: String, actual: String },

    /// Metadata is unreadable.
    Corrupted(String),
}

impl CollectionCompatibility {
    /// Check if the collection is compatible.
    pub fn is_compatible(&self) -> bool {
        matches!(self, CollectionCompatibility::Compatible)
    }

    /// Check if the collection doesn't exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollectionCompatibility::NotFound)
    }

    /// Turn an incompatibility into the matching error.
    ///
    /// Returns `Ok(())` for `Compatible` and `NotFound`.
    pub fn into_result(self, dir: &Path) -> DbResult<()> {
        match self {
            Self::Compatible | Self::NotFound => Ok(()),
            Self::IncompatibleDimension { expected, actual } => {
                Err(mismatch(dir, "dimension", expected, actual))
            }
            Self::IncompatibleBackend { expected, actual } => {
                Err(mismatch(dir, "backend", expected, actual))
            }
            Self::IncompatibleMetric { expected, actual } => {
                Err(mismatch(dir, "metric", expected, actual))
            }
            Self::IncompatibleIndexFamily { expected, actual } => {
                Err(mismatch(dir, "index family", expected, actual))
            }
            Self::IncompatibleModel { expected, actual } => {
                Err(mismatch(dir, "embedding model", expected, actual))
            }
            Self::Corrupted(message) => Err(DbError::persistence(
                dir.join(INDEX_META_FILENAME),
                message,
            )),
        }
    }
}

fn mismatch<T: std::fmt::Display>(dir: &Path, what: &str, expected: T, actual: T) -> DbError {
    DbError::configuration(format!(
        "collection at {} was created with {} '{}', configured '{}'",
        dir.display(),
        what,
        actual,
        expected
    ))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Check whether the collection stored in `dir` matches `config` for `backend`.
///
/// The index family is only compared for the self-managed backend, since the
/// managed store picks its own index structure.
pub fn check_collection_compatibility(
    dir: &Path,
    config: &CollectionConfig,
    backend: BackendKind,
) -> CollectionCompatibility {
    if !dir.join(INDEX_META_FILENAME).exists() {
        return CollectionCompatibility::NotFound;
    }

    let meta = match load_collection_meta(dir) {
        Ok(meta) => meta,
        Err(e) => return CollectionCompatibility::Corrupted(e.to_string()),
    };

    if meta.dimension != config.dimension {
        return CollectionCompatibility::IncompatibleDimension {
            expected: config.dimension,
            actual: meta.dimension,
        };
    }

    if meta.backend != backend {
        return CollectionCompatibility::IncompatibleBackend {
            expected: backend,
            actual: meta.backend,
        };
    }

    if meta.metric != config.metric {
        return CollectionCompatibility::IncompatibleMetric {
            expected: config.metric,
            actual: meta.metric,
        };
    }

    if backend == BackendKind::SelfManaged && meta.index_family != config.index_family {
        return CollectionCompatibility::IncompatibleIndexFamily {
            expected: config.index_family,
            actual: meta.index_family,
        };
    }

    if meta.embedding_model_id != config.embedding_model_id {
        return CollectionCompatibility::IncompatibleModel {
            expected: config.embedding_model_id.clone(),
            actual: meta.embedding_model_id,
        };
    }

    CollectionCompatibility::Compatible
}

/// Load collection metadata from a backend directory.
pub fn load_collection_meta(dir: &Path) -> DbResult<CollectionMeta> {
    let meta_path = dir.join(INDEX_META_FILENAME);
    debug!("Loading collection metadata from {:?}", meta_path);

    let content = fs::read_to_string(&meta_path).map_err(|e| {
        DbError::persistence(&meta_path, format!("Failed to read collection metadata: {}", e))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        DbError::persistence(&meta_path, format!("Failed to parse collection metadata: {}", e))
    })
}

/// Write collection metadata to a backend directory.
pub fn write_collection_meta(dir: &Path, meta: &CollectionMeta) -> DbResult<()> {
    let meta_path = dir.join(INDEX_META_FILENAME);
    debug!("Writing collection metadata to {:?}", meta_path);

    let content = serde_json::to_vec_pretty(meta).map_err(|e| {
        DbError::persistence(&meta_path, format!("Failed to serialize collection metadata: {}", e))
    })?;
    write_file_atomic(&meta_path, &content)
}

/// Replace `path` with `bytes` through a sibling temp file and a rename.
///
/// Readers either see the previous content or the new content, never a
/// partially written file.
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8]) -> DbResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| DbError::persistence(path, "path has no parent directory"))?;
    fs::create_dir_all(dir)
        .map_err(|e| DbError::persistence(dir, format!("Failed to create directory: {}", e)))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    let mut file = fs::File::create(&tmp_path)
        .map_err(|e| DbError::persistence(&tmp_path, format!("Failed to create file: {}", e)))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| DbError::persistence(&tmp_path, format!("Failed to write file: {}", e)))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .map_err(|e| DbError::persistence(path, format!("Failed to replace file: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================
