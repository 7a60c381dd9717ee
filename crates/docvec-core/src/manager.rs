//! The vector database manager.
//!
//! [`VectorDatabaseManager`] owns one embedding model and one open backend.
//! Callers talk to the manager only, so switching backends never changes
//! calling code.
//!
//! ## Fallback
//!
//! When the requested backend reports [`DbError::BackendUnavailable`] (its
//! cargo feature is compiled out, or it cannot start), the manager opens the
//! other backend instead, logs a warning and records the switch in both
//! [`VectorDatabaseManager::selection`] and the effective configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use docvec_db::{
    is_backend_available, open_backend, BackendKind, CollectionConfig, CollectionStats, DbError,
    DbResult, Document, DocumentIndex, IndexBackend, MetadataFilter, SearchResult,
};
use docvec_model::{create_embedding_model, EmbeddingModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VectorDbConfig;

/// `top_k` used for every benchmark query.
pub const BENCHMARK_TOP_K: usize = 5;

/// Prefix of the disposable benchmark directories under the storage root.
const BENCHMARK_DIR_PREFIX: &str = ".benchmark-";

// ============================================================================
// Reports
// ============================================================================

/// How the active backend was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSelection {
    /// Backend named by the configuration.
    pub requested: BackendKind,
    /// Backend actually in use.
    pub effective: BackendKind,
    /// Whether the manager fell back to the other backend.
    pub fell_back: bool,
    /// Why the requested backend was not used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of [`VectorDatabaseManager::switch_backend`].
///
/// Documents are never migrated between backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSwitch {
    pub previous: BackendKind,
    pub current: BackendKind,
    pub fell_back: bool,
    /// Always 0.
    pub documents_migrated: usize,
    /// Documents stored in the previous backend that the current one does
    /// not see.
    pub documents_left_behind: usize,
    pub message: String,
}

/// Timing of one backend in a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendBenchmark {
    Completed {
        /// Wall time of the bulk insertion, in seconds.
        insert_secs: f64,
        /// Mean wall time per query, in seconds. 0 when no queries ran.
        avg_search_secs: f64,
        total_documents: usize,
        queries: usize,
    },
    Failed {
        error: String,
    },
}

/// Per-backend benchmark results. Backends that are not available in this
/// build are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub results: BTreeMap<BackendKind, BackendBenchmark>,
}

impl BenchmarkReport {
    pub fn get(&self, kind: BackendKind) -> Option<&BackendBenchmark> {
        self.results.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

// ============================================================================
// VectorDatabaseManager
// ============================================================================

/// Single entry point over whichever backend is active.
pub struct VectorDatabaseManager {
    config: VectorDbConfig,
    embedder: Arc<dyn EmbeddingModel>,
    backend: IndexBackend,
    selection: BackendSelection,
}

impl std::fmt::Debug for VectorDatabaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDatabaseManager")
            .field("config", &self.config)
            .field("selection", &self.selection)
            .finish()
    }
}

impl VectorDatabaseManager {
    /// Create a manager with the embedding model named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Configuration`] for an invalid configuration, or
    /// the error of the backend that could not be opened.
    pub fn new(config: VectorDbConfig) -> DbResult<Self> {
        let embedder: Arc<dyn EmbeddingModel> =
            Arc::from(create_embedding_model(&config.embedding_config())?);
        Self::with_embedder(config, embedder)
    }

    /// Create a manager around an existing embedding model.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Configuration`] if the configuration is invalid or
    /// the model's dimension differs from `config.dimension`.
    pub fn with_embedder(
        mut config: VectorDbConfig,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> DbResult<Self> {
        for warning in config.validate()? {
            warn!("Config warning: {}", warning);
        }

        if embedder.dimension() != config.dimension {
            return Err(DbError::configuration(format!(
                "embedding model '{}' produces {}-dimensional vectors, config expects {}",
                embedder.model_id(),
                embedder.dimension(),
                config.dimension
            )));
        }
        if embedder.model_id() != config.embedding_model_id {
            warn!(
                "Config names model '{}' but the embedder is '{}'; using the embedder's id",
                config.embedding_model_id,
                embedder.model_id()
            );
            config.embedding_model_id = embedder.model_id().to_string();
        }

        let (backend, selection) = open_with_fallback(&config, &embedder)?;
        config.backend_kind = selection.effective;

        info!(
            "Opened collection '{}' on {} backend",
            config.collection_name, selection.effective
        );

        Ok(Self {
            config,
            embedder,
            backend,
            selection,
        })
    }

    /// Effective configuration. `backend_kind` is the backend in use.
    pub fn config(&self) -> &VectorDbConfig {
        &self.config
    }

    /// How the active backend was chosen.
    pub fn selection(&self) -> &BackendSelection {
        &self.selection
    }

    /// The active backend.
    pub fn backend(&self) -> &IndexBackend {
        &self.backend
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingModel> {
        &self.embedder
    }

    // ------------------------------------------------------------------------
    // Operation surface
    // ------------------------------------------------------------------------

    pub fn add_documents(&self, documents: &[Document]) -> DbResult<()> {
        self.backend.add_documents(documents)
    }

    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>> {
        self.backend.search(query, top_k, filter)
    }

    pub fn search_by_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>> {
        self.backend.search_by_embedding(embedding, top_k, filter)
    }

    pub fn delete_document(&self, id: &str) -> DbResult<bool> {
        self.backend.delete_document(id)
    }

    pub fn get_collection_stats(&self) -> DbResult<CollectionStats> {
        self.backend.collection_stats()
    }

    pub fn clear_collection(&self) -> DbResult<()> {
        self.backend.clear_collection()
    }

    // ------------------------------------------------------------------------
    // Switching
    // ------------------------------------------------------------------------

    /// Replace the active backend with a new instance of `kind`.
    ///
    /// Existing documents stay where they are: the returned
    /// [`BackendSwitch`] reports how many the new backend does not see. If
    /// `kind` is unavailable the manager falls back exactly as at
    /// construction. On error the current backend stays active.
    pub fn switch_backend(&mut self, kind: BackendKind) -> DbResult<BackendSwitch> {
        let previous = self.backend.kind();
        let previous_count = self.backend.len()?;

        let requested = self.config.clone().with_backend_kind(kind);
        let (backend, selection) = open_with_fallback(&requested, &self.embedder)?;
        let current = selection.effective;

        let documents_left_behind = if current == previous { 0 } else { previous_count };

        let mut message = if current == previous {
            format!("Reopened {} backend", current)
        } else {
            format!(
                "Switched from {} to {}; {} documents were not migrated",
                previous, current, documents_left_behind
            )
        };
        if let Some(reason) = &selection.reason {
            message = format!("{} unavailable ({}). {}", kind, reason, message);
        }
        info!("{}", message);

        self.backend = backend;
        self.config.backend_kind = current;
        self.selection = selection;

        Ok(BackendSwitch {
            previous,
            current,
            fell_back: self.selection.fell_back,
            documents_migrated: 0,
            documents_left_behind,
            message,
        })
    }

    // ------------------------------------------------------------------------
    // Benchmark
    // ------------------------------------------------------------------------

    /// Time bulk insertion and per-query search on every available backend.
    ///
    /// Each backend gets a disposable collection under
    /// `<storage_path>/.benchmark-<uuid>`, removed afterwards. The active
    /// collection is never touched. A backend that is unavailable is left out
    /// of the report; any other failure is reported per backend.
    pub fn benchmark(&self, documents: &[Document], queries: &[String]) -> BenchmarkReport {
        let mut report = BenchmarkReport::default();

        for kind in BackendKind::ALL {
            if !is_backend_available(kind) {
                debug!("Skipping {} in benchmark: not compiled in", kind);
                continue;
            }

            let dir = self
                .config
                .storage_path
                .join(format!("{}{}", BENCHMARK_DIR_PREFIX, Uuid::new_v4()));
            let config = self.benchmark_config(&dir, kind);

            let outcome = run_benchmark(&config, &self.embedder, documents, queries);
            remove_benchmark_dir(&dir);

            match outcome {
                Ok(result) => {
                    report.results.insert(kind, result);
                }
                Err(e) if e.is_backend_unavailable() => {
                    warn!("Skipping {} in benchmark: {}", kind, e);
                }
                Err(e) => {
                    warn!("Benchmark of {} failed: {}", kind, e);
                    report
                        .results
                        .insert(kind, BackendBenchmark::Failed { error: e.to_string() });
                }
            }
        }

        report
    }

    fn benchmark_config(&self, dir: &Path, kind: BackendKind) -> CollectionConfig {
        CollectionConfig::new(
            dir,
            format!("bench_{}", kind.as_str()),
            self.config.dimension,
        )
        .with_backend(kind)
        .with_index_family(self.config.index_family)
        .with_metric(self.config.similarity_metric)
        .with_embedding_model_id(self.embedder.model_id())
        .with_max_elements(self.config.max_elements)
    }
}

/// Open `config.backend_kind`, or the other backend if it is unavailable.
fn open_with_fallback(
    config: &VectorDbConfig,
    embedder: &Arc<dyn EmbeddingModel>,
) -> DbResult<(IndexBackend, BackendSelection)> {
    let requested = config.backend_kind;

    match open_backend(&config.collection_config_for(requested), embedder.clone()) {
        Ok(backend) => Ok((
            backend,
            BackendSelection {
                requested,
                effective: requested,
                fell_back: false,
                reason: None,
            },
        )),
        Err(e) if e.is_backend_unavailable() => {
            let fallback = requested.other();
            warn!(
                "{} backend unavailable ({}), falling back to {}",
                requested, e, fallback
            );
            let backend = open_backend(&config.collection_config_for(fallback), embedder.clone())?;
            Ok((
                backend,
                BackendSelection {
                    requested,
                    effective: fallback,
                    fell_back: true,
                    reason: Some(e.to_string()),
                },
            ))
        }
        Err(e) => Err(e),
    }
}

fn run_benchmark(
    config: &CollectionConfig,
    embedder: &Arc<dyn EmbeddingModel>,
    documents: &[Document],
    queries: &[String],
) -> DbResult<BackendBenchmark> {
    let backend = open_backend(config, embedder.clone())?;

    let start = Instant::now();
    backend.add_documents(documents)?;
    let insert_secs = start.elapsed().as_secs_f64();

    let mut search_secs = 0.0;
    for query in queries {
        let start = Instant::now();
        backend.search(query, BENCHMARK_TOP_K, None)?;
        search_secs += start.elapsed().as_secs_f64();
    }
    let avg_search_secs = if queries.is_empty() {
        0.0
    } else {
        search_secs / queries.len() as f64
    };

    let total_documents = backend.len()?;
    backend.clear_collection()?;

    debug!(
        "Benchmarked {}: insert {:.4}s, avg search {:.6}s",
        backend.kind(),
        insert_secs,
        avg_search_secs
    );

    Ok(BackendBenchmark::Completed {
        insert_secs,
        avg_search_secs,
        total_documents,
        queries: queries.len(),
    })
}

fn remove_benchmark_dir(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            warn!("Failed to remove benchmark directory {}: {}", dir.display(), e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
