//! # docvec-core
//!
//! Orchestration layer for docvec.
//!
//! - [`VectorDbConfig`]: YAML configuration, loaded from `~/.docvec/config.yaml`
//!   or any given path.
//! - [`VectorDatabaseManager`]: picks a backend from the configuration, falls
//!   back to the other one when the requested backend is unavailable, and
//!   exposes the full operation surface plus backend switching and
//!   benchmarking.
//!
//! ## Usage
//!
//! ```ignore
//! use docvec_core::{Document, VectorDatabaseManager, VectorDbConfig};
//!
//! let manager = VectorDatabaseManager::new(VectorDbConfig::load_default()?)?;
//! manager.add_documents(&[Document::new("a", "hello world")])?;
//! let hits = manager.search("hello", 5, None)?;
//! ```

pub mod config;
pub mod manager;

pub use config::VectorDbConfig;
pub use manager::{
    BackendBenchmark, BackendSelection, BackendSwitch, BenchmarkReport, VectorDatabaseManager,
    BENCHMARK_TOP_K,
};

// Types callers need alongside the manager.
pub use docvec_db::{
    available_backends, is_backend_available, BackendKind, CollectionStats, DbError, DbResult,
    Document, IndexFamily, Metadata, MetadataFilter, MetadataValue, SearchResult, VectorMetric,
};
pub use docvec_model::{EmbeddingModel, ModelInfo};
