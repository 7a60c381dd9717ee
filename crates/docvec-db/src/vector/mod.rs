//! Document indexes for docvec-db.
//!
//! ## Available Backends
//!
//! - `self_managed` (default): flat or graph raw index plus file persistence
//! - `managed_store`: LanceDB table per collection
//!
//! ## Usage
//!
//! ```ignore
//! use docvec_db::vector::{open_backend, CollectionConfig, DocumentIndex};
//!
//! let config = CollectionConfig::new("/path/to/storage", "notes", 384);
//! let index = open_backend(&config, embedder)?;
//!
//! index.add_documents(&docs)?;
//! let results = index.search("query text", 10, None)?;
//! ```

mod backend;
mod config;
pub mod scoring;
mod traits;

pub use config::{
    check_collection_compatibility, load_collection_meta, write_collection_meta, BackendKind,
    CollectionCompatibility, CollectionConfig, CollectionMeta, IndexFamily, VectorMetric,
    DEFAULT_MAX_ELEMENTS, INDEX_META_FILENAME, INDEX_META_SCHEMA_VERSION,
};
pub use traits::DocumentIndex;

pub use backend::{available_backends, is_backend_available, open_backend, IndexBackend};

#[cfg(feature = "managed-store")]
pub use backend::ManagedStore;

#[cfg(feature = "self-managed")]
pub use backend::{
    IdPositionMap, SelfManagedIndex, GRAPH_FILENAME, INDEX_FILENAME, METADATA_FILENAME,
};
