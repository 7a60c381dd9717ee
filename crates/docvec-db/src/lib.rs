//! # docvec-db
//!
//! Storage layer for docvec - document indexes over dense embeddings.
//!
//! A collection stores text documents, embeds them through a
//! [`docvec_model::EmbeddingModel`], and answers top-k similarity queries.
//! Two backends implement the same [`DocumentIndex`] contract:
//!
//! - [`SelfManagedIndex`] (`self-managed` feature): owns a raw flat or graph
//!   index, the id/position bookkeeping and its own file persistence.
//! - [`ManagedStore`] (`managed-store` feature): delegates storage and search
//!   to LanceDB.
//!
//! [`IndexBackend`] wraps whichever backend is active so callers never name the
//! concrete type.
//!
//! ## Usage
//!
//! ```ignore
//! use docvec_db::{open_backend, CollectionConfig, Document, DocumentIndex};
//!
//! let config = CollectionConfig::new("/tmp/docvec", "notes", 384);
//! let index = open_backend(&config, embedder)?;
//!
//! index.add_documents(&[Document::new("a", "vector search in rust")])?;
//! let hits = index.search("rust search", 5, None)?;
//! ```
//!
//! [`SelfManagedIndex`]: vector::SelfManagedIndex
//! [`ManagedStore`]: vector::ManagedStore

pub mod document;
pub mod error;
pub mod vector;

pub use document::{
    CollectionStats, Document, Metadata, MetadataFilter, MetadataValue, SearchResult,
};
pub use error::{DbError, DbResult};
pub use vector::{
    available_backends, is_backend_available, open_backend, BackendKind, CollectionConfig,
    DocumentIndex, IndexBackend, IndexFamily, VectorMetric,
};
