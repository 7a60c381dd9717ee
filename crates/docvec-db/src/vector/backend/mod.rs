//! Document index backend implementations.
//!
//! ## Available Backends
//!
//! - `self_managed` (default): raw flat or graph index with its own file
//!   persistence
//! - `managed_store`: LanceDB owns storage and search

#[cfg(not(any(feature = "self-managed", feature = "managed-store")))]
compile_error!("docvec-db needs at least one of the `self-managed` or `managed-store` features");

#[cfg(feature = "managed-store")]
mod managed_store;

#[cfg(feature = "self-managed")]
mod self_managed;

#[cfg(feature = "managed-store")]
pub use managed_store::ManagedStore;

#[cfg(feature = "self-managed")]
pub use self_managed::{
    IdPositionMap, SelfManagedIndex, GRAPH_FILENAME, INDEX_FILENAME, METADATA_FILENAME,
};

use std::sync::Arc;

use docvec_model::EmbeddingModel;
use tracing::{debug, warn};

use super::config::{BackendKind, CollectionConfig};
use super::traits::DocumentIndex;
use crate::document::{CollectionStats, Document, MetadataFilter, SearchResult};
use crate::error::DbResult;

// ============================================================================
// IndexBackend
// ============================================================================

/// The active backend of a collection.
///
/// Only variants whose feature is compiled in exist.
#[derive(Debug)]
pub enum IndexBackend {
    #[cfg(feature = "self-managed")]
    SelfManaged(SelfManagedIndex),
    #[cfg(feature = "managed-store")]
    ManagedStore(ManagedStore),
}

macro_rules! dispatch {
    ($self:expr, $index:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "self-managed")]
            IndexBackend::SelfManaged($index) => $body,
            #[cfg(feature = "managed-store")]
            IndexBackend::ManagedStore($index) => $body,
        }
    };
}

impl IndexBackend {
    /// Borrow the self-managed index, if that is the active backend.
    #[cfg(feature = "self-managed")]
    pub fn as_self_managed(&self) -> Option<&SelfManagedIndex> {
        match self {
            IndexBackend::SelfManaged(index) => Some(index),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

impl DocumentIndex for IndexBackend {
    fn add_documents(&self, documents: &[Document]) -> DbResult<()> {
        dispatch!(self, index => index.add_documents(documents))
    }

    fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>> {
        dispatch!(self, index => index.search(query, top_k, filter))
    }

    fn search_by_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>> {
        dispatch!(self, index => index.search_by_embedding(embedding, top_k, filter))
    }

    fn delete_document(&self, id: &str) -> DbResult<bool> {
        dispatch!(self, index => index.delete_document(id))
    }

    fn collection_stats(&self) -> DbResult<CollectionStats> {
        dispatch!(self, index => index.collection_stats())
    }

    fn clear_collection(&self) -> DbResult<()> {
        dispatch!(self, index => index.clear_collection())
    }

    fn kind(&self) -> BackendKind {
        dispatch!(self, index => index.kind())
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Open the backend named by `config.backend`.
///
/// The collection records the embedder's model id, whatever
/// `config.embedding_model_id` says.
///
/// # Errors
///
/// - [`DbError::BackendUnavailable`](crate::DbError::BackendUnavailable) if the requested backend was compiled
///   out or cannot start.
/// - Any error of the backend's own `open`.
pub fn open_backend(
    config: &CollectionConfig,
    embedder: Arc<dyn EmbeddingModel>,
) -> DbResult<IndexBackend> {
    let mut config = config.clone();
    let model_id = embedder.model_id().to_string();
    if config.embedding_model_id != model_id {
        warn!(
            "Collection config names model '{}' but embedder is '{}'; using the embedder's id",
            config.embedding_model_id, model_id
        );
        config.embedding_model_id = model_id;
    }

    debug!(
        "Opening {} backend for collection '{}'",
        config.backend, config.collection_name
    );

    match config.backend {
        BackendKind::SelfManaged => {
            #[cfg(feature = "self-managed")]
            {
                Ok(IndexBackend::SelfManaged(SelfManagedIndex::open(
                    &config, embedder,
                )?))
            }
            #[cfg(not(feature = "self-managed"))]
            {
                let _ = embedder;
                Err(crate::error::DbError::backend_unavailable(
                    BackendKind::SelfManaged.as_str(),
                    "compiled without the `self-managed` feature",
                ))
            }
        }
        BackendKind::ManagedStore => {
            #[cfg(feature = "managed-store")]
            {
                Ok(IndexBackend::ManagedStore(ManagedStore::open(
                    &config, embedder,
                )?))
            }
            #[cfg(not(feature = "managed-store"))]
            {
                let _ = embedder;
                Err(crate::error::DbError::backend_unavailable(
                    BackendKind::ManagedStore.as_str(),
                    "compiled without the `managed-store` feature",
                ))
            }
        }
    }
}

/// Backends compiled into this build.
#[allow(clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendKind> {
    let mut backends = Vec::new();

    #[cfg(feature = "self-managed")]
    backends.push(BackendKind::SelfManaged);

    #[cfg(feature = "managed-store")]
    backends.push(BackendKind::ManagedStore);

    backends
}

/// Whether `kind` was compiled into this build.
pub fn is_backend_available(kind: BackendKind) -> bool {
    available_backends().contains(&kind)
}

// ============================================================================
// Tests
// ============================================================================
