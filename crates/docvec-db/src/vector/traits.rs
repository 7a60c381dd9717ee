//! The backend contract and the batch checks every backend shares.

use std::collections::HashSet;

use docvec_model::EmbeddingModel;

use super::config::{BackendKind, CollectionConfig};
use crate::document::{CollectionStats, Document, MetadataFilter, SearchResult};
use crate::error::{DbError, DbResult};

// ============================================================================
// DocumentIndex Trait
// ============================================================================

/// Core trait for document index backends.
///
/// ## Implementation Notes
///
/// - Backends must be thread-safe (`Send + Sync`).
/// - `add_documents` is atomic per call: either every document of the batch
///   is visible afterwards or none is.
/// - `search` returns results sorted by score (best first), ties broken by
///   insertion order. Filtered-out candidates do not count toward `top_k`.
/// - Deleting an unknown id is not an error; it returns `Ok(false)`.
pub trait DocumentIndex: Send + Sync {
    /// Embed and store a batch of documents.
    fn add_documents(&self, documents: &[Document]) -> DbResult<()>;

    /// Embed `query` and return the `top_k` most similar documents.
    fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>>;

    /// Return the `top_k` documents most similar to a precomputed embedding.
    fn search_by_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>>;

    /// Delete a document by id. Returns whether it existed.
    fn delete_document(&self, id: &str) -> DbResult<bool>;

    /// Get collection statistics.
    fn collection_stats(&self) -> DbResult<CollectionStats>;

    /// Discard all documents and reset the index to empty.
    fn clear_collection(&self) -> DbResult<()>;

    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Get the number of stored documents.
    fn len(&self) -> DbResult<usize> {
        Ok(self.collection_stats()?.total_documents)
    }

    /// Check if the collection is empty.
    fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len()? == 0)
    }
}

// ============================================================================
// Shared batch checks
// ============================================================================

/// Reject empty ids and ids repeated inside the batch.
pub(crate) fn validate_batch(documents: &[Document]) -> DbResult<()> {
    let mut seen = HashSet::with_capacity(documents.len());
    for doc in documents {
        if doc.id.trim().is_empty() {
            return Err(DbError::invalid_document("document id must not be empty"));
        }
        if !seen.insert(doc.id.as_str()) {
            return Err(DbError::DuplicateDocument { id: doc.id.clone() });
        }
    }
    Ok(())
}

/// Reject a non-positive `top_k`.
pub(crate) fn check_top_k(top_k: usize) -> DbResult<()> {
    if top_k == 0 {
        return Err(DbError::configuration("top_k must be positive"));
    }
    Ok(())
}

/// Embed texts and verify count and dimension before anything is stored.
pub(crate) fn embed_texts(
    embedder: &dyn EmbeddingModel,
    dimension: usize,
    texts: &[&str],
) -> DbResult<Vec<Vec<f32>>> {
    let vectors = embedder.embed(texts)?;
    if vectors.len() != texts.len() {
        return Err(DbError::embedding(format!(
            "model '{}' returned {} embeddings for {} texts",
            embedder.model_id(),
            vectors.len(),
            texts.len()
        )));
    }
    for vector in &vectors {
        check_dimension(dimension, vector)?;
    }
    Ok(vectors)
}

/// Embed a single query text.
pub(crate) fn embed_query(
    embedder: &dyn EmbeddingModel,
    dimension: usize,
    query: &str,
) -> DbResult<Vec<f32>> {
    let mut vectors = embed_texts(embedder, dimension, &[query])?;
    vectors
        .pop()
        .ok_or_else(|| DbError::embedding("empty embedding batch"))
}

/// Verify one vector's length against the collection dimension.
pub(crate) fn check_dimension(dimension: usize, vector: &[f32]) -> DbResult<()> {
    if vector.len() != dimension {
        return Err(DbError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Check that a provider fits a collection before the collection is opened.
pub(crate) fn check_embedder(config: &CollectionConfig, embedder: &dyn EmbeddingModel) -> DbResult<()> {
    if embedder.dimension() != config.dimension {
        return Err(DbError::configuration(format!(
            "embedding model '{}' produces {}-dimensional vectors, collection '{}' expects {}",
            embedder.model_id(),
            embedder.dimension(),
            config.collection_name,
            config.dimension
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_batch() {
        assert!(validate_batch(&[Document::new("a", "x"), Document::new("b", "y")]).is_ok());
        assert!(matches!(
            validate_batch(&[Document::new("a", "x"), Document::new("a", "y")]),
            Err(DbError::DuplicateDocument { id }) if id == "a"
        ));
        assert!(matches!(
            validate_batch(&[Document::new("  ", "x")]),
            Err(DbError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn test_check_top_k() {
        assert!(check_top_k(1).is_ok());
        assert!(matches!(check_top_k(0), Err(DbError::Configuration { .. })));
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, &[0.0, 1.0, 2.0]).is_ok());
        assert!(matches!(
            check_dimension(3, &[0.0]),
            Err(DbError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }
}
