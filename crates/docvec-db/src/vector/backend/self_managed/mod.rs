//! Self-managed document index.
//!
//! Owns a raw vector index (flat or graph), the document store and the
//! id/position bookkeeping, and persists all of it under the collection
//! directory.
//!
//! ## Deletion
//!
//! Raw indexes cannot remove vectors. Deleting a document drops it from the
//! store and then rebuilds the raw index from scratch by re-embedding every
//! remaining document in position order. That makes each delete O(n) in the
//! number of remaining documents. Positions are compacted to `0..n` by the
//! rebuild.
//!
//! ## Locking
//!
//! All state sits behind one `RwLock`. Writers (add, delete with its rebuild,
//! clear) take it exclusively; searches share it. An add appends in place and
//! is rolled back if the save does not commit. Delete and clear build the next
//! state separately and swap it in after the save. Either way a failed write
//! leaves the in-memory collection as it was.

mod id_map;
mod raw_index;
mod store;

pub use id_map::IdPositionMap;
pub use store::{GRAPH_FILENAME, INDEX_FILENAME, METADATA_FILENAME};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use docvec_model::EmbeddingModel;
use tracing::{debug, info, trace, warn};

use self::raw_index::RawIndex;
use self::store::{CollectionFiles, StoredDocument};
use crate::document::{CollectionStats, Document, MetadataFilter, SearchResult};
use crate::error::{DbError, DbResult};
use crate::vector::config::{
    check_collection_compatibility, load_collection_meta, write_collection_meta, BackendKind,
    CollectionConfig, CollectionMeta,
};
use crate::vector::scoring::{rank_results, score_from_distance};
use crate::vector::traits::{
    check_dimension, check_embedder, check_top_k, embed_query, embed_texts, validate_batch,
    DocumentIndex,
};

/// In-memory state of one collection.
#[derive(Debug)]
struct CollectionState {
    raw: RawIndex,
    documents: BTreeMap<String, StoredDocument>,
    ids: IdPositionMap,
    meta: CollectionMeta,
}

impl CollectionState {
    fn empty(config: &CollectionConfig, meta: CollectionMeta) -> Self {
        Self {
            raw: RawIndex::new(config.index_family, config.metric, config.dimension),
            documents: BTreeMap::new(),
            ids: IdPositionMap::new(),
            meta,
        }
    }

    /// Append embedded documents at the next free positions.
    fn append(&mut self, documents: &[Document], vectors: Vec<Vec<f32>>) -> DbResult<()> {
        let start = self.raw.len() as u64;
        for (offset, doc) in documents.iter().enumerate() {
            let position = start + offset as u64;
            self.ids.insert(doc.id.clone(), position)?;
            self.documents.insert(
                doc.id.clone(),
                StoredDocument {
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                    position,
                },
            );
        }
        self.raw.add(vectors)?;
        self.meta.update_count(self.documents.len());
        Ok(())
    }

    /// Undo an append of `documents` that started at raw position `start`.
    fn rollback(&mut self, start: usize, documents: &[Document]) -> DbResult<()> {
        for doc in documents {
            if self.ids.position_of(&doc.id).is_some_and(|p| p >= start as u64) {
                self.ids.remove_id(&doc.id);
                self.documents.remove(&doc.id);
            }
        }
        self.raw.truncate(start)?;
        self.meta.update_count(self.documents.len());
        Ok(())
    }

    fn check_consistency(&self) -> DbResult<()> {
        self.ids.check_invariants()?;
        if self.ids.len() != self.documents.len() || self.raw.len() != self.ids.len() {
            return Err(DbError::internal(format!(
                "collection state out of sync: {} documents, {} ids, {} vectors",
                self.documents.len(),
                self.ids.len(),
                self.raw.len()
            )));
        }
        Ok(())
    }
}

/// File-persisted document index with manual id bookkeeping.
pub struct SelfManagedIndex {
    config: CollectionConfig,
    embedder: Arc<dyn EmbeddingModel>,
    files: CollectionFiles,
    state: RwLock<CollectionState>,
}

impl std::fmt::Debug for SelfManagedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfManagedIndex")
            .field("collection", &self.config.collection_name)
            .field("dir", &self.files.dir())
            .finish()
    }
}

impl SelfManagedIndex {
    /// Open a collection, creating it if missing and recovering from an
    /// interrupted save if needed.
    ///
    /// # Errors
    ///
    /// - [`DbError::Configuration`] if the config is invalid, the provider
    ///   dimension differs, or the stored collection was created differently.
    /// - [`DbError::Persistence`] if the metadata file is unreadable or its
    ///   id maps are inconsistent.
    pub fn open(config: &CollectionConfig, embedder: Arc<dyn EmbeddingModel>) -> DbResult<Self> {
        for warning in config.validate()? {
            warn!("Collection config warning: {}", warning);
        }
        check_embedder(config, embedder.as_ref())?;

        let dir = config.backend_dir(BackendKind::SelfManaged);
        debug!("Opening SelfManagedIndex at {:?}", dir);

        let compat = check_collection_compatibility(&dir, config, BackendKind::SelfManaged);
        let meta = if compat.is_not_found() {
            info!(
                "Creating self-managed collection '{}' at {:?}",
                config.collection_name, dir
            );
            fs::create_dir_all(&dir).map_err(|e| {
                DbError::persistence(&dir, format!("Failed to create collection directory: {}", e))
            })?;
            let meta = CollectionMeta::new(config, BackendKind::SelfManaged);
            write_collection_meta(&dir, &meta)?;
            meta
        } else {
            compat.into_result(&dir)?;
            load_collection_meta(&dir)?
        };

        let index = Self {
            config: config.clone(),
            files: CollectionFiles::new(&dir),
            state: RwLock::new(CollectionState::empty(config, meta.clone())),
            embedder,
        };

        let state = index.load_state(meta)?;
        debug!(
            "Opened collection '{}' with {} documents",
            config.collection_name,
            state.documents.len()
        );
        *index.write_state()? = state;

        Ok(index)
    }

    /// Load persisted state, rebuilding the raw index when it lags behind
    /// the metadata file.
    fn load_state(&self, mut meta: CollectionMeta) -> DbResult<CollectionState> {
        let Some(loaded) = self.files.load_metadata()? else {
            if self.files.index_path().exists() {
                warn!(
                    "Discarding orphan index file {:?} without metadata",
                    self.files.index_path()
                );
                self.files.remove_index()?;
            }
            return Ok(CollectionState::empty(&self.config, meta));
        };

        let raw = match self.files.load_index(self.config.index_family) {
            Ok(Some(raw))
                if raw.len() == loaded.ids.len()
                    && raw.matches(
                        self.config.index_family,
                        self.config.metric,
                        self.config.dimension,
                    ) =>
            {
                Some(raw)
            }
            Ok(Some(raw)) => {
                warn!(
                    "Index file holds {} vectors for {} documents, rebuilding",
                    raw.len(),
                    loaded.ids.len()
                );
                None
            }
            Ok(None) => {
                warn!("Index file missing for {} documents, rebuilding", loaded.ids.len());
                None
            }
            Err(e) => {
                warn!("Index file unreadable ({}), rebuilding", e);
                None
            }
        };

        meta.update_count(loaded.documents.len());
        match raw {
            Some(raw) => {
                let state = CollectionState {
                    raw,
                    documents: loaded.documents,
                    ids: loaded.ids,
                    meta,
                };
                state.check_consistency()?;
                Ok(state)
            }
            None => {
                let order: Vec<String> = loaded
                    .ids
                    .iter_by_position()
                    .map(|(_, id)| id.to_string())
                    .collect();
                let mut state = self.rebuild(&loaded.documents, &order, meta)?;
                self.persist(&mut state)?;
                Ok(state)
            }
        }
    }

    /// Build fresh state holding `order`'s documents at positions `0..n`.
    fn rebuild(
        &self,
        documents: &BTreeMap<String, StoredDocument>,
        order: &[String],
        mut meta: CollectionMeta,
    ) -> DbResult<CollectionState> {
        debug!("Rebuilding raw index from {} documents", order.len());

        let mut docs = Vec::with_capacity(order.len());
        for id in order {
            let stored = documents
                .get(id)
                .ok_or_else(|| DbError::internal(format!("document '{}' missing from store", id)))?;
            docs.push(
                Document::new(id.clone(), stored.content.clone())
                    .with_metadata(stored.metadata.clone()),
            );
        }

        meta.update_count(0);
        let mut state = CollectionState::empty(&self.config, meta);
        if docs.is_empty() {
            return Ok(state);
        }

        let texts: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let vectors = embed_texts(self.embedder.as_ref(), self.config.dimension, &texts)?;
        state.append(&docs, vectors)?;
        Ok(state)
    }

    fn persist(&self, state: &mut CollectionState) -> DbResult<()> {
        state.check_consistency()?;
        self.files
            .save(&mut state.raw, &state.documents, &state.ids, &state.meta)
    }

    fn read_state(&self) -> DbResult<RwLockReadGuard<'_, CollectionState>> {
        self.state
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_state(&self) -> DbResult<RwLockWriteGuard<'_, CollectionState>> {
        self.state
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    /// Snapshot of the id/position map, for inspection.
    pub fn id_map(&self) -> DbResult<IdPositionMap> {
        Ok(self.read_state()?.ids.clone())
    }

    /// Directory holding this collection's files.
    pub fn storage_dir(&self) -> &Path {
        self.files.dir()
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }
}

impl DocumentIndex for SelfManagedIndex {
    fn add_documents(&self, documents: &[Document]) -> DbResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        validate_batch(documents)?;

        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let vectors = embed_texts(self.embedder.as_ref(), self.config.dimension, &texts)?;

        let mut state = self.write_state()?;
        if let Some(doc) = documents.iter().find(|d| state.ids.contains_id(&d.id)) {
            return Err(DbError::DuplicateDocument { id: doc.id.clone() });
        }

        let total = state.documents.len() + documents.len();
        if total > self.config.max_elements {
            warn!(
                "Collection '{}' holds {} documents, above max_elements={}",
                self.config.collection_name, total, self.config.max_elements
            );
        }

        let start = state.raw.len();
        let saved = state
            .append(documents, vectors)
            .and_then(|()| self.persist(&mut state));
        if let Err(e) = saved {
            warn!(
                "Add to '{}' did not commit, rolling back: {}",
                self.config.collection_name, e
            );
            state.rollback(start, documents)?;
            return Err(e);
        }

        debug!(
            "Added {} documents to '{}' ({} total)",
            documents.len(),
            self.config.collection_name,
            state.documents.len()
        );
        Ok(())
    }

    fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>> {
        check_top_k(top_k)?;
        let embedding = embed_query(self.embedder.as_ref(), self.config.dimension, query)?;
        self.search_by_embedding(&embedding, top_k, filter)
    }

    fn search_by_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<SearchResult>> {
        check_top_k(top_k)?;
        check_dimension(self.config.dimension, embedding)?;

        let state = self.read_state()?;
        let total = state.raw.len();
        let filter = filter.filter(|f| !f.is_empty());

        // Widen the candidate pool until the filter leaves enough hits or
        // the index is exhausted.
        let mut fetch = top_k.min(total);
        let hits = loop {
            let raw_hits = state.raw.search(embedding, fetch);
            let exhausted = raw_hits.len() < fetch || fetch >= total;

            let mut hits = Vec::with_capacity(top_k);
            for (position, distance) in raw_hits {
                let Some(id) = state.ids.id_at(position) else {
                    continue;
                };
                let Some(doc) = state.documents.get(id) else {
                    continue;
                };
                if filter.is_some_and(|f| !f.matches(&doc.metadata)) {
                    continue;
                }
                let score = score_from_distance(self.config.metric, distance);
                hits.push((
                    SearchResult::new(id, doc.content.clone(), doc.metadata.clone(), score),
                    position as i64,
                ));
                if hits.len() == top_k {
                    break;
                }
            }

            if hits.len() >= top_k || exhausted {
                break hits;
            }
            fetch = (fetch * 2).min(total);
        };

        trace!("Search returned {} of top_k={}", hits.len(), top_k);
        Ok(rank_results(hits))
    }

    fn delete_document(&self, id: &str) -> DbResult<bool> {
        let mut state = self.write_state()?;
        if !state.ids.contains_id(id) {
            debug!("Delete of unknown document '{}'", id);
            return Ok(false);
        }

        let mut documents = state.documents.clone();
        let mut ids = state.ids.clone();
        documents.remove(id);
        ids.remove_id(id);
        let order: Vec<String> = ids
            .iter_by_position()
            .map(|(_, id)| id.to_string())
            .collect();

        let mut next = self.rebuild(&documents, &order, state.meta.clone())?;
        self.persist(&mut next)?;
        *state = next;

        debug!(
            "Deleted '{}' from '{}' ({} remaining)",
            id,
            self.config.collection_name,
            state.documents.len()
        );
        Ok(true)
    }

    fn collection_stats(&self) -> DbResult<CollectionStats> {
        let state = self.read_state()?;
        Ok(CollectionStats {
            total_documents: state.documents.len(),
            backend_kind: BackendKind::SelfManaged,
            dimension: self.config.dimension,
            embedding_model_id: self.config.embedding_model_id.clone(),
            collection_name: self.config.collection_name.clone(),
            index_family: self.config.index_family,
            metric: self.config.metric,
        })
    }

    fn clear_collection(&self) -> DbResult<()> {
        let mut state = self.write_state()?;
        let mut meta = state.meta.clone();
        meta.update_count(0);
        let mut next = CollectionState::empty(&self.config, meta);
        self.persist(&mut next)?;
        *state = next;

        info!("Cleared collection '{}'", self.config.collection_name);
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::SelfManaged
    }
}
