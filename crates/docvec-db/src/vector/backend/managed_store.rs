//! LanceDB-backed document index.
//!
//! LanceDB owns storage, persistence and nearest-neighbor search. This backend
//! translates documents into its table schema, converts its distances into the
//! score convention and maps its errors into [`DbError`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use docvec_model::EmbeddingModel;
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::{
    connect,
    query::{ExecutableQuery, QueryBase, Select},
    Connection, DistanceType, Table,
};
use tokio::runtime::Runtime;
use tracing::{debug, info, trace, warn};

use crate::document::{CollectionStats, Document, Metadata, MetadataFilter, SearchResult};
use crate::error::{DbError, DbResult};
use crate::vector::config::{
    check_collection_compatibility, load_collection_meta, write_collection_meta, BackendKind,
    CollectionConfig, CollectionMeta, VectorMetric,
};
use crate::vector::scoring::{rank_results, score_from_distance};
use crate::vector::traits::{
    check_dimension, check_embedder, check_top_k, embed_query, embed_texts, validate_batch,
    DocumentIndex,
};

/// LanceDB document index.
pub struct ManagedStore {
    config: CollectionConfig,
    embedder: Arc<dyn EmbeddingModel>,

    /// Backend directory (the LanceDB database root).
    dir: PathBuf,

    /// Open table for this collection.
    table: Table,

    /// Serializes writers. Holds the next insertion sequence number.
    writer: Mutex<i64>,

    /// Tokio runtime for async operations.
    runtime: Runtime,

    #[allow(dead_code)]
    connection: Connection,
}

impl std::fmt::Debug for ManagedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedStore")
            .field("collection", &self.config.collection_name)
            .field("dir", &self.dir)
            .finish()
    }
}

impl ManagedStore {
    /// Open or create a LanceDB-backed collection.
    ///
    /// # Errors
    ///
    /// - [`DbError::BackendUnavailable`] if no runtime can be started or the
    ///   database cannot be reached.
    /// - [`DbError::Configuration`] if the stored collection was created
    ///   with a different dimension, metric or embedding model.
    pub fn open(config: &CollectionConfig, embedder: Arc<dyn EmbeddingModel>) -> DbResult<Self> {
        for warning in config.validate()? {
            warn!("Collection config warning: {}", warning);
        }
        check_embedder(config, embedder.as_ref())?;

        let dir = config.backend_dir(BackendKind::ManagedStore);
        debug!("Opening ManagedStore at {:?}", dir);

        let compat = check_collection_compatibility(&dir, config, BackendKind::ManagedStore);
        let creating = compat.is_not_found();
        compat.into_result(&dir)?;

        std::fs::create_dir_all(&dir).map_err(|e| {
            DbError::persistence(&dir, format!("Failed to create collection directory: {}", e))
        })?;

        let runtime = Runtime::new().map_err(|e| {
            DbError::backend_unavailable(
                BackendKind::ManagedStore.as_str(),
                format!("failed to create runtime: {}", e),
            )
        })?;

        let connection = runtime
            .block_on(async { connect(dir.to_string_lossy().as_ref()).execute().await })
            .map_err(|e| {
                DbError::backend_unavailable(
                    BackendKind::ManagedStore.as_str(),
                    format!("failed to connect to {}: {}", dir.display(), e),
                )
            })?;

        let table = Self::open_or_create_table(&runtime, &connection, config, &dir)?;

        if creating {
            info!(
                "Creating managed-store collection '{}' at {:?}",
                config.collection_name, dir
            );
            write_collection_meta(&dir, &CollectionMeta::new(config, BackendKind::ManagedStore))?;
        }

        let next_seq = runtime.block_on(Self::max_seq(&table, &dir))? + 1;

        Ok(Self {
            config: config.clone(),
            embedder,
            dir,
            table,
            writer: Mutex::new(next_seq),
            runtime,
            connection,
        })
    }

    fn open_or_create_table(
        runtime: &Runtime,
        connection: &Connection,
        config: &CollectionConfig,
        dir: &std::path::Path,
    ) -> DbResult<Table> {
        let name = config.collection_name.as_str();
        let table_names = runtime
            .block_on(async { connection.table_names().execute().await })
            .map_err(|e| lance_error(dir, "Failed to list tables", e))?;

        if table_names.iter().any(|t| t == name) {
            debug!("Opening existing table '{}'", name);
            return runtime
                .block_on(async { connection.open_table(name).execute().await })
                .map_err(|e| lance_error(dir, "Failed to open table", e));
        }

        debug!("Creating new table '{}'", name);
        let schema = Arc::new(table_schema(config.dimension));
        let batch = documents_to_batch(&schema, config.dimension, &[], Vec::new(), 0)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        runtime
            .block_on(async {
                connection
                    .create_table(name, Box::new(batches))
                    .execute()
                    .await
            })
            .map_err(|e| lance_error(dir, "Failed to create table", e))
    }

    /// Highest stored sequence number, or -1 for an empty table.
    async fn max_seq(table: &Table, dir: &std::path::Path) -> DbResult<i64> {
        let results = table
            .query()
            .select(Select::columns(&["seq"]))
            .execute()
            .await
            .map_err(|e| lance_error(dir, "Failed to scan sequence numbers", e))?;
        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| lance_error(dir, "Failed to collect sequence numbers", e))?;

        let mut max = -1;
        for batch in &batches {
            if let Some(seqs) = batch
                .column_by_name("seq")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            {
                for i in 0..seqs.len() {
                    max = max.max(seqs.value(i));
                }
            }
        }
        Ok(max)
    }

    fn lock_writer(&self) -> DbResult<MutexGuard<'_, i64>> {
        self.writer
            .lock()
            .map_err(|e| DbError::internal(format!("Failed to acquire writer lock: {}", e)))
    }

    fn count_rows(&self, filter: Option<String>) -> DbResult<usize> {
        self.runtime
            .block_on(async { self.table.count_rows(filter).await })
            .map_err(|e| lance_error(&self.dir, "Count failed", e))
    }

    fn distance_type(&self) -> DistanceType {
        match self.config.metric {
            VectorMetric::Cosine => DistanceType::Cosine,
            VectorMetric::L2 => DistanceType::L2,
        }
    }

    /// LanceDB reports squared L2; the score convention expects plain L2.
    fn raw_distance(&self, reported: f32) -> f32 {
        match self.config.metric {
            VectorMetric::Cosine => reported,
            VectorMetric::L2 => reported.max(0.0).sqrt(),
        }
    }

    fn refresh_meta(&self) {
        let result = load_collection_meta(&self.dir).and_then(|mut meta| {
            meta.update_count(self.count_rows(None)?);
            write_collection_meta(&self.dir, &meta)
        });
        if let Err(e) = result {
            debug!("Failed to refresh collection metadata: {}", e);
        }
    }

    /// Nearest `limit` rows as `(result, seq)` pairs, unfiltered.
    fn nearest(&self, embedding: &[f32], limit: usize) -> DbResult<Vec<(SearchResult, i64)>> {
        self.runtime.block_on(async {
            let query = self
                .table
                .vector_search(embedding.to_vec())
                .map_err(|e| lance_error(&self.dir, "Failed to create query", e))?
                .limit(limit)
                .distance_type(self.distance_type());

            let results = query
                .execute()
                .await
                .map_err(|e| lance_error(&self.dir, "Query failed", e))?;
            let batches: Vec<RecordBatch> = results
                .try_collect()
                .await
                .map_err(|e| lance_error(&self.dir, "Failed to collect results", e))?;

            let mut hits = Vec::new();
            for batch in batches {
                let ids = string_column(&batch, "id");
                let contents = string_column(&batch, "content");
                let metadatas = string_column(&batch, "metadata");
                let seqs = batch
                    .column_by_name("seq")
                    .and_then(|c| c.as_any().downcast_ref::<Int64Array>());
                let distances = batch
                    .column_by_name("_distance")
                    .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

                let (Some(ids), Some(contents), Some(metadatas), Some(seqs), Some(distances)) =
                    (ids, contents, metadatas, seqs, distances)
                else {
                    return Err(DbError::persistence(
                        &self.dir,
                        "query result is missing expected columns",
                    ));
                };

                for i in 0..batch.num_rows() {
                    let metadata: Metadata =
                        serde_json::from_str(metadatas.value(i)).map_err(|e| {
                            DbError::persistence(
                                &self.dir,
                                format!("Failed to parse metadata of '{}': {}", ids.value(i), e),
                            )
                        })?;
                    let distance = self.raw_distance(distances.value(i));
                    let score = score_from_distance(self.config.metric, distance);
                    hits.push((
                        SearchResult::new(ids.value(i), contents.value(i), metadata, score),
                        seqs.value(i),
                    ));
                }
            }
            Ok(hits)
        })
    }
}

impl DocumentIndex for ManagedStore {
    fn add_documents(&self, documents: &[Document]) -> DbResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        validate_batch(documents)?;

        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let vectors = embed_texts(self.embedder.as_ref(), self.config.dimension, &texts)?;

        let mut next_seq = self.lock_writer()?;

        let id_list = documents
            .iter()
            .map(|d| format!("'{}'", escape_sql_string(&d.id)))
            .collect::<Vec<_>>()
            .join(", ");
        let existing = self.count_rows(Some(format!("id IN ({})", id_list)))?;
        if existing > 0 {
            let stored = self.find_existing(documents)?;
            return Err(DbError::DuplicateDocument { id: stored });
        }

        let current = self.count_rows(None)?;
        if current + documents.len() > self.config.max_elements {
            warn!(
                "Collection '{}' holds {} documents, above max_elements={}",
                self.config.collection_name,
                current + documents.len(),
                self.config.max_elements
            );
        }

        let schema = Arc::new(table_schema(self.config.dimension));
        let batch = documents_to_batch(&schema, self.config.dimension, documents, vectors, *next_seq)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.runtime
            .block_on(async { self.table.add(Box::new(batches)).execute().await })
            .map_err(|e| lance_error(&self.dir, "Insert failed", e))?;

        *next_seq += documents.len() as i64;
        drop(next_seq);

        debug!(
            "Added {} documents to '{}'",
            documents.len(),
            self.config.collection_name
        );
        self.refresh_meta();
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

        let total = self.count_rows(None)?;
        if total == 0 {
            return Ok(Vec::new());
        }
        let filter = filter.filter(|f| !f.is_empty());

        // Metadata is stored as JSON text, so filters run here rather than in
        // LanceDB. Widen the pool until enough rows survive.
        let mut fetch = top_k.min(total);
        loop {
            let hits = self.nearest(embedding, fetch)?;
            let exhausted = hits.len() < fetch || fetch >= total;

            let kept: Vec<(SearchResult, i64)> = hits
                .into_iter()
                .filter(|(hit, _)| filter.map_or(true, |f| f.matches(&hit.metadata)))
                .collect();

            if kept.len() >= top_k || exhausted {
                let mut ranked = rank_results(kept);
                ranked.truncate(top_k);
                trace!("Search returned {} of top_k={}", ranked.len(), top_k);
                return Ok(ranked);
            }
            fetch = (fetch * 2).min(total);
        }
    }

    fn delete_document(&self, id: &str) -> DbResult<bool> {
        let _writer = self.lock_writer()?;

        let predicate = format!("id = '{}'", escape_sql_string(id));
        if self.count_rows(Some(predicate.clone()))? == 0 {
            debug!("Delete of unknown document '{}'", id);
            return Ok(false);
        }

        self.runtime
            .block_on(async { self.table.delete(&predicate).await })
            .map_err(|e| lance_error(&self.dir, "Delete failed", e))?;

        debug!("Deleted '{}' from '{}'", id, self.config.collection_name);
        self.refresh_meta();
        Ok(true)
    }

    fn collection_stats(&self) -> DbResult<CollectionStats> {
        Ok(CollectionStats {
            total_documents: self.count_rows(None)?,
            backend_kind: BackendKind::ManagedStore,
            dimension: self.config.dimension,
            embedding_model_id: self.config.embedding_model_id.clone(),
            collection_name: self.config.collection_name.clone(),
            index_family: self.config.index_family,
            metric: self.config.metric,
        })
    }

    fn clear_collection(&self) -> DbResult<()> {
        let mut next_seq = self.lock_writer()?;

        self.runtime
            .block_on(async { self.table.delete("id IS NOT NULL").await })
            .map_err(|e| lance_error(&self.dir, "Clear failed", e))?;
        *next_seq = 0;
        drop(next_seq);

        info!("Cleared collection '{}'", self.config.collection_name);
        self.refresh_meta();
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::ManagedStore
    }
}

impl ManagedStore {
    /// Name one of the batch ids that is already stored.
    fn find_existing(&self, documents: &[Document]) -> DbResult<String> {
        for doc in documents {
            let predicate = format!("id = '{}'", escape_sql_string(&doc.id));
            if self.count_rows(Some(predicate))? > 0 {
                return Ok(doc.id.clone());
            }
        }
        Err(DbError::internal("duplicate check disagreed with row count"))
    }
}

// ============================================================================
// Arrow helpers
// ============================================================================

/// Arrow schema of a collection table.
fn table_schema(dimension: usize) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("seq", DataType::Int64, false),
    ])
}

/// Convert embedded documents into a batch, numbering them from `first_seq`.
fn documents_to_batch(
    schema: &Arc<Schema>,
    dimension: usize,
    documents: &[Document],
    vectors: Vec<Vec<f32>>,
    first_seq: i64,
) -> DbResult<RecordBatch> {
    let ids: ArrayRef = Arc::new(StringArray::from(
        documents.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
    ));

    let flat_vectors: Vec<f32> = vectors.into_iter().flatten().collect();
    let vector_array =
        FixedSizeListArray::try_new_from_values(Float32Array::from(flat_vectors), dimension as i32)
            .map_err(|e| DbError::internal(format!("Failed to create vector array: {}", e)))?;
    let vectors: ArrayRef = Arc::new(vector_array);

    let contents: ArrayRef = Arc::new(StringArray::from(
        documents.iter().map(|d| d.content.as_str()).collect::<Vec<_>>(),
    ));

    let metadata_json = documents
        .iter()
        .map(|d| serde_json::to_string(&d.metadata))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DbError::invalid_document(format!("metadata is not serializable: {}", e)))?;
    let metadata: ArrayRef = Arc::new(StringArray::from(metadata_json));

    let seqs: ArrayRef = Arc::new(Int64Array::from(
        (0..documents.len() as i64)
            .map(|i| first_seq + i)
            .collect::<Vec<_>>(),
    ));

    RecordBatch::try_new(schema.clone(), vec![ids, vectors, contents, metadata, seqs])
        .map_err(|e| DbError::internal(format!("Failed to create batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

/// Map a native LanceDB error into the persistence taxonomy.
fn lance_error(dir: &std::path::Path, context: &str, err: lancedb::Error) -> DbError {
    DbError::persistence(dir, format!("{}: {}", context, err))
}

/// Escape single quotes in SQL strings.
fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

// ============================================================================
// Tests
// ============================================================================
