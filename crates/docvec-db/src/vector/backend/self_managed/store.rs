//! File persistence for a self-managed collection.
//!
//! Storage layout:
//!
//! ```text
//! <storage_path>/<collection>/self_managed/
//! ├── index.meta.json   # CollectionMeta
//! ├── vectors.index     # bincode-encoded prepared vectors
//! ├── vectors.hnsw      # hora HNSW dump (graph_approx only)
//! └── metadata.json     # documents + both id/position maps
//! ```
//!
//! Every save writes the index files first, then `metadata.json`, each through
//! a temp file and a rename. Replacing `metadata.json` commits the save:
//! metadata on disk never describes more documents than the index files next
//! to it hold. The document count in `index.meta.json` is refreshed after the
//! commit and a failure there is only logged.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bincode::config;
use hora::core::ann_index::SerializableIndex;
use hora::index::hnsw_idx::HNSWIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::id_map::IdPositionMap;
use super::raw_index::{FlatIndex, GraphIndex, RawIndex};
use crate::document::Metadata;
use crate::error::{DbError, DbResult};
use crate::vector::config::{
    write_collection_meta, write_file_atomic, CollectionMeta, IndexFamily,
};

/// Filename for the serialized vectors.
pub const INDEX_FILENAME: &str = "vectors.index";

/// Filename for the hora graph of a `graph_approx` collection.
pub const GRAPH_FILENAME: &str = "vectors.hnsw";

/// Filename for the document store and id maps.
pub const METADATA_FILENAME: &str = "metadata.json";

/// One stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub position: u64,
}

/// Shape of `metadata.json`.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile<'a> {
    documents: Cow<'a, BTreeMap<String, StoredDocument>>,
    id_to_position: Cow<'a, BTreeMap<String, u64>>,
    position_to_id: Cow<'a, BTreeMap<u64, String>>,
}

/// Document store plus id bookkeeping, as loaded from `metadata.json`.
#[derive(Debug, Clone)]
pub struct LoadedMetadata {
    pub documents: BTreeMap<String, StoredDocument>,
    pub ids: IdPositionMap,
}

/// Paths of one collection's files.
#[derive(Debug, Clone)]
pub struct CollectionFiles {
    dir: PathBuf,
}

impl CollectionFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILENAME)
    }

    pub fn graph_path(&self) -> PathBuf {
        self.dir.join(GRAPH_FILENAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILENAME)
    }

    /// Persist the raw index, then commit the document store, then refresh
    /// the meta count.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Persistence`] only when the save did not commit,
    /// i.e. `metadata.json` still holds the previous state.
    pub fn save(
        &self,
        raw: &mut RawIndex,
        documents: &BTreeMap<String, StoredDocument>,
        ids: &IdPositionMap,
        meta: &CollectionMeta,
    ) -> DbResult<()> {
        let index_path = self.index_path();
        let bytes = bincode::encode_to_vec(raw.vectors(), config::standard()).map_err(|e| {
            DbError::persistence(&index_path, format!("Failed to serialize index: {}", e))
        })?;
        write_file_atomic(&index_path, &bytes)?;

        if let RawIndex::Graph(graph) = raw {
            self.save_graph(graph)?;
        }

        let metadata_path = self.metadata_path();
        let file = MetadataFile {
            documents: Cow::Borrowed(documents),
            id_to_position: Cow::Borrowed(ids.id_to_position()),
            position_to_id: Cow::Borrowed(ids.position_to_id()),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| {
            DbError::persistence(&metadata_path, format!("Failed to serialize metadata: {}", e))
        })?;
        write_file_atomic(&metadata_path, &json)?;

        if let Err(e) = write_collection_meta(&self.dir, meta) {
            warn!("Saved collection but failed to refresh its metadata: {}", e);
        }

        debug!(
            "Saved collection to {}: {} documents, {} vectors",
            self.dir.display(),
            documents.len(),
            raw.len()
        );
        Ok(())
    }

    /// Dump the hora graph to a temp file, then rename it into place.
    fn save_graph(&self, graph: &mut GraphIndex) -> DbResult<()> {
        let path = self.graph_path();
        let tmp_path = self.dir.join(format!(".{}.tmp", GRAPH_FILENAME));
        let tmp_str = tmp_path
            .to_str()
            .ok_or_else(|| DbError::persistence(&tmp_path, "path is not valid UTF-8"))?;

        graph
            .hnsw_mut()
            .dump(tmp_str)
            .map_err(|e| DbError::persistence(&tmp_path, format!("Failed to dump graph: {}", e)))?;
        fs::rename(&tmp_path, &path)
            .map_err(|e| DbError::persistence(&path, format!("Failed to replace file: {}", e)))
    }

    /// Load `metadata.json`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Persistence`] if the file cannot be read or parsed,
    /// if its two maps are not inverses, or if a document disagrees with the
    /// maps about its position.
    pub fn load_metadata(&self) -> DbResult<Option<LoadedMetadata>> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| DbError::persistence(&path, format!("Failed to read metadata: {}", e)))?;
        let file: MetadataFile<'static> = serde_json::from_str(&content)
            .map_err(|e| DbError::persistence(&path, format!("Failed to parse metadata: {}", e)))?;
        let documents = file.documents.into_owned();

        let ids = IdPositionMap::from_parts(
            file.id_to_position.into_owned(),
            file.position_to_id.into_owned(),
        )
        .map_err(|e| DbError::persistence(&path, format!("Inconsistent id maps: {}", e)))?;

        if ids.len() != documents.len() {
            return Err(DbError::persistence(
                &path,
                format!("{} documents but {} mapped ids", documents.len(), ids.len()),
            ));
        }
        for (id, doc) in &documents {
            if ids.position_of(id) != Some(doc.position) {
                return Err(DbError::persistence(
                    &path,
                    format!("document '{}' disagrees with the id map about its position", id),
                ));
            }
        }

        Ok(Some(LoadedMetadata { documents, ids }))
    }

    /// Load the raw index for `family`, or `None` if `vectors.index` does not
    /// exist. A missing graph file is rebuilt from the stored vectors.
    pub fn load_index(&self, family: IndexFamily) -> DbResult<Option<RawIndex>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(&path)
            .map_err(|e| DbError::persistence(&path, format!("Failed to open index: {}", e)))?;
        let mut reader = BufReader::new(file);
        let vectors: FlatIndex = bincode::decode_from_std_read(&mut reader, config::standard())
            .map_err(|e| DbError::persistence(&path, format!("Failed to deserialize index: {}", e)))?;
        debug!("Loaded raw index from {}: {} vectors", path.display(), vectors.len());

        if family != IndexFamily::GraphApprox {
            return Ok(Some(RawIndex::Flat(vectors)));
        }

        let graph_path = self.graph_path();
        if !graph_path.exists() {
            warn!("Graph file missing, rebuilding it from {} vectors", vectors.len());
            return Ok(Some(RawIndex::Graph(GraphIndex::rebuild_from(vectors)?)));
        }
        let graph_str = graph_path
            .to_str()
            .ok_or_else(|| DbError::persistence(&graph_path, "path is not valid UTF-8"))?;
        let hnsw = HNSWIndex::<f32, usize>::load(graph_str).map_err(|e| {
            DbError::persistence(&graph_path, format!("Failed to load graph: {}", e))
        })?;
        Ok(Some(RawIndex::Graph(GraphIndex::from_parts(vectors, hnsw))))
    }

    /// Delete the index files, if any.
    pub fn remove_index(&self) -> DbResult<()> {
        for path in [self.index_path(), self.graph_path()] {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    DbError::persistence(&path, format!("Failed to remove index: {}", e))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::config::{BackendKind, CollectionConfig, IndexFamily, VectorMetric};
    use tempfile::TempDir;

    fn sample() -> (RawIndex, BTreeMap<String, StoredDocument>, IdPositionMap) {
        let mut raw = RawIndex::new(IndexFamily::FlatIp, VectorMetric::Cosine, 2);
        raw.add(vec![vec![1.0, 0.0]]).unwrap();
        let documents = BTreeMap::from([(
            "a".to_string(),
            StoredDocument {
                content: "alpha".to_string(),
                metadata: Metadata::new(),
                position: 0,
            },
        )]);
        let mut ids = IdPositionMap::new();
        ids.insert("a", 0).unwrap();
        (raw, documents, ids)
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let files = CollectionFiles::new(dir.path());
        let meta = CollectionMeta::new(
            &CollectionConfig::new(dir.path(), "c", 2),
            BackendKind::SelfManaged,
        );
        let (mut raw, documents, ids) = sample();

        files.save(&mut raw, &documents, &ids, &meta).unwrap();

        let loaded = files.load_metadata().unwrap().unwrap();
        assert_eq!(loaded.documents, documents);
        assert_eq!(loaded.ids, ids);
        assert_eq!(
            files.load_index(IndexFamily::FlatIp).unwrap().unwrap().len(),
            1
        );
        assert!(!files.graph_path().exists());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(files.metadata_path()).unwrap()).unwrap();
        assert_eq!(json["documents"]["a"]["position"], 0);
        assert_eq!(json["position_to_id"]["0"], "a");
    }

    #[test]
    fn test_missing_files() {
        let dir = TempDir::new().unwrap();
        let files = CollectionFiles::new(dir.path());
        assert!(files.load_metadata().unwrap().is_none());
        assert!(files.load_index(IndexFamily::FlatIp).unwrap().is_none());
        assert!(files.remove_index().is_ok());
    }

    #[test]
    fn test_rejects_broken_bijection() {
        let dir = TempDir::new().unwrap();
        let files = CollectionFiles::new(dir.path());
        fs::write(
            files.metadata_path(),
            r#"{"documents":{"a":{"content":"x","metadata":{},"position":0}},
                "id_to_position":{"a":0},
                "position_to_id":{"0":"b"}}"#,
        )
        .unwrap();
        assert!(matches!(
            files.load_metadata(),
            Err(DbError::Persistence { .. })
        ));
    }

    #[test]
    fn test_rejects_garbage_index() {
        let dir = TempDir::new().unwrap();
        let files = CollectionFiles::new(dir.path());
        fs::write(files.index_path(), [0xffu8; 3]).unwrap();
        assert!(matches!(
            files.load_index(IndexFamily::FlatIp),
            Err(DbError::Persistence { .. })
        ));
    }

    #[test]
    fn test_graph_dump_and_load() {
        let dir = TempDir::new().unwrap();
        let files = CollectionFiles::new(dir.path());
        let meta = CollectionMeta::new(
            &CollectionConfig::new(dir.path(), "c", 3),
            BackendKind::SelfManaged,
        );
        let mut raw = RawIndex::new(IndexFamily::GraphApprox, VectorMetric::L2, 3);
        raw.add(vec![vec![0.0, 0.0, 1.0], vec![5.0, 5.0, 5.0], vec![0.0, 1.0, 0.0]])
            .unwrap();

        files
            .save(&mut raw, &BTreeMap::new(), &IdPositionMap::new(), &meta)
            .unwrap();
        assert!(files.graph_path().exists());

        let loaded = files.load_index(IndexFamily::GraphApprox).unwrap().unwrap();
        assert!(matches!(loaded, RawIndex::Graph(_)));
        assert_eq!(loaded.len(), 3);
        assert_eq!(
            loaded.search(&[0.0, 0.9, 0.0], 3),
            raw.search(&[0.0, 0.9, 0.0], 3)
        );

        fs::remove_file(files.graph_path()).unwrap();
        let rebuilt = files.load_index(IndexFamily::GraphApprox).unwrap().unwrap();
        assert_eq!(rebuilt.search(&[0.0, 0.9, 0.0], 1)[0].0, 2);

        files.remove_index().unwrap();
        assert!(!files.index_path().exists());
    }

    #[test]
    fn test_meta_refresh_failure_still_commits() {
        let dir = TempDir::new().unwrap();
        let files = CollectionFiles::new(dir.path());
        let meta = CollectionMeta::new(
            &CollectionConfig::new(dir.path(), "c", 2),
            BackendKind::SelfManaged,
        );
        fs::create_dir(dir.path().join(".index.meta.json.tmp")).unwrap();
        let (mut raw, documents, ids) = sample();

        files.save(&mut raw, &documents, &ids, &meta).unwrap();
        assert_eq!(files.load_metadata().unwrap().unwrap().documents.len(), 1);
    }

    #[test]
    fn test_failed_commit_keeps_previous_metadata() {
        let dir = TempDir::new().unwrap();
        let files = CollectionFiles::new(dir.path());
        let meta = CollectionMeta::new(
            &CollectionConfig::new(dir.path(), "c", 2),
            BackendKind::SelfManaged,
        );
        let mut empty = RawIndex::new(IndexFamily::FlatIp, VectorMetric::Cosine, 2);
        files
            .save(&mut empty, &BTreeMap::new(), &IdPositionMap::new(), &meta)
            .unwrap();

        fs::create_dir(dir.path().join(".metadata.json.tmp")).unwrap();
        let (mut raw, documents, ids) = sample();
        let result = files.save(&mut raw, &documents, &ids, &meta);

        assert!(matches!(result, Err(DbError::Persistence { .. })));
        assert!(files.load_metadata().unwrap().unwrap().documents.is_empty());
    }
}
