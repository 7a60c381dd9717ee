//! Integration tests for the self-managed backend.
//!
//! Every test runs against a real collection directory in a `TempDir` and a
//! keyword embedder whose vectors are known in advance.

#![cfg(feature = "self-managed")]

mod common;

use std::fs;
use std::sync::Arc;
use std::thread;

use docvec_db::vector::{GRAPH_FILENAME, INDEX_FILENAME, INDEX_META_FILENAME, METADATA_FILENAME};
use docvec_db::{
    open_backend, BackendKind, DbError, Document, DocumentIndex, IndexBackend, IndexFamily,
    MetadataFilter, VectorMetric,
};
use tempfile::TempDir;

use common::{config, embedder, greek_documents, open, tagged_documents, KeywordEmbedder};

fn assert_bijection(index: &IndexBackend) {
    let map = index
        .as_self_managed()
        .expect("self-managed backend")
        .id_map()
        .expect("id map");
    map.check_invariants().expect("bijection holds");

    let total = index.collection_stats().unwrap().total_documents;
    assert_eq!(map.id_to_position().len(), total);
    assert_eq!(map.position_to_id().len(), total);
    for (id, position) in map.id_to_position() {
        assert_eq!(map.position_to_id().get(position), Some(id));
    }
    // Positions are dense after every mutation.
    let positions: Vec<u64> = map.position_to_id().keys().copied().collect();
    assert_eq!(positions, (0..total as u64).collect::<Vec<_>>());
}

fn ids(results: &[docvec_db::SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.id.as_str()).collect()
}

// ============================================================================
// Core properties
// ============================================================================

#[test]
fn test_round_trip_ranks_inserted_document_first() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();

    let results = index.search("gamma", 3, None).unwrap();
    assert_eq!(results[0].id, "g");
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!(results[1..].iter().all(|r| r.score < results[0].score));
    assert_eq!(results[0].document_title, "Third");
    assert_eq!(results[0].chunk_index, 2);
}

#[test]
fn test_two_axis_scenario() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index
        .add_documents(&[Document::new("a", "alpha"), Document::new("b", "beta")])
        .unwrap();

    let results = index
        .search_by_embedding(&[1.0, 0.0, 0.0, 0.0], 2, None)
        .unwrap();
    assert_eq!(ids(&results), vec!["a", "b"]);
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!(results[1].score.abs() < 1e-5);
}

#[test]
fn test_bijection_after_every_mutation() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    assert_bijection(&index);

    index.add_documents(&greek_documents()).unwrap();
    assert_bijection(&index);

    index
        .add_documents(&[Document::new("d", "delta"), Document::new("e", "alpha beta")])
        .unwrap();
    assert_bijection(&index);

    assert!(index.delete_document("b").unwrap());
    assert_bijection(&index);

    assert!(index.delete_document("a").unwrap());
    assert_bijection(&index);

    index.add_documents(&[Document::new("b", "beta")]).unwrap();
    assert_bijection(&index);

    index.clear_collection().unwrap();
    assert_bijection(&index);
}

#[test]
fn test_delete_removes_from_results() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();

    assert!(index.delete_document("a").unwrap());
    assert_eq!(index.len().unwrap(), 2);

    let results = index.search("alpha", 3, None).unwrap();
    assert!(!ids(&results).contains(&"a"));
    assert_eq!(results.len(), 2);
}

#[test]
fn test_delete_unknown_changes_nothing() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();
    let before = index.as_self_managed().unwrap().id_map().unwrap();

    assert!(!index.delete_document("missing").unwrap());
    assert_eq!(index.len().unwrap(), 3);
    assert_eq!(index.as_self_managed().unwrap().id_map().unwrap(), before);
}

#[test]
fn test_delete_rebuilds_by_re_embedding() {
    let temp = TempDir::new().expect("create temp dir");
    let model = Arc::new(KeywordEmbedder::new(4));
    let index = open_backend(&config(temp.path(), BackendKind::SelfManaged), model.clone()).unwrap();
    index.add_documents(&greek_documents()).unwrap();
    assert_eq!(model.calls(), 3);

    index.delete_document("b").unwrap();
    assert_eq!(model.calls(), 5);

    // Deleting the remaining documents leaves a fresh empty index.
    index.delete_document("a").unwrap();
    index.delete_document("g").unwrap();
    assert_eq!(model.calls(), 6);
    assert!(index.is_empty().unwrap());
    assert!(index.search("alpha", 1, None).unwrap().is_empty());
}

#[test]
fn test_clear_is_idempotent() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();

    index.clear_collection().unwrap();
    assert_eq!(index.collection_stats().unwrap().total_documents, 0);
    index.clear_collection().unwrap();
    assert_eq!(index.collection_stats().unwrap().total_documents, 0);

    // The collection is usable after a clear.
    index.add_documents(&[Document::new("a", "alpha")]).unwrap();
    assert_eq!(index.len().unwrap(), 1);
}

#[test]
fn test_filter_skips_non_matching_candidates() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&tagged_documents()).unwrap();

    let filter = MetadataFilter::new().with_eq("tag", "x");
    let results = index.search("alpha", 3, Some(&filter)).unwrap();

    assert_eq!(ids(&results), vec!["A", "C"]);
    assert!(results[0].score > results[1].score);
    assert!((results[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
}

#[test]
fn test_filter_widens_until_enough_hits() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));

    let mut docs: Vec<Document> = (0..10)
        .map(|i| Document::new(format!("near-{}", i), "alpha").with_meta("tag", "y"))
        .collect();
    docs.push(Document::new("far", "beta").with_meta("tag", "x"));
    index.add_documents(&docs).unwrap();

    let filter = MetadataFilter::new().with_eq("tag", "x");
    let results = index.search("alpha", 1, Some(&filter)).unwrap();
    assert_eq!(ids(&results), vec!["far"]);

    let filter = MetadataFilter::new().with_eq("tag", "z");
    assert!(index.search("alpha", 5, Some(&filter)).unwrap().is_empty());
}

#[test]
fn test_ties_ranked_by_insertion_order() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index
        .add_documents(&[Document::new("z", "alpha"), Document::new("a", "alpha")])
        .unwrap();
    index.add_documents(&[Document::new("m", "alpha")]).unwrap();

    let results = index.search("alpha", 3, None).unwrap();
    assert_eq!(ids(&results), vec!["z", "a", "m"]);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_persistence_survives_reopen() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);

    let top_before = {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        index.search("beta", 1, None).unwrap()
    };

    let index = open(&config);
    assert_eq!(index.collection_stats().unwrap().total_documents, 3);
    let top_after = index.search("beta", 1, None).unwrap();
    assert_eq!(top_after, top_before);
    assert_bijection(&index);
}

#[test]
fn test_collection_layout_on_disk() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();

    let dir = temp.path().join("docs").join("self_managed");
    assert_eq!(index.as_self_managed().unwrap().storage_dir(), dir);
    assert!(dir.join(INDEX_FILENAME).exists());
    assert!(dir.join(INDEX_META_FILENAME).exists());

    let metadata: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join(METADATA_FILENAME)).unwrap()).unwrap();
    assert_eq!(metadata["documents"]["b"]["content"], "beta");
    assert_eq!(metadata["documents"]["b"]["position"], 1);
    assert_eq!(metadata["id_to_position"]["g"], 2);
    assert_eq!(metadata["position_to_id"]["0"], "a");

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join(INDEX_META_FILENAME)).unwrap()).unwrap();
    assert_eq!(meta["count"], 3);
}

#[test]
fn test_missing_index_is_rebuilt_on_open() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    let dir = {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        index.as_self_managed().unwrap().storage_dir().to_path_buf()
    };
    fs::remove_file(dir.join(INDEX_FILENAME)).unwrap();

    let model = Arc::new(KeywordEmbedder::new(4));
    let index = open_backend(&config, model.clone()).unwrap();
    assert_eq!(model.calls(), 3);
    assert!(dir.join(INDEX_FILENAME).exists());
    assert_eq!(index.search("gamma", 1, None).unwrap()[0].id, "g");
    assert_bijection(&index);
}

#[test]
fn test_garbage_index_is_rebuilt_on_open() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    let dir = {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        index.as_self_managed().unwrap().storage_dir().to_path_buf()
    };
    fs::write(dir.join(INDEX_FILENAME), b"not an index").unwrap();

    let index = open(&config);
    assert_eq!(index.len().unwrap(), 3);
    assert_eq!(index.search("alpha", 1, None).unwrap()[0].id, "a");
}

#[test]
fn test_index_ahead_of_metadata_is_rebuilt_on_open() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    let dir = {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        let dir = index.as_self_managed().unwrap().storage_dir().to_path_buf();
        let committed = fs::read(dir.join(METADATA_FILENAME)).unwrap();

        // Leave vectors.index one batch ahead, as a crash before the
        // metadata rename would.
        index
            .add_documents(&[Document::new("d", "delta")])
            .unwrap();
        fs::write(dir.join(METADATA_FILENAME), committed).unwrap();
        dir
    };

    let model = Arc::new(KeywordEmbedder::new(4));
    let index = open_backend(&config, model.clone()).unwrap();
    assert_eq!(model.calls(), 3);
    assert_eq!(index.collection_stats().unwrap().total_documents, 3);
    assert_eq!(index.search("delta", 10, None).unwrap().len(), 3);
    assert!(index.search("delta", 1, None).unwrap()[0].id != "d");
    assert_bijection(&index);

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join(INDEX_META_FILENAME)).unwrap()).unwrap();
    assert_eq!(meta["count"], 3);
}

#[test]
fn test_graph_index_ahead_of_metadata_is_rebuilt_on_open() {
    let temp = TempDir::new().expect("create temp dir");
    let config =
        config(temp.path(), BackendKind::SelfManaged).with_index_family(IndexFamily::GraphApprox);
    {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        let dir = index.as_self_managed().unwrap().storage_dir().to_path_buf();
        assert!(dir.join(GRAPH_FILENAME).exists());
        let committed = fs::read(dir.join(METADATA_FILENAME)).unwrap();
        index
            .add_documents(&[Document::new("d", "delta")])
            .unwrap();
        fs::write(dir.join(METADATA_FILENAME), committed).unwrap();
    }

    let index = open(&config);
    assert_eq!(index.len().unwrap(), 3);
    assert_eq!(index.search("gamma", 1, None).unwrap()[0].id, "g");
    index
        .add_documents(&[Document::new("d", "delta")])
        .unwrap();
    assert_eq!(index.search("delta", 1, None).unwrap()[0].id, "d");
    assert_bijection(&index);
}

#[test]
fn test_meta_refresh_failure_keeps_committed_add() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        let dir = index.as_self_managed().unwrap().storage_dir().to_path_buf();
        fs::create_dir(dir.join(format!(".{}.tmp", INDEX_META_FILENAME))).unwrap();

        index
            .add_documents(&[Document::new("d", "delta")])
            .unwrap();
        assert_eq!(index.len().unwrap(), 4);
        assert_eq!(index.search("delta", 1, None).unwrap()[0].id, "d");
    }

    let index = open(&config);
    assert_eq!(index.len().unwrap(), 4);
    assert_eq!(index.search("delta", 1, None).unwrap()[0].id, "d");
    assert_bijection(&index);
}

#[test]
fn test_failed_save_leaves_state_unchanged() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    let index = open(&config);
    index.add_documents(&greek_documents()).unwrap();
    let dir = index.as_self_managed().unwrap().storage_dir().to_path_buf();
    let blocker = dir.join(format!(".{}.tmp", METADATA_FILENAME));
    fs::create_dir(&blocker).unwrap();

    let result = index.add_documents(&[Document::new("d", "delta")]);
    assert!(matches!(result, Err(DbError::Persistence { .. })));
    assert_eq!(index.len().unwrap(), 3);
    assert!(index
        .search("delta", 10, None)
        .unwrap()
        .iter()
        .all(|r| r.id != "d"));
    assert_bijection(&index);

    fs::remove_dir(&blocker).unwrap();
    index
        .add_documents(&[Document::new("d", "delta")])
        .unwrap();
    assert_eq!(index.len().unwrap(), 4);
    assert_bijection(&index);
    drop(index);

    let index = open(&config);
    assert_eq!(index.len().unwrap(), 4);
    assert_eq!(index.search("delta", 1, None).unwrap()[0].id, "d");
}

#[test]
fn test_failed_delete_and_clear_leave_state_unchanged() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();
    let dir = index.as_self_managed().unwrap().storage_dir().to_path_buf();
    fs::create_dir(dir.join(format!(".{}.tmp", METADATA_FILENAME))).unwrap();

    assert!(matches!(
        index.delete_document("b"),
        Err(DbError::Persistence { .. })
    ));
    assert!(matches!(
        index.clear_collection(),
        Err(DbError::Persistence { .. })
    ));
    assert_eq!(index.len().unwrap(), 3);
    assert_eq!(index.search("beta", 1, None).unwrap()[0].id, "b");
    assert_bijection(&index);
}

#[test]
fn test_orphan_index_is_discarded() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    let dir = {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        index.as_self_managed().unwrap().storage_dir().to_path_buf()
    };
    fs::remove_file(dir.join(METADATA_FILENAME)).unwrap();

    let index = open(&config);
    assert!(index.is_empty().unwrap());
    assert!(!dir.join(INDEX_FILENAME).exists());
}

#[test]
fn test_corrupted_metadata_is_a_persistence_error() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    let dir = {
        let index = open(&config);
        index.add_documents(&greek_documents()).unwrap();
        index.as_self_managed().unwrap().storage_dir().to_path_buf()
    };
    fs::write(dir.join(METADATA_FILENAME), "{ not json").unwrap();

    let err = open_backend(&config, embedder()).unwrap_err();
    assert!(matches!(err, DbError::Persistence { .. }), "got {:?}", err);
}

#[test]
fn test_reopen_with_other_dimension_is_a_configuration_error() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    open(&config).add_documents(&greek_documents()).unwrap();

    let mut wider = config.clone();
    wider.dimension = 8;
    let err = open_backend(&wider, Arc::new(KeywordEmbedder::new(8))).unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }), "got {:?}", err);
}

#[test]
fn test_reopen_with_other_family_is_a_configuration_error() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged);
    open(&config).add_documents(&greek_documents()).unwrap();

    let graph = config.clone().with_index_family(IndexFamily::GraphApprox);
    let err = open_backend(&graph, embedder()).unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }), "got {:?}", err);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_duplicate_ids_insert_nothing() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();

    let err = index
        .add_documents(&[Document::new("new", "delta"), Document::new("a", "alpha")])
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateDocument { ref id } if id == "a"));

    let err = index
        .add_documents(&[Document::new("x", "delta"), Document::new("x", "delta")])
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateDocument { .. }));

    assert_eq!(index.len().unwrap(), 3);
    assert!(!index.as_self_managed().unwrap().id_map().unwrap().contains_id("new"));
}

#[test]
fn test_wrong_vector_length_inserts_nothing() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open_backend(
        &config(temp.path(), BackendKind::SelfManaged),
        Arc::new(KeywordEmbedder::truncating(4)),
    )
    .unwrap();

    let err = index.add_documents(&greek_documents()).unwrap_err();
    assert!(matches!(
        err,
        DbError::DimensionMismatch {
            expected: 4,
            actual: 3
        }
    ));
    assert!(index.is_empty().unwrap());
}

#[test]
fn test_query_embedding_length_is_checked() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    let err = index.search_by_embedding(&[1.0, 0.0], 1, None).unwrap_err();
    assert!(matches!(err, DbError::DimensionMismatch { .. }));
}

#[test]
fn test_empty_batch_and_empty_id() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));

    index.add_documents(&[]).unwrap();
    let err = index.add_documents(&[Document::new("", "alpha")]).unwrap_err();
    assert!(matches!(err, DbError::InvalidDocument { .. }));
    assert!(index.is_empty().unwrap());
}

#[test]
fn test_zero_top_k_is_rejected() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();

    let err = index.search("alpha", 0, None).unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }));
}

#[test]
fn test_provider_dimension_must_match() {
    let temp = TempDir::new().expect("create temp dir");
    let err = open_backend(
        &config(temp.path(), BackendKind::SelfManaged),
        Arc::new(KeywordEmbedder::new(6)),
    )
    .unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }));
}

// ============================================================================
// Index families and metrics
// ============================================================================

#[test]
fn test_l2_scores() {
    let temp = TempDir::new().expect("create temp dir");
    let config = config(temp.path(), BackendKind::SelfManaged)
        .with_index_family(IndexFamily::FlatL2)
        .with_metric(VectorMetric::L2);
    let index = open(&config);
    index
        .add_documents(&[Document::new("a", "alpha"), Document::new("b", "beta")])
        .unwrap();

    let results = index.search("alpha", 2, None).unwrap();
    assert_eq!(ids(&results), vec!["a", "b"]);
    assert!((results[0].score - 1.0).abs() < 1e-5);
    let expected = 1.0 / (1.0 + std::f32::consts::SQRT_2);
    assert!((results[1].score - expected).abs() < 1e-5);
}

#[test]
fn test_graph_family_finds_exact_match() {
    let temp = TempDir::new().expect("create temp dir");
    let config =
        config(temp.path(), BackendKind::SelfManaged).with_index_family(IndexFamily::GraphApprox);
    let index = open(&config);

    let words = ["alpha", "beta", "gamma", "delta"];
    let docs: Vec<Document> = (0..40)
        .map(|i| {
            let content = format!("{} {}", words[i % 4], words[(i / 4) % 4]);
            Document::new(format!("doc-{}", i), content)
        })
        .collect();
    index.add_documents(&docs).unwrap();

    let results = index.search("delta delta", 5, None).unwrap();
    assert_eq!(results.len(), 5);
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    index.delete_document(&results[0].id).unwrap();
    assert_eq!(index.len().unwrap(), 39);
    assert_bijection(&index);
}

#[test]
fn test_stats_report_collection_shape() {
    let temp = TempDir::new().expect("create temp dir");
    let index = open(&config(temp.path(), BackendKind::SelfManaged));
    index.add_documents(&greek_documents()).unwrap();

    let stats = index.collection_stats().unwrap();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.backend_kind, BackendKind::SelfManaged);
    assert_eq!(stats.dimension, 4);
    assert_eq!(stats.embedding_model_id, "test/keywords");
    assert_eq!(stats.collection_name, "docs");
    assert_eq!(index.kind(), BackendKind::SelfManaged);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_searches_during_writes() {
    let temp = TempDir::new().expect("create temp dir");
    let index = Arc::new(open(&config(temp.path(), BackendKind::SelfManaged)));
    index.add_documents(&greek_documents()).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for _ in 0..20 {
                    let results = index.search("alpha", 2, None).unwrap();
                    assert_eq!(results[0].id, "a");
                }
            })
        })
        .collect();

    for i in 0..10 {
        index
            .add_documents(&[Document::new(format!("extra-{}", i), "delta")])
            .unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(index.len().unwrap(), 13);
    assert_bijection(&index);
}
