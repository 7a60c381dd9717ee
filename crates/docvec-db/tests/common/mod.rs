//! Shared helpers for docvec-db integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use docvec_db::{
    open_backend, BackendKind, CollectionConfig, Document, IndexBackend, IndexFamily,
    VectorMetric,
};
use docvec_model::{EmbeddingModel, ModelInfo, ModelResult};

/// Words that map onto the first four axes.
const KEYWORDS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

/// Test embedder: each keyword occurrence adds 1.0 on its axis.
///
/// "alpha" embeds to `[1, 0, 0, 0]`, "alpha beta" to `[1, 1, 0, 0]`. Text with
/// no keyword embeds to the zero vector.
#[derive(Debug)]
pub struct KeywordEmbedder {
    info: ModelInfo,
    /// Number of texts embedded so far.
    calls: AtomicUsize,
    /// When set, every vector is one element short.
    truncate: bool,
}

impl KeywordEmbedder {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension >= KEYWORDS.len());
        Self {
            info: ModelInfo::new("test/keywords", dimension),
            calls: AtomicUsize::new(0),
            truncate: false,
        }
    }

    /// Embedder that reports `dimension` but returns shorter vectors.
    pub fn truncating(dimension: usize) -> Self {
        Self {
            truncate: true,
            ..Self::new(dimension)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingModel for KeywordEmbedder {
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.info.dimension];
                for word in text.split_whitespace() {
                    let word = word.to_lowercase();
                    if let Some(axis) = KEYWORDS.iter().position(|k| *k == word) {
                        vector[axis] += 1.0;
                    }
                }
                if self.truncate {
                    vector.pop();
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }
}

/// Config for a 4-dimensional cosine collection under `root`.
pub fn config(root: &Path, backend: BackendKind) -> CollectionConfig {
    CollectionConfig::new(root, "docs", 4)
        .with_backend(backend)
        .with_index_family(IndexFamily::FlatIp)
        .with_metric(VectorMetric::Cosine)
        .with_embedding_model_id("test/keywords")
}

pub fn embedder() -> Arc<KeywordEmbedder> {
    Arc::new(KeywordEmbedder::new(4))
}

/// Open a collection with a fresh keyword embedder.
pub fn open(config: &CollectionConfig) -> IndexBackend {
    open_backend(config, embedder()).expect("open backend")
}

/// The A/B/C documents: A and C tagged `x`, B tagged `y`.
pub fn tagged_documents() -> Vec<Document> {
    vec![
        Document::new("A", "alpha").with_meta("tag", "x"),
        Document::new("B", "alpha").with_meta("tag", "y"),
        Document::new("C", "alpha beta").with_meta("tag", "x"),
    ]
}

/// Alpha, beta and gamma documents with titles.
pub fn greek_documents() -> Vec<Document> {
    vec![
        Document::new("a", "alpha").with_meta("title", "First"),
        Document::new("b", "beta").with_meta("title", "Second"),
        Document::new("g", "gamma")
            .with_meta("title", "Third")
            .with_meta("chunk_index", 2i64),
    ]
}
