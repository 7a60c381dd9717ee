//! Shared helpers for docvec-core integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use docvec_core::{
    BackendKind, Document, EmbeddingModel, ModelInfo, VectorDatabaseManager, VectorDbConfig,
};
use docvec_model::ModelResult;

const KEYWORDS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

/// Maps each keyword occurrence onto one of four axes.
#[derive(Debug)]
pub struct KeywordEmbedder {
    info: ModelInfo,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            info: ModelInfo::new("test/keywords", 4),
        }
    }
}

impl EmbeddingModel for KeywordEmbedder {
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; 4];
                for word in text.split_whitespace() {
                    if let Some(axis) = KEYWORDS.iter().position(|k| *k == word) {
                        vector[axis] += 1.0;
                    }
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

pub fn config(root: &Path, backend: BackendKind) -> VectorDbConfig {
    VectorDbConfig::default()
        .with_storage_path(root)
        .with_collection_name("docs")
        .with_dimension(4)
        .with_embedding_model_id("test/keywords")
        .with_backend_kind(backend)
}

pub fn manager(root: &Path, backend: BackendKind) -> VectorDatabaseManager {
    VectorDatabaseManager::with_embedder(config(root, backend), Arc::new(KeywordEmbedder::new()))
        .expect("create manager")
}

pub fn documents() -> Vec<Document> {
    vec![
        Document::new("a", "alpha").with_meta("tag", "x"),
        Document::new("b", "beta").with_meta("tag", "y"),
        Document::new("c", "alpha gamma").with_meta("tag", "x"),
    ]
}
