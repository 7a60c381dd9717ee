//! Feature-hashing embedding model.
//!
//! Projects word unigrams and character trigrams into a fixed number of signed
//! buckets and L2-normalizes the result. The output only depends on the text,
//! the model ID and the dimension, so vectors are stable across processes and
//! a collection can be rebuilt from its stored text at any time.

use rayon::prelude::*;
use tracing::trace;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind, ModelInfo};
use crate::error::{ModelError, ModelResult};
use crate::EmbeddingModel;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Weight of a character trigram relative to a whole word.
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic embedding model based on the hashing trick.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingModel {
    info: ModelInfo,
    seed: u64,
}

impl HashingEmbeddingModel {
    /// Create a hashing model from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] if the dimension is zero.
    pub fn new(config: &EmbeddingConfig) -> ModelResult<Self> {
        if config.dimension == 0 {
            return Err(ModelError::invalid_config("dimension must be positive"));
        }

        let mut info = ModelInfo::new(config.model_id.clone(), config.dimension);
        info.provider = EmbeddingProviderKind::Hashing;

        Ok(Self {
            seed: fnv1a(FNV_OFFSET, config.model_id.as_bytes()),
            info,
        })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let dimension = self.info.dimension;
        let mut vector = vec![0.0f32; dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            self.accumulate(&mut vector, b"w:", word.as_bytes(), 1.0);

            let padded: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&mut vector, b"t:", trigram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }

        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], prefix: &[u8], feature: &[u8], weight: f32) {
        let hash = fnv1a(fnv1a(self.seed, prefix), feature);
        let bucket = (hash % vector.len() as u64) as usize;
        // Top bit picks the sign so collisions tend to cancel out.
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbeddingModel for HashingEmbeddingModel {
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
        trace!("Hashing {} texts into {} dims", texts.len(), self.info.dimension);
        Ok(texts.par_iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.info.dimension
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }
}

fn fnv1a(state: u64, bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(state, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME))
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
