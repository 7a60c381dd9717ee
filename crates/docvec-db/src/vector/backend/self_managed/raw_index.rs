//! Raw vector indexes addressed by dense positions.
//!
//! A raw index only knows positions `0..len`. It has no notion of document
//! ids and supports no deletion; removing a vector means building a new index.
//! Appends can be undone with [`RawIndex::truncate`], which is how a failed
//! save rolls back.

use std::fmt;

use bincode::{Decode, Encode};
use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;

use crate::error::{DbError, DbResult};
use crate::vector::config::{IndexFamily, VectorMetric};
use crate::vector::scoring::{dot_product, euclidean_distance, normalize};

// ============================================================================
// Distance
// ============================================================================

/// How a raw index compares vectors. Lower is always closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Distance {
    /// `1 - <a, b>` over unit vectors.
    InnerProduct,
    /// Euclidean distance over raw vectors.
    Euclidean,
}

impl Distance {
    pub fn for_metric(metric: VectorMetric) -> Self {
        match metric {
            VectorMetric::Cosine => Distance::InnerProduct,
            VectorMetric::L2 => Distance::Euclidean,
        }
    }

    /// Bring a vector into the form this distance expects.
    pub fn prepare(&self, vector: &mut [f32]) {
        if *self == Distance::InnerProduct {
            normalize(vector);
        }
    }

    #[inline]
    pub fn between(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::InnerProduct => 1.0 - dot_product(a, b),
            Distance::Euclidean => euclidean_distance(a, b),
        }
    }
}

// ============================================================================
// FlatIndex
// ============================================================================

/// Exact index: stores every vector and scans them all on search.
#[derive(Debug, Clone, Encode, Decode)]
pub struct FlatIndex {
    dimension: usize,
    distance: Distance,
    /// Row-major vector data, `len * dimension` floats.
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize, distance: Distance) -> Self {
        Self {
            dimension,
            distance,
            data: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }

    fn row(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append one vector, returning it in prepared form.
    fn push(&mut self, mut vector: Vec<f32>) -> Vec<f32> {
        self.distance.prepare(&mut vector);
        self.data.extend_from_slice(&vector);
        vector
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        let mut hits: Vec<(u64, f32)> = self
            .rows()
            .enumerate()
            .map(|(pos, row)| (pos as u64, self.distance.between(query, row)))
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

// ============================================================================
// GraphIndex
// ============================================================================

/// Approximate index: a hora HNSW graph whose node ids are raw positions.
///
/// The prepared vectors are also kept in a [`FlatIndex`] so candidates are
/// rescored exactly and the graph can be rebuilt without re-embedding.
pub struct GraphIndex {
    vectors: FlatIndex,
    hnsw: HNSWIndex<f32, usize>,
}

impl fmt::Debug for GraphIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphIndex")
            .field("dimension", &self.vectors.dimension)
            .field("distance", &self.vectors.distance)
            .field("len", &self.vectors.len())
            .finish()
    }
}

impl GraphIndex {
    pub fn new(dimension: usize, distance: Distance) -> Self {
        Self {
            vectors: FlatIndex::new(dimension, distance),
            hnsw: empty_hnsw(dimension),
        }
    }

    /// Pair stored vectors with a graph loaded from disk.
    pub fn from_parts(vectors: FlatIndex, hnsw: HNSWIndex<f32, usize>) -> Self {
        Self { vectors, hnsw }
    }

    /// Build the graph over already prepared vectors.
    pub fn rebuild_from(vectors: FlatIndex) -> DbResult<Self> {
        let mut hnsw = empty_hnsw(vectors.dimension);
        for (position, row) in vectors.rows().enumerate() {
            hnsw.add(row, position).map_err(graph_error)?;
        }
        if vectors.len() > 0 {
            hnsw.build(Metric::Euclidean).map_err(graph_error)?;
        }
        Ok(Self { vectors, hnsw })
    }

    /// The hora index, for its own serializer.
    pub fn hnsw_mut(&mut self) -> &mut HNSWIndex<f32, usize> {
        &mut self.hnsw
    }

    fn add(&mut self, vectors: Vec<Vec<f32>>) -> DbResult<()> {
        for vector in vectors {
            let position = self.vectors.len();
            let prepared = self.vectors.push(vector);
            self.hnsw.add(&prepared, position).map_err(graph_error)?;
        }
        // Euclidean order over unit vectors matches inner-product order.
        self.hnsw.build(Metric::Euclidean).map_err(graph_error)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        let mut hits: Vec<(u64, f32)> = self
            .hnsw
            .search(query, k)
            .into_iter()
            .filter_map(|position| {
                let row = self.vectors.row(position)?;
                Some((position as u64, self.vectors.distance.between(query, row)))
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

fn empty_hnsw(dimension: usize) -> HNSWIndex<f32, usize> {
    HNSWIndex::new(dimension, &HNSWParams::<f32>::default())
}

fn graph_error(e: &'static str) -> DbError {
    DbError::internal(format!("graph index: {}", e))
}

// ============================================================================
// RawIndex
// ============================================================================

/// The raw index of a self-managed collection, one variant per index family.
#[derive(Debug)]
pub enum RawIndex {
    Flat(FlatIndex),
    Graph(GraphIndex),
}

impl RawIndex {
    /// Create an empty index for a collection.
    pub fn new(family: IndexFamily, metric: VectorMetric, dimension: usize) -> Self {
        let distance = Distance::for_metric(metric);
        match family {
            IndexFamily::FlatIp | IndexFamily::FlatL2 => {
                RawIndex::Flat(FlatIndex::new(dimension, distance))
            }
            IndexFamily::GraphApprox => RawIndex::Graph(GraphIndex::new(dimension, distance)),
        }
    }

    /// Stored vectors, shared by both families.
    pub fn vectors(&self) -> &FlatIndex {
        match self {
            RawIndex::Flat(flat) => flat,
            RawIndex::Graph(graph) => &graph.vectors,
        }
    }

    /// Whether this index was built for the given family and metric.
    pub fn matches(&self, family: IndexFamily, metric: VectorMetric, dimension: usize) -> bool {
        let vectors = self.vectors();
        matches!(self, RawIndex::Graph(_)) == (family == IndexFamily::GraphApprox)
            && vectors.distance == Distance::for_metric(metric)
            && vectors.dimension == dimension
    }

    pub fn len(&self) -> usize {
        self.vectors().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors. They receive positions `len..len + vectors.len()`.
    pub fn add(&mut self, vectors: Vec<Vec<f32>>) -> DbResult<()> {
        match self {
            RawIndex::Flat(flat) => {
                for vector in vectors {
                    flat.push(vector);
                }
                Ok(())
            }
            RawIndex::Graph(graph) => graph.add(vectors),
        }
    }

    /// Drop every position at or past `len`. The graph is rebuilt from the
    /// vectors that remain.
    pub fn truncate(&mut self, len: usize) -> DbResult<()> {
        if len >= self.len() {
            return Ok(());
        }
        match self {
            RawIndex::Flat(flat) => flat.truncate(len),
            RawIndex::Graph(graph) => {
                let mut vectors = graph.vectors.clone();
                vectors.truncate(len);
                *graph = GraphIndex::rebuild_from(vectors)?;
            }
        }
        Ok(())
    }

    /// Up to `k` nearest positions with their distances, closest first.
    /// Equal distances are ordered by position.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut query = query.to_vec();
        self.vectors().distance.prepare(&mut query);

        match self {
            RawIndex::Flat(flat) => flat.search(&query, k),
            RawIndex::Graph(graph) => graph.search(&query, k),
        }
    }
}

/// Sort `(position, distance)` pairs closest first, then by position.
pub(crate) fn sort_hits(hits: &mut [(u64, f32)]) {
    hits.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}
