//! Document, filter and result types shared by every backend.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vector::{BackendKind, IndexFamily, VectorMetric};

/// Metadata key read into [`SearchResult::document_title`].
pub const TITLE_KEY: &str = "title";

/// Metadata key read into [`SearchResult::chunk_index`].
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

// ============================================================================
// MetadataValue
// ============================================================================

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Parse a value typed on the command line or in a filter expression.
    ///
    /// `true`/`false` become booleans, integers and floats are recognized,
    /// anything else is kept as text.
    pub fn parse_scalar(raw: &str) -> Self {
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        Self::Text(raw.to_string())
    }

    /// Borrow the value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered document metadata.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// Document
// ============================================================================

/// A text document with a caller-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique id within the collection.
    pub id: String,

    /// Text that gets embedded and returned by search.
    pub content: String,

    /// Scalar metadata used for filtering.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// Create a document without metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the metadata map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// MetadataFilter
// ============================================================================

/// Conjunction of `key = value` clauses evaluated against document metadata.
///
/// An empty filter matches every document. A clause on a key the document
/// does not carry never matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter {
    clauses: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    /// Create an empty filter (matches all).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn with_eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.clauses.insert(key.into(), value.into());
        self
    }

    /// Check if the filter is empty (matches all).
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate the filter against a metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.clauses
            .iter()
            .all(|(key, expected)| metadata.get(key).is_some_and(|v| values_equal(v, expected)))
    }
}

impl FromIterator<(String, MetadataValue)> for MetadataFilter {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Self {
            clauses: iter.into_iter().collect(),
        }
    }
}

// Int and Float compare numerically so `chunk_index=0` matches `0.0`.
fn values_equal(a: &MetadataValue, b: &MetadataValue) -> bool {
    match (a, b) {
        (MetadataValue::Int(x), MetadataValue::Float(y))
        | (MetadataValue::Float(y), MetadataValue::Int(x)) => (*x as f64) == *y,
        _ => a == b,
    }
}

// ============================================================================
// SearchResult
// ============================================================================

/// A single ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Document id.
    pub id: String,

    /// Stored document text.
    pub content: String,

    /// Stored document metadata.
    pub metadata: Metadata,

    /// Similarity score, higher is better.
    pub score: f32,

    /// Value of the `title` metadata key, or empty.
    pub document_title: String,

    /// Value of the `chunk_index` metadata key, or 0.
    pub chunk_index: i64,
}

impl SearchResult {
    /// Build a result, deriving title and chunk index from metadata.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
        score: f32,
    ) -> Self {
        let document_title = metadata
            .get(TITLE_KEY)
            .map(|v| v.to_string())
            .unwrap_or_default();
        let chunk_index = metadata
            .get(CHUNK_INDEX_KEY)
            .and_then(MetadataValue::as_i64)
            .unwrap_or(0);

        Self {
            id: id.into(),
            content: content.into(),
            metadata,
            score,
            document_title,
            chunk_index,
        }
    }
}

// ============================================================================
// CollectionStats
// ============================================================================

/// Statistics reported by `collection_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_documents: usize,
    pub backend_kind: BackendKind,
    pub dimension: usize,
    pub embedding_model_id: String,
    pub collection_name: String,
    pub index_family: IndexFamily,
    pub metric: VectorMetric,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar() {
        assert_eq!(MetadataValue::parse_scalar("true"), MetadataValue::Bool(true));
        assert_eq!(MetadataValue::parse_scalar("42"), MetadataValue::Int(42));
        assert_eq!(MetadataValue::parse_scalar("0.5"), MetadataValue::Float(0.5));
        assert_eq!(
            MetadataValue::parse_scalar("rust"),
            MetadataValue::Text("rust".to_string())
        );
        assert_eq!(
            MetadataValue::parse_scalar("NaN"),
            MetadataValue::Text("NaN".to_string())
        );
    }

    #[test]
    fn test_metadata_untagged_json() {
        let doc: Document = serde_json::from_str(
            r#"{"id":"a","content":"x","metadata":{"tag":"x","n":3,"w":0.5,"ok":true}}"#,
        )
        .unwrap();
        assert_eq!(doc.metadata["tag"], MetadataValue::Text("x".to_string()));
        assert_eq!(doc.metadata["n"], MetadataValue::Int(3));
        assert_eq!(doc.metadata["w"], MetadataValue::Float(0.5));
        assert_eq!(doc.metadata["ok"], MetadataValue::Bool(true));

        let without: Document = serde_json::from_str(r#"{"id":"b","content":"y"}"#).unwrap();
        assert!(without.metadata.is_empty());
    }

    #[test]
    fn test_filter_matching() {
        let meta = Document::new("a", "x")
            .with_meta("tag", "x")
            .with_meta("chunk_index", 2i64)
            .metadata;

        assert!(MetadataFilter::new().matches(&meta));
        assert!(MetadataFilter::new().with_eq("tag", "x").matches(&meta));
        assert!(!MetadataFilter::new().with_eq("tag", "y").matches(&meta));
        assert!(!MetadataFilter::new().with_eq("missing", "x").matches(&meta));
        assert!(MetadataFilter::new()
            .with_eq("tag", "x")
            .with_eq("chunk_index", 2.0)
            .matches(&meta));
        assert!(!MetadataFilter::new()
            .with_eq("tag", "x")
            .with_eq("chunk_index", 3i64)
            .matches(&meta));
    }

    #[test]
    fn test_search_result_derived_fields() {
        let meta = Document::new("a", "x")
            .with_meta("title", "ML Basics")
            .with_meta("chunk_index", 4i64)
            .metadata;
        let result = SearchResult::new("a", "x", meta, 0.9);
        assert_eq!(result.document_title, "ML Basics");
        assert_eq!(result.chunk_index, 4);

        let bare = SearchResult::new("b", "y", Metadata::new(), 0.1);
        assert_eq!(bare.document_title, "");
        assert_eq!(bare.chunk_index, 0);
    }
}
