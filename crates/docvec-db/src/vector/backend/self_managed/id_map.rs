//! Bidirectional mapping between document ids and raw index positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Document id <-> raw position bijection.
///
/// Both directions are kept as ordered maps so the persisted form is stable
/// and position order is cheap to iterate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPositionMap {
    id_to_position: BTreeMap<String, u64>,
    position_to_id: BTreeMap<u64, String>,
}

impl IdPositionMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a map from its two persisted halves, checking they agree.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Internal`] describing the first inconsistency.
    pub fn from_parts(
        id_to_position: BTreeMap<String, u64>,
        position_to_id: BTreeMap<u64, String>,
    ) -> DbResult<Self> {
        let map = Self {
            id_to_position,
            position_to_id,
        };
        map.check_invariants()?;
        Ok(map)
    }

    /// Record `id` at `position`.
    ///
    /// # Errors
    ///
    /// Fails if either the id or the position is already mapped.
    pub fn insert(&mut self, id: impl Into<String>, position: u64) -> DbResult<()> {
        let id = id.into();
        if self.id_to_position.contains_key(&id) {
            return Err(DbError::DuplicateDocument { id });
        }
        if let Some(existing) = self.position_to_id.get(&position) {
            return Err(DbError::internal(format!(
                "position {} already holds '{}'",
                position, existing
            )));
        }
        self.position_to_id.insert(position, id.clone());
        self.id_to_position.insert(id, position);
        Ok(())
    }

    /// Remove `id`, returning the position it held.
    pub fn remove_id(&mut self, id: &str) -> Option<u64> {
        let position = self.id_to_position.remove(id)?;
        self.position_to_id.remove(&position);
        Some(position)
    }

    pub fn position_of(&self, id: &str) -> Option<u64> {
        self.id_to_position.get(id).copied()
    }

    pub fn id_at(&self, position: u64) -> Option<&str> {
        self.position_to_id.get(&position).map(String::as_str)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.id_to_position.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.id_to_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_position.is_empty()
    }

    pub fn clear(&mut self) {
        self.id_to_position.clear();
        self.position_to_id.clear();
    }

    /// Iterate `(position, id)` pairs in ascending position order.
    pub fn iter_by_position(&self) -> impl Iterator<Item = (u64, &str)> {
        self.position_to_id.iter().map(|(p, id)| (*p, id.as_str()))
    }

    /// Next free position, one past the highest mapped position.
    pub fn next_position(&self) -> u64 {
        self.position_to_id
            .keys()
            .next_back()
            .map(|p| p + 1)
            .unwrap_or(0)
    }

    pub fn id_to_position(&self) -> &BTreeMap<String, u64> {
        &self.id_to_position
    }

    pub fn position_to_id(&self) -> &BTreeMap<u64, String> {
        &self.position_to_id
    }

    /// Verify both directions are exact inverses of the same size.
    pub fn check_invariants(&self) -> DbResult<()> {
        if self.id_to_position.len() != self.position_to_id.len() {
            return Err(DbError::internal(format!(
                "id map holds {} ids but {} positions",
                self.id_to_position.len(),
                self.position_to_id.len()
            )));
        }
        for (id, position) in &self.id_to_position {
            match self.position_to_id.get(position) {
                Some(back) if back == id => {}
                Some(back) => {
                    return Err(DbError::internal(format!(
                        "id '{}' maps to position {} which maps back to '{}'",
                        id, position, back
                    )))
                }
                None => {
                    return Err(DbError::internal(format!(
                        "id '{}' maps to unknown position {}",
                        id, position
                    )))
                }
            }
        }
        Ok(())
    }
}
