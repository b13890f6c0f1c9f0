//! Per-group registry of bookies and their column positions.
//!
//! Positions are the authoritative order: in a registry of size N they
//! occupy `0..N` with no gaps. Payloads are stored per position so that
//! odds can be moved between columns without touching the names.

use std::collections::HashMap;

use crate::types::{Entity, EntitySnapshot, OddsPair, OddsheetError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRegistry {
    group_id: String,
    entities: HashMap<String, Entity>,
    /// Position-indexed; `None` means no odds for that column this cycle.
    payloads: Vec<Option<OddsPair>>,
    /// Position-indexed names, kept in step with `entities`.
    order: Vec<String>,
}

impl EntityRegistry {
    pub fn empty(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            entities: HashMap::new(),
            payloads: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Build a registry whose positions follow `names` left to right.
    ///
    /// Names must be non-empty and unique.
    pub fn from_ordered<I, S>(group_id: impl Into<String>, names: I) -> Result<Self, OddsheetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::empty(group_id);
        for name in names {
            registry.push(name.into(), None)?;
        }
        Ok(registry)
    }

    /// Rebuild a registry from stored rows.
    ///
    /// Rows may arrive in any order but their positions must be exactly
    /// `0..rows.len()`.
    pub fn from_snapshot(
        group_id: impl Into<String>,
        rows: &[EntitySnapshot],
    ) -> Result<Self, OddsheetError> {
        let mut sorted: Vec<&EntitySnapshot> = rows.iter().collect();
        sorted.sort_by_key(|r| r.position);

        let mut registry = Self::empty(group_id);
        for (expected, row) in sorted.into_iter().enumerate() {
            if row.position != expected {
                return Err(OddsheetError::InvalidEntity(format!(
                    "bookie '{}' at position {} leaves a gap (expected {expected})",
                    row.name, row.position
                )));
            }
            registry.push(row.name.clone(), row.payload.clone())?;
        }
        Ok(registry)
    }

    /// Append an entity at the next free position.
    pub(crate) fn push(
        &mut self,
        name: String,
        payload: Option<OddsPair>,
    ) -> Result<usize, OddsheetError> {
        if name.trim().is_empty() {
            return Err(OddsheetError::InvalidEntity(format!(
                "empty bookie name at position {} in group {}",
                self.order.len(),
                self.group_id
            )));
        }
        if self.entities.contains_key(&name) {
            return Err(OddsheetError::InvalidEntity(format!(
                "duplicate bookie '{name}' in group {}",
                self.group_id
            )));
        }

        let position = self.order.len();
        self.entities.insert(
            name.clone(),
            Entity {
                name: name.clone(),
                position,
            },
        );
        self.order.push(name);
        self.payloads.push(payload);
        Ok(position)
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Names in ascending position order.
    pub fn names_in_order(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn payload_at(&self, position: usize) -> Result<Option<&OddsPair>, OddsheetError> {
        self.check_index(position)?;
        Ok(self.payloads[position].as_ref())
    }

    /// Exchange the odds held at two positions. Names stay where they are.
    pub fn swap(&mut self, position_a: usize, position_b: usize) -> Result<(), OddsheetError> {
        self.check_index(position_a)?;
        self.check_index(position_b)?;
        self.payloads.swap(position_a, position_b);
        Ok(())
    }

    /// Return a registry with the odds at `position` replaced.
    pub fn with_payload(
        mut self,
        position: usize,
        primary: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Result<Self, OddsheetError> {
        self.check_index(position)?;
        self.payloads[position] = Some(OddsPair::new(primary, secondary));
        Ok(self)
    }

    /// Ordered `(name, position, payload)` rows for the store.
    pub fn snapshot(&self) -> Vec<EntitySnapshot> {
        self.order
            .iter()
            .zip(&self.payloads)
            .enumerate()
            .map(|(position, (name, payload))| EntitySnapshot {
                name: name.clone(),
                position,
                payload: payload.clone(),
            })
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<(), OddsheetError> {
        if index >= self.order.len() {
            return Err(OddsheetError::IndexOutOfRange {
                index,
                size: self.order.len(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
