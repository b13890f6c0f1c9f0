//! Persistence layer.
//!
//! Defines the `Store` trait through which the engine reads the sheet's
//! current bookie columns and writes the reconciled result back, plus the
//! `SheetLayout` anchors that locate a group's block inside its sheet.
//!
//! - `sheet_file`: JSON workbook on disk, addressed with `RangeGeometry`
//! - `MemoryStore`: in-process store for tests and dry runs

pub mod sheet_file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::geometry::RangeGeometry;
use crate::registry::EntityRegistry;
use crate::types::{EntitySnapshot, StoreError};

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Where a group's bookie block lives in its sheet.
///
/// Bookie names run left to right along `name_row` starting at
/// `first_col`; the primary and secondary odds sit in the two rows directly
/// below each name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    #[serde(default)]
    pub name_row: usize,
    #[serde(default = "default_first_col")]
    pub first_col: usize,
    /// Widest block the store will scan for existing names.
    #[serde(default = "default_max_cols")]
    pub max_cols: usize,
}

fn default_first_col() -> usize {
    1
}

fn default_max_cols() -> usize {
    256
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            name_row: 0,
            first_col: default_first_col(),
            max_cols: default_max_cols(),
        }
    }
}

impl SheetLayout {
    /// Row range holding `count` bookie names. `None` when `count` is zero.
    pub fn names_region(&self, count: usize) -> Result<Option<RangeGeometry>, StoreError> {
        if count == 0 {
            return Ok(None);
        }
        let last = self.first_col + count - 1;
        RangeGeometry::row_range(coord(self.name_row)?, coord(self.first_col)?, coord(last)?)
            .map(Some)
            .map_err(|e| StoreError::Layout(e.to_string()))
    }

    /// Two-row block holding odds for `count` bookies.
    pub fn odds_region(&self, count: usize) -> Result<Option<RangeGeometry>, StoreError> {
        if count == 0 {
            return Ok(None);
        }
        let last = self.first_col + count - 1;
        RangeGeometry::make(
            coord(self.name_row + 1)?,
            coord(self.name_row + 2)?,
            coord(self.first_col)?,
            coord(last)?,
        )
        .map(Some)
        .map_err(|e| StoreError::Layout(e.to_string()))
    }

    /// Full block the group may occupy: names plus both odds rows.
    pub fn block_region(&self) -> Result<RangeGeometry, StoreError> {
        if self.max_cols == 0 {
            return Err(StoreError::Layout("max_cols must be at least 1".into()));
        }
        RangeGeometry::make(
            coord(self.name_row)?,
            coord(self.name_row + 2)?,
            coord(self.first_col)?,
            coord(self.first_col + self.max_cols - 1)?,
        )
        .map_err(|e| StoreError::Layout(e.to_string()))
    }
}

fn coord(v: usize) -> Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::Layout(format!("coordinate {v} out of range")))
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Tabular store holding one sheet per group.
///
/// Implementations must make `write_ordered` all-or-nothing: either every
/// row lands or the previous contents stay intact.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Current bookie columns for a group, or `None` if it has no sheet yet.
    async fn read_existing(
        &self,
        group_id: &str,
        layout: &SheetLayout,
    ) -> Result<Option<EntityRegistry>, StoreError>;

    /// Replace the group's bookie block with `rows` (position-ordered).
    async fn write_ordered(
        &self,
        group_id: &str,
        layout: &SheetLayout,
        rows: &[EntitySnapshot],
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Store that keeps each group's rows in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sheets: RwLock<HashMap<String, Vec<EntitySnapshot>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a group's sheet, as if an operator had laid it out.
    pub async fn seed(&self, registry: &EntityRegistry) {
        self.sheets
            .write()
            .await
            .insert(registry.group_id().to_string(), registry.snapshot());
    }

    /// Rows currently stored for a group.
    pub async fn rows(&self, group_id: &str) -> Option<Vec<EntitySnapshot>> {
        self.sheets.read().await.get(group_id).cloned()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read_existing(
        &self,
        group_id: &str,
        _layout: &SheetLayout,
    ) -> Result<Option<EntityRegistry>, StoreError> {
        let sheets = self.sheets.read().await;
        match sheets.get(group_id) {
            Some(rows) => EntityRegistry::from_snapshot(group_id, rows)
                .map(Some)
                .map_err(|e| StoreError::Format(e.to_string())),
            None => Ok(None),
        }
    }

    async fn write_ordered(
        &self,
        group_id: &str,
        _layout: &SheetLayout,
        rows: &[EntitySnapshot],
    ) -> Result<(), StoreError> {
        // Validate before touching the map so a bad batch leaves the old rows
        EntityRegistry::from_snapshot(group_id, rows)
            .map_err(|e| StoreError::Format(e.to_string()))?;

        let mut sorted = rows.to_vec();
        sorted.sort_by_key(|r| r.position);
        self.sheets.write().await.insert(group_id.to_string(), sorted);
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(group = group_id, rows = rows.len(), "Memory sheet written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
