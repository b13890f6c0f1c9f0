//! Workbook persisted as a JSON grid of string cells, one grid per sheet.
//!
//! ```json
//! { "sheets": { "epl": [["", "Bet365", "Unibet"], ["Home", "2.10", "2.05"], ["Away", "1.80", "1.85"]] } }
//! ```
//!
//! Every call opens, operates on, and drops the file within its own scope.
//! Writes go to a sibling temp file that is renamed over the workbook, so a
//! failed write never leaves a half-updated sheet behind. A mutex serialises
//! access because all groups share one workbook file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{SheetLayout, Store};
use crate::geometry::RangeGeometry;
use crate::registry::EntityRegistry;
use crate::types::{EntitySnapshot, OddsPair, StoreError};

/// Row-major string cells. Missing rows/cells read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid(Vec<Vec<String>>);

impl Grid {
    pub fn get(&self, row: usize, col: usize) -> &str {
        self.0
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if self.0.len() <= row {
            self.0.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.0[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.into();
    }

    /// Blank every cell inside `region` that exists.
    pub fn clear(&mut self, region: &RangeGeometry) {
        for (row, col) in region.cells() {
            if let Some(cell) = self.0.get_mut(row).and_then(|r| r.get_mut(col)) {
                cell.clear();
            }
        }
    }

    /// Number of rows that exist, blank or not.
    pub fn height(&self) -> usize {
        self.0.len()
    }

    /// Values of a single-row region, left to right.
    pub fn row_values(&self, region: &RangeGeometry) -> Vec<&str> {
        (region.first_col()..=region.last_col())
            .map(|col| self.get(region.first_row(), col))
            .collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Workbook {
    #[serde(default)]
    sheets: BTreeMap<String, Grid>,
}

/// File-backed `Store`.
#[derive(Debug)]
pub struct SheetFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SheetFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_str(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Option<Workbook>, StoreError> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path_str(),
                    source,
                })
            }
        };
        let workbook = serde_json::from_str(&json).map_err(|e| {
            StoreError::Format(format!("failed to parse {}: {e}", self.path_str()))
        })?;
        Ok(Some(workbook))
    }

    async fn save(&self, workbook: &Workbook) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(workbook)
            .map_err(|e| StoreError::Format(format!("failed to serialise workbook: {e}")))?;

        let tmp = self
            .path
            .with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        let io_err = |source| StoreError::Io {
            path: tmp.display().to_string(),
            source,
        };

        tokio::fs::write(&tmp, json.as_bytes()).await.map_err(io_err)?;
        if let Err(source) = tokio::fs::rename(&tmp, &self.path).await {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                warn!(path = %tmp.display(), error = %e, "Failed to remove temp workbook");
            }
            return Err(StoreError::Io {
                path: self.path_str(),
                source,
            });
        }
        Ok(())
    }
}

/// Name row of the block, across its full width.
fn header_region(block: &RangeGeometry) -> Result<RangeGeometry, StoreError> {
    RangeGeometry::row_range(
        block.first_row() as i64,
        block.first_col() as i64,
        block.last_col() as i64,
    )
    .map_err(|e| StoreError::Layout(e.to_string()))
}

/// Bookie names from the left of `header` up to the first blank cell.
fn header_names(grid: &Grid, header: &RangeGeometry) -> Vec<String> {
    grid.row_values(header)
        .into_iter()
        .map(str::trim)
        .take_while(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Read the bookie block of one sheet into a registry.
fn read_block(group_id: &str, grid: &Grid, layout: &SheetLayout) -> Result<EntityRegistry, StoreError> {
    let block = layout.block_region()?;
    let header = header_region(&block)?;

    // A sheet with content that stops above the anchor row points at a bad layout
    if grid.height() > 0 && grid.height() <= header.first_row() {
        return Err(StoreError::RegionMissing {
            sheet: group_id.to_string(),
            region: header.to_string(),
        });
    }

    let names = header_names(grid, &header);

    let mut seen = HashSet::new();
    if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(StoreError::Format(format!(
            "sheet {group_id} lists bookie '{dup}' twice in {header}"
        )));
    }

    let mut registry = EntityRegistry::from_ordered(group_id, names.iter().cloned())
        .map_err(|e| StoreError::Format(e.to_string()))?;

    if let Some(odds) = layout.odds_region(names.len())? {
        for (position, col) in (odds.first_col()..=odds.last_col()).enumerate() {
            let primary = grid.get(odds.first_row(), col);
            let secondary = grid.get(odds.last_row(), col);
            if primary.is_empty() && secondary.is_empty() {
                continue;
            }
            registry = registry
                .with_payload(position, primary, secondary)
                .map_err(|e| StoreError::Format(e.to_string()))?;
        }
    }

    Ok(registry)
}

/// Overwrite the bookie block of one sheet with `rows`.
///
/// Only the columns the previous block occupied (as `read_block` sees it)
/// or the new one needs are cleared. Anything the operator keeps to the
/// right of the first blank header cell is left alone.
fn write_block(grid: &mut Grid, layout: &SheetLayout, rows: &[EntitySnapshot]) -> Result<(), StoreError> {
    let block = layout.block_region()?;
    if rows.len() > block.num_cols() {
        return Err(StoreError::Layout(format!(
            "{} bookies do not fit in {block}",
            rows.len()
        )));
    }

    let previous = header_names(grid, &header_region(&block)?).len();
    let width = previous.max(rows.len());
    if width > 0 {
        let stale = RangeGeometry::make(
            block.first_row() as i64,
            block.last_row() as i64,
            block.first_col() as i64,
            (block.first_col() + width - 1) as i64,
        )
        .map_err(|e| StoreError::Layout(e.to_string()))?;
        grid.clear(&stale);
    }

    let (Some(names), Some(odds)) = (layout.names_region(rows.len())?, layout.odds_region(rows.len())?)
    else {
        return Ok(());
    };

    for row in rows {
        let col = names.first_col() + row.position;
        if !names.contains(names.first_row(), col) {
            return Err(StoreError::Layout(format!(
                "bookie '{}' position {} falls outside {names}",
                row.name, row.position
            )));
        }
        grid.set(names.first_row(), col, row.name.clone());
        if let Some(OddsPair { primary, secondary }) = &row.payload {
            grid.set(odds.first_row(), col, primary.clone());
            grid.set(odds.last_row(), col, secondary.clone());
        }
    }
    Ok(())
}

#[async_trait]
impl Store for SheetFileStore {
    async fn read_existing(
        &self,
        group_id: &str,
        layout: &SheetLayout,
    ) -> Result<Option<EntityRegistry>, StoreError> {
        let _guard = self.lock.lock().await;

        let Some(workbook) = self.load().await? else {
            debug!(path = %self.path.display(), "No workbook on disk yet");
            return Ok(None);
        };
        match workbook.sheets.get(group_id) {
            Some(grid) => read_block(group_id, grid, layout).map(Some),
            None => Ok(None),
        }
    }

    async fn write_ordered(
        &self,
        group_id: &str,
        layout: &SheetLayout,
        rows: &[EntitySnapshot],
    ) -> Result<(), StoreError> {
        // Reject gapped or duplicate rows before anything is modified
        EntityRegistry::from_snapshot(group_id, rows)
            .map_err(|e| StoreError::Format(e.to_string()))?;

        let _guard = self.lock.lock().await;

        let mut workbook = self.load().await?.unwrap_or_default();
        let grid = workbook.sheets.entry(group_id.to_string()).or_default();
        write_block(grid, layout, rows)?;
        self.save(&workbook).await?;

        info!(
            path = %self.path.display(),
            group = group_id,
            bookies = rows.len(),
            "Sheet written"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
