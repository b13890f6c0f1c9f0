//! Rectangular addressing for the sheet grid.
//!
//! A `RangeGeometry` names a block of cells by its row and column bounds.
//! Bounds may be given in either order; they are normalised on
//! construction so `(2, 0)` and `(0, 2)` describe the same rows.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::OddsheetError;

/// Shape of a range, derived from its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RangeKind {
    /// Single cell.
    Cell,
    /// One row, several columns.
    Row,
    /// One column, several rows.
    Col,
    /// Several rows and several columns.
    Rect,
}

impl fmt::Display for RangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell => write!(f, "CELL"),
            Self::Row => write!(f, "ROW"),
            Self::Col => write!(f, "COL"),
            Self::Rect => write!(f, "RECT"),
        }
    }
}

/// Immutable, normalised rectangle of zero-based grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeGeometry {
    first_row: usize,
    last_row: usize,
    first_col: usize,
    last_col: usize,
}

impl RangeGeometry {
    /// Build a range from raw bounds.
    ///
    /// Fails if any coordinate is negative or the cell count would not fit
    /// in a `usize`.
    pub fn make(
        row_start: i64,
        row_end: i64,
        col_start: i64,
        col_end: i64,
    ) -> Result<Self, OddsheetError> {
        let invalid = || OddsheetError::InvalidRange {
            row_start,
            row_end,
            col_start,
            col_end,
        };
        let coord = |v: i64| usize::try_from(v).map_err(|_| invalid());

        let (r0, r1) = (coord(row_start)?, coord(row_end)?);
        let (c0, c1) = (coord(col_start)?, coord(col_end)?);

        let rows = r0.abs_diff(r1).checked_add(1);
        let cols = c0.abs_diff(c1).checked_add(1);
        rows.zip(cols)
            .and_then(|(rows, cols)| rows.checked_mul(cols))
            .ok_or_else(invalid)?;

        Ok(Self {
            first_row: r0.min(r1),
            last_row: r0.max(r1),
            first_col: c0.min(c1),
            last_col: c0.max(c1),
        })
    }

    pub fn cell(row: i64, col: i64) -> Result<Self, OddsheetError> {
        Self::make(row, row, col, col)
    }

    /// Part of a single row, spanning `col_start..=col_end`.
    pub fn row_range(row: i64, col_start: i64, col_end: i64) -> Result<Self, OddsheetError> {
        Self::make(row, row, col_start, col_end)
    }

    /// Part of a single column, spanning `row_start..=row_end`.
    pub fn col_range(col: i64, row_start: i64, row_end: i64) -> Result<Self, OddsheetError> {
        Self::make(row_start, row_end, col, col)
    }

    pub fn kind(&self) -> RangeKind {
        match (self.first_row == self.last_row, self.first_col == self.last_col) {
            (true, true) => RangeKind::Cell,
            (true, false) => RangeKind::Row,
            (false, true) => RangeKind::Col,
            (false, false) => RangeKind::Rect,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.last_row - self.first_row + 1
    }

    pub fn num_cols(&self) -> usize {
        self.last_col - self.first_col + 1
    }

    pub fn num_cells(&self) -> usize {
        self.num_rows() * self.num_cols()
    }

    pub fn first_row(&self) -> usize {
        self.first_row
    }

    pub fn last_row(&self) -> usize {
        self.last_row
    }

    pub fn first_col(&self) -> usize {
        self.first_col
    }

    pub fn last_col(&self) -> usize {
        self.last_col
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }

    /// Iterate `(row, col)` pairs in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.first_row..=self.last_row)
            .flat_map(move |r| (self.first_col..=self.last_col).map(move |c| (r, c)))
    }
}

impl fmt::Display for RangeGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R{}C{}:R{}C{}",
            self.first_row, self.first_col, self.last_row, self.last_col
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
