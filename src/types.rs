//! Shared types for oddsheet.
//!
//! These types form the data model used across all modules: the odds
//! payloads that travel from fetchers into the sheet, the per-group task
//! status exposed to observers, and the domain error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::registry::EntityRegistry;

// ---------------------------------------------------------------------------
// Odds payloads
// ---------------------------------------------------------------------------

/// A pair of odds quoted by one bookie for one market.
///
/// Values are kept as the source rendered them ("2.10", "11/10", "-", ...).
/// Nothing in the engine interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OddsPair {
    pub primary: String,
    pub secondary: String,
}

impl OddsPair {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

impl fmt::Display for OddsPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.primary, self.secondary)
    }
}

/// One bookie line as returned by a fetcher, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedOdds {
    pub name: String,
    pub primary: String,
    pub secondary: String,
}

impl ObservedOdds {
    pub fn new(
        name: impl Into<String>,
        primary: impl Into<String>,
        secondary: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A named, positioned record tracked across fetch cycles (a bookie column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    /// Column index relative to the group's first odds column.
    pub position: usize,
}

/// Flat view of one registry slot, in position order, for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub name: String,
    pub position: usize,
    pub payload: Option<OddsPair>,
}

// ---------------------------------------------------------------------------
// Task state
// ---------------------------------------------------------------------------

/// Lifecycle of one fetch-and-reconcile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Ready,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Observable status of a group's most recent (or current) run.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub group_id: String,
    /// Monotonic per group. Zero until the first run starts.
    pub run_id: u64,
    pub state: TaskState,
    /// Fraction complete, 0.0–1.0. Non-decreasing within one run.
    pub progress: f64,
    pub message: String,
    pub paused: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Merged registry; only set once the run has SUCCEEDED.
    #[serde(skip)]
    pub result: Option<Arc<EntityRegistry>>,
}

impl TaskStatus {
    pub fn ready(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            run_id: 0,
            state: TaskState::Ready,
            progress: 0.0,
            message: "Waiting for first cycle".to_string(),
            paused: false,
            started_at: None,
            finished_at: None,
            result: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}#{}] {} {:.0}%: {}",
            self.group_id,
            self.run_id,
            self.state,
            self.progress * 100.0,
            self.message,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors surfaced by the engine and its control surface.
#[derive(Debug, thiserror::Error)]
pub enum OddsheetError {
    #[error("Invalid range: rows {row_start}..{row_end}, cols {col_start}..{col_end} (coordinates must be >= 0 and the cell count must fit in usize)")]
    InvalidRange {
        row_start: i64,
        row_end: i64,
        col_start: i64,
        col_end: i64,
    },

    #[error("Index out of range: position {index} in registry of size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Group {0} needs a non-zero period")]
    InvalidPeriod(String),

    #[error("Group already registered: {0}")]
    DuplicateGroup(String),

    #[error("Worker for group {0} has stopped")]
    SchedulerStopped(String),
}

/// Failure reported by a `Fetcher`. Any variant ends the current run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Source unreachable or overloaded; the next scheduled tick may succeed.
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// Source answered with something we cannot use.
    #[error("Fatal fetch error: {0}")]
    Fatal(String),

    /// The run was cancelled at a progress checkpoint.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failure reported by a `Store`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store I/O error ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store format error: {0}")]
    Format(String),

    #[error("Region missing in sheet {sheet}: {region}")]
    RegionMissing { sheet: String, region: String },

    #[error("Invalid sheet layout: {0}")]
    Layout(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_display() {
        assert_eq!(TaskState::Ready.to_string(), "READY");
        assert_eq!(TaskState::Running.to_string(), "RUNNING");
        assert_eq!(TaskState::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(!TaskState::Ready.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }

    #[test]
    fn test_task_state_serializes_uppercase() {
        let json = serde_json::to_string(&TaskState::Succeeded).unwrap();
        assert_eq!(json, "\"SUCCEEDED\"");
    }

    #[test]
    fn test_ready_status() {
        let s = TaskStatus::ready("epl");
        assert_eq!(s.group_id, "epl");
        assert_eq!(s.run_id, 0);
        assert_eq!(s.state, TaskState::Ready);
        assert_eq!(s.progress, 0.0);
        assert!(s.result.is_none());
        assert!(!s.is_running());
    }

    #[test]
    fn test_status_serialization_skips_result() {
        let json = serde_json::to_value(TaskStatus::ready("epl")).unwrap();
        assert_eq!(json["state"], "READY");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_odds_pair_display() {
        assert_eq!(OddsPair::new("2.10", "1.75").to_string(), "2.10 / 1.75");
    }

    #[test]
    fn test_fetch_error_transient() {
        assert!(FetchError::Transient("timeout".into()).is_transient());
        assert!(!FetchError::Fatal("bad json".into()).is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_messages() {
        let e = OddsheetError::IndexOutOfRange { index: 5, size: 3 };
        assert!(e.to_string().contains("position 5"));

        let e: OddsheetError = FetchError::Fatal("boom".into()).into();
        assert_eq!(e.to_string(), "Fatal fetch error: boom");

        let e = OddsheetError::GroupNotFound("nba".into());
        assert_eq!(e.to_string(), "Group not found: nba");
    }
}
