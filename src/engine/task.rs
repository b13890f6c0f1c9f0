//! A single fetch-and-reconcile run for one group.
//!
//! State machine: `READY → RUNNING → {SUCCEEDED, FAILED, CANCELLED}`. A
//! terminal task only runs again after an explicit `reset`.
//!
//! Progress budget: the fetcher owns `0.0..0.6`, the store read and merge
//! take it to `0.85`, and success publishes `1.0`. The last cancellation
//! checkpoint sits immediately before the store write.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::progress::{CancelFlag, ProgressReporter};
use super::GroupSpec;
use crate::fetch::Fetcher;
use crate::reconciler::reconcile_with_summary;
use crate::registry::EntityRegistry;
use crate::storage::Store;
use crate::types::{FetchError, OddsheetError, TaskState, TaskStatus};

/// Share of the progress bar given to the fetcher.
const FETCH_SHARE: f64 = 0.6;
const RECONCILE_MARK: f64 = 0.7;
const WRITE_MARK: f64 = 0.85;

pub struct FetchTask {
    group: Arc<GroupSpec>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    status: Arc<watch::Sender<TaskStatus>>,
}

impl FetchTask {
    pub fn new(group: GroupSpec, fetcher: Arc<dyn Fetcher>, store: Arc<dyn Store>) -> Self {
        let (status, _) = watch::channel(TaskStatus::ready(group.id.clone()));
        Self {
            group: Arc::new(group),
            fetcher,
            store,
            status: Arc::new(status),
        }
    }

    pub fn group(&self) -> &GroupSpec {
        &self.group
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn status_sender(&self) -> &watch::Sender<TaskStatus> {
        &self.status
    }

    /// Return a terminal task to READY. No-op (returns false) otherwise.
    pub fn reset(&self) -> bool {
        self.status.send_if_modified(|s| {
            if !s.state.is_terminal() {
                return false;
            }
            s.state = TaskState::Ready;
            s.progress = 0.0;
            s.message = "Ready".to_string();
            s.result = None;
            true
        })
    }

    /// Execute one cycle. Returns the state the run ended in.
    ///
    /// If the task is not READY nothing runs and the current state is
    /// returned unchanged.
    pub async fn run(&self, cancel: CancelFlag) -> TaskState {
        let Some(reporter) = self.begin(cancel) else {
            let state = self.status.borrow().state;
            warn!(group = %self.group.id, state = %state, "Task not READY, run ignored");
            return state;
        };
        self.drive(reporter).await
    }

    /// Second half of `run`, for callers that already moved the task to
    /// RUNNING with `begin`.
    pub(crate) async fn drive(&self, reporter: ProgressReporter) -> TaskState {
        info!(
            group = %self.group.id,
            run_id = reporter.run_id(),
            fetcher = self.fetcher.name(),
            "Cycle started"
        );

        let outcome = self.execute(&reporter).await;
        self.finish(reporter.run_id(), outcome)
    }

    /// Move READY → RUNNING and hand back the new run's reporter.
    pub(crate) fn begin(&self, cancel: CancelFlag) -> Option<ProgressReporter> {
        let mut run_id = None;
        self.status.send_if_modified(|s| {
            if s.state != TaskState::Ready {
                return false;
            }
            s.run_id += 1;
            s.state = TaskState::Running;
            s.progress = 0.0;
            s.message = format!("Fetching {}", self.group.source);
            s.started_at = Some(Utc::now());
            s.finished_at = None;
            s.result = None;
            run_id = Some(s.run_id);
            true
        });
        run_id.map(|id| ProgressReporter::new(id, self.status.clone(), cancel))
    }

    async fn execute(&self, reporter: &ProgressReporter) -> Result<Arc<EntityRegistry>, OddsheetError> {
        let group = &self.group;

        let observed = self
            .fetcher
            .fetch(&group.id, &group.source, &reporter.rescaled(0.0, FETCH_SHARE))
            .await?;
        reporter.report(FETCH_SHARE, format!("Fetched {} bookies", observed.len()))?;

        let existing = self
            .store
            .read_existing(&group.id, &group.layout)
            .await?
            .unwrap_or_else(|| EntityRegistry::empty(group.id.clone()));
        reporter.report(
            RECONCILE_MARK,
            format!("Reconciling against {} existing columns", existing.len()),
        )?;

        let names: Vec<&str> = observed.iter().map(|line| line.name.as_str()).collect();
        let (mut merged, summary) = reconcile_with_summary(&existing, &names, &group.policy)?;

        // First occurrence of a bookie wins, matching the merge's dedupe
        let mut applied = HashSet::new();
        for line in &observed {
            let name = line.name.trim();
            if !applied.insert(name) {
                continue;
            }
            if let Some(position) = merged.lookup_by_name(name).map(|e| e.position) {
                merged = merged.with_payload(position, line.primary.clone(), line.secondary.clone())?;
            }
        }

        reporter.report(WRITE_MARK, format!("Writing {} columns", merged.len()))?;
        self.store
            .write_ordered(&group.id, &group.layout, &merged.snapshot())
            .await?;

        debug!(
            group = %group.id,
            retained = summary.retained,
            appended = summary.appended,
            dropped = summary.dropped,
            "Sheet updated"
        );
        Ok(Arc::new(merged))
    }

    fn finish(&self, run_id: u64, outcome: Result<Arc<EntityRegistry>, OddsheetError>) -> TaskState {
        let (state, message, result) = match outcome {
            Ok(registry) => (
                TaskState::Succeeded,
                format!("Wrote {} bookies", registry.len()),
                Some(registry),
            ),
            Err(OddsheetError::Fetch(FetchError::Cancelled)) => (
                TaskState::Cancelled,
                "Cancelled, sheet left unchanged".to_string(),
                None,
            ),
            Err(e) => (TaskState::Failed, e.to_string(), None),
        };

        match state {
            TaskState::Failed => warn!(group = %self.group.id, run_id, error = %message, "Cycle failed"),
            _ => info!(group = %self.group.id, run_id, state = %state, message = %message, "Cycle finished"),
        }

        self.status.send_if_modified(|s| {
            if s.run_id != run_id {
                return false;
            }
            s.state = state;
            if state == TaskState::Succeeded {
                s.progress = 1.0;
            }
            s.message = message;
            s.finished_at = Some(Utc::now());
            s.result = result;
            true
        });
        state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
