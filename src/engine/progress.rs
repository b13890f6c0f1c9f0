//! Progress reporting and cooperative cancellation for a single run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::types::{FetchError, TaskState, TaskStatus};

/// Shared cancellation signal, checked at progress checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle through which a run publishes progress.
///
/// Every report is also a cancellation checkpoint. Reported fractions are
/// clamped to `[0, 1]`, mapped into this reporter's span, and never allowed
/// to move the published progress backwards. Reports from a run that is no
/// longer the group's current run are discarded.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    run_id: u64,
    status: Arc<watch::Sender<TaskStatus>>,
    cancel: CancelFlag,
    lo: f64,
    hi: f64,
}

impl ProgressReporter {
    pub(crate) fn new(run_id: u64, status: Arc<watch::Sender<TaskStatus>>, cancel: CancelFlag) -> Self {
        Self {
            run_id,
            status,
            cancel,
            lo: 0.0,
            hi: 1.0,
        }
    }

    /// A reporter bound to its own status channel, already RUNNING.
    ///
    /// Handy for driving a fetcher outside the scheduler (tests, one-off CLI runs).
    pub fn detached(group_id: &str) -> Self {
        let mut status = TaskStatus::ready(group_id);
        status.run_id = 1;
        status.state = TaskState::Running;
        let (tx, _rx) = watch::channel(status);
        Self::new(1, Arc::new(tx), CancelFlag::new())
    }

    /// A reporter whose `0.0..=1.0` maps onto `lo..=hi` of this one.
    pub fn rescaled(&self, lo: f64, hi: f64) -> Self {
        let width = self.hi - self.lo;
        Self {
            lo: self.lo + width * lo.clamp(0.0, 1.0),
            hi: self.lo + width * hi.clamp(0.0, 1.0),
            ..self.clone()
        }
    }

    /// Publish progress and a status message.
    ///
    /// Returns `FetchError::Cancelled` once the run has been cancelled, so
    /// fetchers can simply propagate it with `?`.
    pub fn report(&self, fraction: f64, message: impl Into<String>) -> Result<(), FetchError> {
        self.checkpoint()?;

        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let value = self.lo + (self.hi - self.lo) * fraction;
        let message = message.into();

        self.status.send_if_modified(|s| {
            if s.run_id != self.run_id || s.state != TaskState::Running {
                return false;
            }
            s.progress = s.progress.max(value);
            s.message = message;
            true
        });
        Ok(())
    }

    pub fn checkpoint(&self) -> Result<(), FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Progress currently visible to observers.
    pub fn current(&self) -> f64 {
        self.status.borrow().progress
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
