//! Per-group periodic scheduler.
//!
//! Each registered group gets its own worker task that owns the group's
//! `FetchTask`, its latest reconciled registry, and a control inbox. Runs
//! are spawned into the worker's `JoinSet`, which never holds more than one
//! run: ticks that arrive while a run is in flight are skipped, not queued.
//! Groups share nothing, so a slow or failing group never delays another.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::progress::CancelFlag;
use super::task::FetchTask;
use super::GroupSpec;
use crate::fetch::Fetcher;
use crate::registry::EntityRegistry;
use crate::storage::Store;
use crate::types::{OddsheetError, TaskState, TaskStatus};

/// Control inbox depth per group.
const CONTROL_CAPACITY: usize = 16;

enum Command {
    RunOnce(oneshot::Sender<bool>),
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
    Cancel(oneshot::Sender<bool>),
    Registry(oneshot::Sender<Option<Arc<EntityRegistry>>>),
    Shutdown(oneshot::Sender<()>),
}

struct GroupHandle {
    control: mpsc::Sender<Command>,
    status: watch::Receiver<TaskStatus>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    groups: HashMap<String, GroupHandle>,
}

impl Scheduler {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn Store>) -> Self {
        Self {
            fetcher,
            store,
            groups: HashMap::new(),
        }
    }

    /// Start a worker for `group`. Its first cycle begins immediately.
    ///
    /// Fails on a duplicate id or a zero period.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&mut self, group: GroupSpec) -> Result<(), OddsheetError> {
        if self.groups.contains_key(&group.id) {
            return Err(OddsheetError::DuplicateGroup(group.id));
        }
        if group.period.is_zero() {
            return Err(OddsheetError::InvalidPeriod(group.id));
        }

        let id = group.id.clone();
        let period = group.period;
        let task = Arc::new(FetchTask::new(group, self.fetcher.clone(), self.store.clone()));
        let status = task.subscribe();
        let (control, inbox) = mpsc::channel(CONTROL_CAPACITY);

        let worker = GroupWorker {
            task,
            paused: false,
            cancel: None,
            runs: JoinSet::new(),
            latest: None,
        };
        tokio::spawn(worker.run(inbox));

        info!(group = %id, period_secs = period.as_secs_f64(), "Group registered");
        self.groups.insert(id, GroupHandle { control, status });
        Ok(())
    }

    /// Registered group ids, sorted.
    pub fn group_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn status(&self, group_id: &str) -> Result<TaskStatus, OddsheetError> {
        Ok(self.handle(group_id)?.status.borrow().clone())
    }

    /// Every group's status, sorted by group id.
    pub fn statuses(&self) -> Vec<TaskStatus> {
        let mut all: Vec<TaskStatus> = self
            .groups
            .values()
            .map(|h| h.status.borrow().clone())
            .collect();
        all.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        all
    }

    /// Stream of status changes for one group.
    pub fn subscribe(&self, group_id: &str) -> Result<watch::Receiver<TaskStatus>, OddsheetError> {
        Ok(self.handle(group_id)?.status.clone())
    }

    /// Trigger a cycle now. Returns false, starting nothing, if one is in flight.
    pub async fn run_once(&self, group_id: &str) -> Result<bool, OddsheetError> {
        self.request(group_id, Command::RunOnce).await
    }

    /// Stop scheduled ticks for a group. `run_once` still works while paused.
    pub async fn pause(&self, group_id: &str) -> Result<(), OddsheetError> {
        self.request(group_id, Command::Pause).await
    }

    pub async fn resume(&self, group_id: &str) -> Result<(), OddsheetError> {
        self.request(group_id, Command::Resume).await
    }

    /// Signal the in-flight run to stop at its next checkpoint.
    ///
    /// Returns false if nothing was running.
    pub async fn cancel_current(&self, group_id: &str) -> Result<bool, OddsheetError> {
        self.request(group_id, Command::Cancel).await
    }

    /// Registry produced by the group's last successful cycle.
    pub async fn registry(&self, group_id: &str) -> Result<Option<Arc<EntityRegistry>>, OddsheetError> {
        self.request(group_id, Command::Registry).await
    }

    /// Cancel in-flight runs and stop every worker, waiting for each to drain.
    pub async fn shutdown(&self) {
        let acks = self.groups.iter().map(|(id, handle)| async move {
            let (tx, rx) = oneshot::channel();
            if handle.control.send(Command::Shutdown(tx)).await.is_err() {
                return;
            }
            if rx.await.is_err() {
                warn!(group = %id, "Worker exited without acknowledging shutdown");
            }
        });
        join_all(acks).await;
        info!(groups = self.groups.len(), "Scheduler stopped");
    }

    fn handle(&self, group_id: &str) -> Result<&GroupHandle, OddsheetError> {
        self.groups
            .get(group_id)
            .ok_or_else(|| OddsheetError::GroupNotFound(group_id.to_string()))
    }

    async fn request<T>(
        &self,
        group_id: &str,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, OddsheetError> {
        let handle = self.handle(group_id)?;
        let stopped = || OddsheetError::SchedulerStopped(group_id.to_string());

        let (tx, rx) = oneshot::channel();
        handle.control.send(make(tx)).await.map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct GroupWorker {
    task: Arc<FetchTask>,
    paused: bool,
    /// Cancellation handle of the in-flight run, if any.
    cancel: Option<CancelFlag>,
    runs: JoinSet<TaskState>,
    latest: Option<Arc<EntityRegistry>>,
}

impl GroupWorker {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        let group_id = self.task.group().id.clone();
        let mut ticker = tokio::time::interval(self.task.group().period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Reap a finished run before anything that looks at it
            tokio::select! {
                biased;

                Some(done) = self.runs.join_next() => self.on_finished(done),
                command = inbox.recv() => match command {
                    Some(Command::RunOnce(reply)) => {
                        let started = self.start();
                        if !started {
                            debug!(group = %group_id, "run_once ignored, run in flight");
                        }
                        let _ = reply.send(started);
                    }
                    Some(Command::Pause(reply)) => {
                        self.set_paused(true);
                        let _ = reply.send(());
                    }
                    Some(Command::Resume(reply)) => {
                        self.set_paused(false);
                        let _ = reply.send(());
                    }
                    Some(Command::Cancel(reply)) => {
                        let _ = reply.send(self.cancel_current());
                    }
                    Some(Command::Registry(reply)) => {
                        let _ = reply.send(self.latest.clone());
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.drain().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.drain().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if self.paused {
                        debug!(group = %group_id, "Paused, tick skipped");
                    } else if !self.start() {
                        debug!(group = %group_id, "Run still in flight, tick skipped");
                    }
                }
            }
        }

        debug!(group = %group_id, "Worker stopped");
    }

    /// Launch a run unless one is already in flight.
    fn start(&mut self) -> bool {
        if !self.runs.is_empty() {
            return false;
        }

        self.task.reset();
        let cancel = CancelFlag::new();
        let Some(reporter) = self.task.begin(cancel.clone()) else {
            warn!(group = %self.task.group().id, "Task refused to start");
            return false;
        };

        self.cancel = Some(cancel);
        let task = self.task.clone();
        self.runs.spawn(async move { task.drive(reporter).await });
        true
    }

    fn on_finished(&mut self, done: Result<TaskState, JoinError>) {
        self.cancel = None;
        match done {
            Ok(TaskState::Succeeded) => {
                if let Some(registry) = self.task.status().result {
                    self.latest = Some(registry);
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(group = %self.task.group().id, error = %e, "Run aborted");
                self.task.status_sender().send_if_modified(|s| {
                    if s.state != TaskState::Running {
                        return false;
                    }
                    s.state = TaskState::Failed;
                    s.message = format!("Run aborted: {e}");
                    s.finished_at = Some(chrono::Utc::now());
                    true
                });
            }
        }
    }

    fn cancel_current(&mut self) -> bool {
        match &self.cancel {
            Some(flag) => {
                flag.cancel();
                info!(group = %self.task.group().id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        self.task.status_sender().send_if_modified(|s| {
            let changed = s.paused != paused;
            s.paused = paused;
            changed
        });
        info!(group = %self.task.group().id, paused, "Schedule updated");
    }

    async fn drain(&mut self) {
        self.cancel_current();
        while let Some(done) = self.runs.join_next().await {
            self.on_finished(done);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
