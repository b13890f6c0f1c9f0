//! Mock odds source for integration testing.
//!
//! Provides a deterministic `Fetcher` that replays a queue of scripted
//! responses, one per call, with an optional gate that holds each call
//! until the test releases it.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

use oddsheet::engine::progress::ProgressReporter;
use oddsheet::fetch::Fetcher;
use oddsheet::types::{FetchError, ObservedOdds};

pub type Script = Result<Vec<ObservedOdds>, FetchError>;

/// A scripted odds source.
///
/// When the queue runs dry the last response is repeated.
pub struct MockSource {
    script: Mutex<VecDeque<Script>>,
    last: Mutex<Option<Script>>,
    gated: AtomicBool,
    gate: Semaphore,
    pub started: Notify,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            started: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold every call until `release` is called.
    pub fn gated(self) -> Self {
        self.gated.store(true, Ordering::SeqCst);
        self
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Script {
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last.clone().unwrap_or_else(|| Ok(Vec::new())),
        }
    }
}

/// Shorthand for a fetch result listing bookies with placeholder odds.
pub fn lines(names: &[&str]) -> Script {
    Ok(names
        .iter()
        .enumerate()
        .map(|(i, name)| ObservedOdds::new(*name, format!("{}.00", i + 2), format!("1.{i}0")))
        .collect())
}

#[async_trait]
impl Fetcher for MockSource {
    async fn fetch(
        &self,
        _group_id: &str,
        _source: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<ObservedOdds>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        progress.report(0.1, "connecting")?;

        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| FetchError::Fatal(e.to_string()))?;
            permit.forget();
        }

        progress.report(0.9, "received")?;
        self.next_response()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
