//! Core engine: one fetch → reconcile → write cycle per group, on a timer.

pub mod progress;
pub mod scheduler;
pub mod task;

use std::time::Duration;

use crate::reconciler::ReconcilePolicy;
use crate::storage::SheetLayout;

/// Everything the engine needs to know about one group (one sheet).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub id: String,
    /// Passed verbatim to the fetcher.
    pub source: String,
    pub policy: ReconcilePolicy,
    pub layout: SheetLayout,
    pub period: Duration,
}

impl GroupSpec {
    pub fn new(id: impl Into<String>, source: impl Into<String>, period: Duration) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            policy: ReconcilePolicy::default(),
            layout: SheetLayout::default(),
            period,
        }
    }

    pub fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_layout(mut self, layout: SheetLayout) -> Self {
        self.layout = layout;
        self
    }
}
