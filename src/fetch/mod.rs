//! Odds sources.
//!
//! Defines the `Fetcher` trait consumed by the engine and provides an HTTP
//! implementation that reads a JSON odds document per group.

pub mod http;

use async_trait::async_trait;

use crate::engine::progress::ProgressReporter;
use crate::types::{FetchError, ObservedOdds};

/// Abstraction over odds sources.
///
/// A fetch returns bookie lines in the order the source displays them;
/// that order decides where newly seen bookies are appended. Implementors
/// should call `progress.report` as partial results arrive and propagate
/// its `Cancelled` error. No retries happen inside a fetch: the scheduler's
/// next tick is the retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        group_id: &str,
        source: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<ObservedOdds>, FetchError>;

    /// Fetcher name for logging.
    fn name(&self) -> &str;
}
