//! Column reconciliation.
//!
//! Merges the bookies seen in a fresh fetch into the order an operator has
//! already established in the sheet. Survivors keep their relative order,
//! newcomers are appended in fetch order, and bookies that vanished are
//! either dropped (compacting the columns) or kept with empty odds.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use crate::registry::EntityRegistry;
use crate::types::OddsheetError;

/// What happens to a bookie that is in the sheet but absent from the fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Remove the column and shift later columns left.
    #[default]
    Drop,
    /// Keep the column in place with no odds.
    RetainEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// When false, every cycle lays columns out in fetch order.
    pub preserve_order: bool,
    pub missing: MissingPolicy,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            preserve_order: true,
            missing: MissingPolicy::Drop,
        }
    }
}

/// Counts describing what a reconciliation did, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub retained: usize,
    pub appended: usize,
    pub dropped: usize,
    pub emptied: usize,
}

/// Merge `observed` (bookie names in fetch order) into `existing`.
///
/// Runs in O(existing + observed). Blank names are skipped and repeated
/// names collapse to their first occurrence.
pub fn reconcile<S: AsRef<str>>(
    existing: &EntityRegistry,
    observed: &[S],
    policy: &ReconcilePolicy,
) -> Result<EntityRegistry, OddsheetError> {
    reconcile_with_summary(existing, observed, policy).map(|(registry, _)| registry)
}

/// Same as [`reconcile`], also returning what changed.
pub fn reconcile_with_summary<S: AsRef<str>>(
    existing: &EntityRegistry,
    observed: &[S],
    policy: &ReconcilePolicy,
) -> Result<(EntityRegistry, ReconcileSummary), OddsheetError> {
    let fresh = dedupe_in_fetch_order(observed);
    let seen: HashSet<&str> = fresh.iter().copied().collect();
    let mut summary = ReconcileSummary::default();

    let mut merged = EntityRegistry::empty(existing.group_id());

    if existing.is_empty() || !policy.preserve_order {
        // Fetch order decides positions; survivors still carry their odds
        for name in &fresh {
            match existing.lookup_by_name(name) {
                Some(entity) => {
                    let payload = existing.payload_at(entity.position)?.cloned();
                    merged.push(name.to_string(), payload)?;
                    summary.retained += 1;
                }
                None => {
                    merged.push(name.to_string(), None)?;
                    summary.appended += 1;
                }
            }
        }
        summary.dropped = existing.names_in_order().filter(|n| !seen.contains(n)).count();
    } else {
        for slot in existing.snapshot() {
            if seen.contains(slot.name.as_str()) {
                merged.push(slot.name, slot.payload)?;
                summary.retained += 1;
                continue;
            }
            match policy.missing {
                MissingPolicy::Drop => summary.dropped += 1,
                MissingPolicy::RetainEmpty => {
                    merged.push(slot.name, None)?;
                    summary.emptied += 1;
                }
            }
        }

        for name in fresh {
            if existing.lookup_by_name(name).is_none() {
                merged.push(name.to_string(), None)?;
                summary.appended += 1;
            }
        }
    }

    debug!(
        group = %existing.group_id(),
        retained = summary.retained,
        appended = summary.appended,
        dropped = summary.dropped,
        emptied = summary.emptied,
        "Columns reconciled"
    );

    Ok((merged, summary))
}

fn dedupe_in_fetch_order<S: AsRef<str>>(observed: &[S]) -> Vec<&str> {
    let mut seen = HashSet::with_capacity(observed.len());
    observed
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|name| !name.is_empty() && seen.insert(*name))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
