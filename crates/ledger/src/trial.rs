//! Ledger data model: workloads and trials.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Workload name under which aggregate (all-workload) trials are stored.
pub const AGGREGATE_WORKLOAD: &str = "all";

/// A benchmark workload the candidates are scored against.
///
/// The set of workloads is fixed for a given search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,
    pub description: String,
    /// Trace handed to the simulator, e.g. `traces/mcf_250B.trace.gz`.
    pub trace: String,
}

impl Workload {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        trace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            trace: trace.into(),
        }
    }
}

/// One immutable observation of a candidate.
///
/// `metric` is the measured hit rate for `workload` (or the aggregate for
/// [`AGGREGATE_WORKLOAD`] rows). `score` is the candidate's mean hit rate over
/// the full workload set, copied into every row of that evaluation so ranking
/// never has to aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub workload: String,
    pub candidate: String,
    pub candidate_description: String,
    pub workload_description: String,
    pub source_reference: String,
    pub metric: f64,
    pub score: f64,
}

impl Trial {
    /// Per-workload row.
    pub fn for_workload(
        workload: &Workload,
        candidate: &str,
        candidate_description: &str,
        source_reference: &str,
        metric: f64,
        score: f64,
    ) -> Self {
        Self {
            workload: workload.name.clone(),
            candidate: candidate.to_string(),
            candidate_description: candidate_description.to_string(),
            workload_description: workload.description.clone(),
            source_reference: source_reference.to_string(),
            metric,
            score,
        }
    }

    /// Aggregate row stored under [`AGGREGATE_WORKLOAD`].
    pub fn aggregate(
        candidate: &str,
        candidate_description: &str,
        source_reference: &str,
        metric: f64,
        score: f64,
    ) -> Self {
        Self {
            workload: AGGREGATE_WORKLOAD.to_string(),
            candidate: candidate.to_string(),
            candidate_description: candidate_description.to_string(),
            workload_description: String::new(),
            source_reference: source_reference.to_string(),
            metric,
            score,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.workload == AGGREGATE_WORKLOAD
    }
}

/// Row id assigned by the ledger; increases with store order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrialId(pub i64);

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A trial as read back from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTrial {
    pub id: TrialId,
    /// SQLite `datetime('now')` at insert time (UTC).
    pub recorded_at: String,
    pub trial: Trial,
}
