//! Out-of-band bootstrap: clearing the ledger and seeding baseline policies.
//!
//! The search loop refuses to start without aggregate rows to compare
//! against, so a fresh ledger is populated from a catalog of known policies
//! (LRU, SHiP++, Hawkeye, ...) with their measured hit rates. None of this is
//! reachable from the steady-state search.

use crate::error::{Result, StorageError};
use crate::store::ExperimentLedger;
use crate::trial::{Trial, Workload};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

/// Baseline policies to load into an empty ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedCatalog {
    pub policies: Vec<BaselinePolicy>,
}

/// One known policy with its measured results.
///
/// Either `hit_rates` covers every configured workload, or only an aggregate
/// `score` is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselinePolicy {
    pub name: String,
    pub description: String,
    #[serde(alias = "file_path")]
    pub source_reference: String,
    #[serde(default)]
    pub hit_rates: BTreeMap<String, f64>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl BaselinePolicy {
    /// Mean hit rate over `workloads`, or the catalog score for the
    /// aggregate-only variant.
    fn aggregate_score(&self, workloads: &[Workload]) -> f64 {
        if self.hit_rates.is_empty() {
            return self.score.unwrap_or(0.0);
        }
        let total: f64 = workloads
            .iter()
            .filter_map(|w| self.hit_rates.get(&w.name))
            .sum();
        total / workloads.len() as f64
    }
}

/// What a seeding pass wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedReport {
    pub policies: usize,
    pub workload_trials: usize,
    pub aggregate_trials: usize,
}

impl SeedCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let blob = fs::read_to_string(path)?;
        serde_json::from_str(&blob)
            .map_err(|e| StorageError::Catalog(format!("{}: {e}", path.display())))
    }

    /// Reject catalogs that would break the aggregate-score invariant.
    pub fn validate(&self, workloads: &[Workload]) -> Result<()> {
        if workloads.is_empty() {
            return Err(StorageError::Catalog("workload set is empty".into()));
        }
        let expected: HashSet<&str> = workloads.iter().map(|w| w.name.as_str()).collect();
        let mut seen = HashSet::new();

        for policy in &self.policies {
            if !seen.insert(policy.name.as_str()) {
                return Err(StorageError::Catalog(format!(
                    "policy '{}' listed twice",
                    policy.name
                )));
            }

            if policy.hit_rates.is_empty() {
                match policy.score {
                    Some(score) if score.is_finite() => {}
                    _ => {
                        return Err(StorageError::Catalog(format!(
                            "policy '{}' has neither hit rates nor a finite score",
                            policy.name
                        )))
                    }
                }
                continue;
            }

            let given: HashSet<&str> = policy.hit_rates.keys().map(String::as_str).collect();
            if let Some(unknown) = given.difference(&expected).next() {
                return Err(StorageError::Catalog(format!(
                    "policy '{}' has a rate for unknown workload '{unknown}'",
                    policy.name
                )));
            }
            if let Some(missing) = expected.difference(&given).next() {
                return Err(StorageError::Catalog(format!(
                    "policy '{}' is missing a rate for workload '{missing}'",
                    policy.name
                )));
            }
            if let Some((workload, _)) = policy.hit_rates.iter().find(|(_, r)| !r.is_finite()) {
                return Err(StorageError::Catalog(format!(
                    "policy '{}' has a non-finite rate for '{workload}'",
                    policy.name
                )));
            }
        }
        Ok(())
    }
}

/// Delete every trial. Bootstrap only.
pub fn reset(ledger: &ExperimentLedger) -> Result<usize> {
    let conn = ledger.connect()?;
    let removed = conn
        .execute("DELETE FROM trials", [])
        .map_err(StorageError::Write)?;
    info!(removed, path = %ledger.path().display(), "ledger reset");
    Ok(removed)
}

/// Write the catalog into the ledger.
///
/// Per-workload rows go first (workload-major, catalog order within each
/// workload), then one aggregate row per policy.
pub fn seed_baselines(
    ledger: &ExperimentLedger,
    catalog: &SeedCatalog,
    workloads: &[Workload],
) -> Result<SeedReport> {
    catalog.validate(workloads)?;

    let scores: Vec<f64> = catalog
        .policies
        .iter()
        .map(|p| p.aggregate_score(workloads))
        .collect();

    let mut report = SeedReport {
        policies: catalog.policies.len(),
        ..SeedReport::default()
    };

    for workload in workloads {
        for (policy, &score) in catalog.policies.iter().zip(&scores) {
            let Some(&rate) = policy.hit_rates.get(&workload.name) else {
                continue;
            };
            ledger.append(&Trial::for_workload(
                workload,
                &policy.name,
                &policy.description,
                &policy.source_reference,
                rate,
                score,
            ))?;
            report.workload_trials += 1;
        }
    }

    for (policy, &score) in catalog.policies.iter().zip(&scores) {
        // The aggregate-only variant has no measured metric of its own.
        let metric = if policy.hit_rates.is_empty() { 0.0 } else { score };
        ledger.append(&Trial::aggregate(
            &policy.name,
            &policy.description,
            &policy.source_reference,
            metric,
            score,
        ))?;
        report.aggregate_trials += 1;
        info!(policy = %policy.name, score, "seeded baseline policy");
    }

    Ok(report)
}
