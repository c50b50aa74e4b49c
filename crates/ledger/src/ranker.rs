//! Top-N retrieval of historical candidates.

use crate::error::Result;
use crate::store::ExperimentLedger;
use crate::trial::{StoredTrial, TrialId};
use serde::Serialize;
use std::collections::HashMap;

/// A candidate selected as context for the next generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub candidate: String,
    pub description: String,
    pub score: f64,
    pub source_reference: String,
    /// Trial the entry was taken from.
    pub trial_id: TrialId,
}

/// Selects the highest-scoring candidates recorded under a workload scope.
#[derive(Debug, Clone)]
pub struct RetrievalRanker {
    ledger: ExperimentLedger,
}

impl RetrievalRanker {
    pub fn new(ledger: ExperimentLedger) -> Self {
        Self { ledger }
    }

    /// At most `n` candidates for `workload`, best score first.
    ///
    /// An empty result means the scope has no usable rows; `n == 0` returns
    /// empty without touching the ledger.
    pub fn top_n(&self, workload: &str, n: usize) -> Result<Vec<RankedCandidate>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let trials = self.ledger.query(workload)?;
        Ok(rank(&trials, n))
    }
}

/// Rank trials (given in store order) by score.
///
/// Each candidate name occupies at most one slot: its best-scoring row, the
/// earliest one if several share that score. Equal scores across candidates
/// resolve to the earlier-recorded trial first. Rows with a non-finite score
/// are ignored.
pub fn rank(trials: &[StoredTrial], n: usize) -> Vec<RankedCandidate> {
    let mut best: Vec<&StoredTrial> = Vec::new();
    let mut slot_of: HashMap<&str, usize> = HashMap::new();

    for stored in trials.iter().filter(|t| t.trial.score.is_finite()) {
        match slot_of.get(stored.trial.candidate.as_str()) {
            Some(&slot) => {
                if stored.trial.score > best[slot].trial.score {
                    best[slot] = stored;
                }
            }
            None => {
                slot_of.insert(stored.trial.candidate.as_str(), best.len());
                best.push(stored);
            }
        }
    }

    best.sort_by(|a, b| {
        b.trial
            .score
            .total_cmp(&a.trial.score)
            .then_with(|| a.id.cmp(&b.id))
    });

    best.into_iter()
        .take(n)
        .map(|stored| RankedCandidate {
            candidate: stored.trial.candidate.clone(),
            description: stored.trial.candidate_description.clone(),
            score: stored.trial.score,
            source_reference: stored.trial.source_reference.clone(),
            trial_id: stored.id,
        })
        .collect()
}
