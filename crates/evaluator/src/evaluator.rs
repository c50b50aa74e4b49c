//! Build, simulate, score and record one candidate.

use crate::artifact::ArtifactStore;
use crate::cancel::CancelToken;
use crate::candidate::Candidate;
use crate::error::EvalError;
use crate::metric::{HitStats, MetricExtractor};
use crate::toolchain::{ToolFailure, Toolchain};
use cacheforge_ledger::{ExperimentLedger, Trial, TrialId, Workload};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Measured outcome on one workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadResult {
    pub workload: String,
    pub stats: HitStats,
    pub hit_rate: f64,
    pub trial_id: TrialId,
}

/// A fully scored and recorded candidate.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub candidate: Candidate,
    pub source_reference: PathBuf,
    /// In workload order.
    pub results: Vec<WorkloadResult>,
    /// Mean hit rate over `results`.
    pub score: f64,
    pub aggregate_trial: TrialId,
}

pub struct CandidateEvaluator {
    toolchain: Box<dyn Toolchain>,
    artifacts: ArtifactStore,
    ledger: ExperimentLedger,
    extractor: MetricExtractor,
}

impl CandidateEvaluator {
    pub fn new(
        toolchain: Box<dyn Toolchain>,
        artifacts: ArtifactStore,
        ledger: ExperimentLedger,
        extractor: MetricExtractor,
    ) -> Self {
        Self {
            toolchain,
            artifacts,
            ledger,
            extractor,
        }
    }

    pub fn ledger(&self) -> &ExperimentLedger {
        &self.ledger
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Persist, build and run `candidate` on every workload, then record the
    /// trials.
    ///
    /// All workloads run before anything is written, so the score copied into
    /// each row is the final mean. A build failure, a failed run or a missing
    /// metric leaves the ledger untouched. The per-workload rows and the
    /// aggregate row are independent writes; the aggregate goes last.
    pub fn evaluate(
        &mut self,
        candidate: &Candidate,
        workloads: &[Workload],
        cancel: &CancelToken,
    ) -> Result<Evaluation, EvalError> {
        if workloads.is_empty() {
            return Err(EvalError::NoWorkloads);
        }
        if cancel.is_cancelled() {
            return Err(EvalError::Cancelled);
        }

        let source_path = self.artifacts.persist(candidate)?;
        let binary = self
            .toolchain
            .build(&source_path, cancel)
            .map_err(|failure| match failure {
                ToolFailure::Cancelled => EvalError::Cancelled,
                failure => EvalError::Build {
                    artifact: source_path.clone(),
                    failure,
                },
            })?;

        let mut measured = Vec::with_capacity(workloads.len());
        for workload in workloads {
            if cancel.is_cancelled() {
                return Err(EvalError::Cancelled);
            }
            let report = self
                .toolchain
                .run(&binary, workload, cancel)
                .map_err(|failure| match failure {
                    ToolFailure::Cancelled => EvalError::Cancelled,
                    failure => EvalError::Run {
                        workload: workload.name.clone(),
                        failure,
                    },
                })?;
            let stats = self.extractor.extract(&report).map_err(|e| {
                warn!(workload = %workload.name, "hit statistics missing from report");
                EvalError::MetricNotFound {
                    workload: workload.name.clone(),
                    tail: e.tail,
                }
            })?;
            info!(
                candidate = %candidate.name,
                workload = %workload.name,
                accesses = stats.accesses,
                hits = stats.hits,
                hit_rate = stats.hit_rate(),
                "workload evaluated"
            );
            measured.push(stats);
        }

        let score = measured.iter().map(HitStats::hit_rate).sum::<f64>() / measured.len() as f64;
        let source_reference = source_path.display().to_string();

        let mut results = Vec::with_capacity(workloads.len());
        for (workload, stats) in workloads.iter().zip(measured) {
            let hit_rate = stats.hit_rate();
            let trial_id = self.ledger.append(&Trial::for_workload(
                workload,
                &candidate.name,
                &candidate.description,
                &source_reference,
                hit_rate,
                score,
            ))?;
            results.push(WorkloadResult {
                workload: workload.name.clone(),
                stats,
                hit_rate,
                trial_id,
            });
        }
        let aggregate_trial = self.ledger.append(&Trial::aggregate(
            &candidate.name,
            &candidate.description,
            &source_reference,
            score,
            score,
        ))?;

        info!(candidate = %candidate.name, score, trial = %aggregate_trial, "candidate recorded");
        Ok(Evaluation {
            candidate: candidate.clone(),
            source_reference: source_path,
            results,
            score,
            aggregate_trial,
        })
    }
}
