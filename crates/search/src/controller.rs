//! The generate → evaluate → record → decide loop.

use crate::config::{EvaluationFailurePolicy, SearchConfig};
use crate::decision::decide;
use crate::error::{OracleError, Result, SearchError};
use crate::oracle::Oracle;
use crate::prompt::{OutputContract, PromptComposer};
use crate::reply::{ParsedReply, ReplyParser};
use crate::state::{Event, Phase};
use cacheforge_evaluator::{
    ArtifactStore, CancelToken, Candidate, CandidateEvaluator, EvalError, Toolchain,
};
use cacheforge_ledger::{ExperimentLedger, RetrievalRanker, AGGREGATE_WORKLOAD};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const BACKOFF_SLICE: Duration = Duration::from_millis(50);

/// Result of one evaluated iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationReport {
    /// 1-based count of evaluated candidates in this run.
    pub iteration: u64,
    pub candidate: String,
    pub score: f64,
    pub improved: bool,
    /// Score the termination ratio was taken against.
    pub baseline: f64,
    pub ratio: Option<f64>,
    /// Running best after this iteration.
    pub best_score: f64,
    pub feedback: String,
}

/// What a single [`SearchController::step`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IterationOutcome {
    /// The candidate did not compile; the next step reuses the same context.
    BuildFailed { candidate: String, reason: String },
    /// The reply was unusable; the next step asks again.
    MalformedReply { reason: String, consecutive: u32 },
    /// A run failed; the next step re-evaluates the same candidate.
    EvaluationRetry {
        candidate: String,
        attempt: u32,
        backoff: Duration,
        reason: String,
    },
    Continue(IterationReport),
    Terminate(IterationReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    ThresholdReached,
    IterationLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchSummary {
    pub iterations: u64,
    /// Candidates handed to the evaluator, build failures and retries included.
    pub attempts: u64,
    pub initial_best: f64,
    pub best_score: f64,
    /// Best candidate produced by this run, if any beat the seed.
    pub best_candidate: Option<String>,
    pub last: Option<IterationReport>,
    pub stop: StopReason,
}

struct PendingRetry {
    candidate: Candidate,
    failures: u32,
    backoff: Duration,
}

/// Transient state; everything durable lives in the ledger.
struct LoopState {
    initial_best: f64,
    best_score: f64,
    best_candidate: Option<String>,
    previous: Option<(Candidate, String)>,
    iterations: u64,
    attempts: u64,
    malformed_streak: u32,
    pending: Option<PendingRetry>,
    last: Option<IterationReport>,
}

pub struct SearchController {
    config: SearchConfig,
    oracle: Box<dyn Oracle>,
    evaluator: CandidateEvaluator,
    ranker: RetrievalRanker,
    composer: PromptComposer,
    parser: ReplyParser,
    cancel: CancelToken,
    phase: Phase,
    state: Option<LoopState>,
}

impl SearchController {
    /// Open the ledger and artifact directory named by `config`.
    pub fn new(
        config: SearchConfig,
        oracle: Box<dyn Oracle>,
        toolchain: Box<dyn Toolchain>,
    ) -> Result<Self> {
        config.validate()?;
        let ledger = ExperimentLedger::open(&config.ledger)?;
        let artifacts = ArtifactStore::open(&config.artifact_dir, &config.source_extension)
            .map_err(EvalError::from)?;
        let extractor = config.extractor()?;
        if config.metric.scope.is_none() {
            warn!(
                suggested = "LLC TOTAL",
                "metric.scope is unset; the first ACCESS/HIT line of each report is scored"
            );
        }
        let contract = OutputContract::default();
        let parser = ReplyParser::new(contract)
            .map_err(|e| SearchError::Config(format!("output contract: {e}")))?;

        info!(
            oracle = oracle.name(),
            toolchain = toolchain.name(),
            workloads = config.workloads.len(),
            ledger = %config.ledger.display(),
            "search controller ready"
        );

        Ok(Self {
            composer: PromptComposer::new(config.workloads.clone(), contract),
            ranker: RetrievalRanker::new(ledger.clone()),
            evaluator: CandidateEvaluator::new(toolchain, artifacts, ledger, extractor),
            parser,
            oracle,
            config,
            cancel: CancelToken::new(),
            phase: Phase::Init,
            state: None,
        })
    }

    /// Handle that stops the search from another thread. Running child
    /// processes are killed; an in-flight oracle request is abandoned when it
    /// returns.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Running best score, once initialized.
    pub fn best_score(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.best_score)
    }

    /// Seed the running best from the top aggregate trial.
    pub fn init(&mut self) -> Result<f64> {
        if let Some(state) = &self.state {
            return Ok(state.best_score);
        }
        let top = self.ranker.top_n(AGGREGATE_WORKLOAD, 1)?;
        let Some(best) = top.first() else {
            return Err(SearchError::NoSeedData);
        };
        info!(candidate = %best.candidate, score = best.score, "seeded best score");

        self.state = Some(LoopState {
            initial_best: best.score,
            best_score: best.score,
            best_candidate: None,
            previous: None,
            iterations: 0,
            attempts: 0,
            malformed_streak: 0,
            pending: None,
            last: None,
        });
        self.advance(Event::Seeded)?;
        Ok(best.score)
    }

    /// Run one pass from COMPOSE (or a pending re-evaluation) to DECIDE.
    ///
    /// Recoverable conditions come back as outcomes. An error halts the loop
    /// in the phase where it happened; the controller is not meant to be
    /// stepped again afterwards.
    pub fn step(&mut self) -> Result<IterationOutcome> {
        self.init()?;
        if let Some(report) = self.terminal_report() {
            return Ok(IterationOutcome::Terminate(report));
        }
        self.check_cancelled()?;

        let pending = self.state_mut()?.pending.take();
        let (candidate, failures) = match pending {
            Some(retry) => {
                debug!(
                    candidate = %retry.candidate.name,
                    backoff_ms = retry.backoff.as_millis() as u64,
                    "backing off"
                );
                self.sleep(retry.backoff)?;
                (retry.candidate, retry.failures)
            }
            None => match self.generate()? {
                Ok(candidate) => (candidate, 0),
                Err(outcome) => return Ok(outcome),
            },
        };

        self.state_mut()?.attempts += 1;
        let evaluated = self
            .evaluator
            .evaluate(&candidate, &self.config.workloads, &self.cancel);
        let evaluation = match evaluated {
            Ok(evaluation) => evaluation,
            Err(err) => return self.evaluation_failed(candidate, failures, err),
        };
        self.advance(Event::Evaluated)?;
        info!(
            candidate = %candidate.name,
            score = evaluation.score,
            trial = %evaluation.aggregate_trial,
            "trials recorded"
        );
        self.advance(Event::Recorded)?;

        let policy = self.config.search.clone();
        let state = self.state_mut()?;
        let decision = decide(evaluation.score, state.best_score, state.initial_best, &policy);

        state.iterations += 1;
        if decision.improved {
            state.best_candidate = Some(candidate.name.clone());
        }
        state.best_score = decision.best_score;
        let report = IterationReport {
            iteration: state.iterations,
            candidate: candidate.name.clone(),
            score: evaluation.score,
            improved: decision.improved,
            baseline: decision.baseline,
            ratio: decision.ratio,
            best_score: decision.best_score,
            feedback: decision.feedback.clone(),
        };
        state.previous = Some((candidate, decision.feedback));
        state.last = Some(report.clone());

        info!(
            iteration = report.iteration,
            candidate = %report.candidate,
            score = report.score,
            best = report.best_score,
            ratio = report.ratio,
            "iteration decided"
        );

        if decision.terminate {
            self.advance(Event::Stop)?;
            Ok(IterationOutcome::Terminate(report))
        } else {
            self.advance(Event::Continue)?;
            Ok(IterationOutcome::Continue(report))
        }
    }

    /// Step until the termination test fires or the iteration limit is hit.
    pub fn run(&mut self) -> Result<SearchSummary> {
        self.init()?;
        let stop = loop {
            if let Some(limit) = self.config.search.max_iterations {
                if self.state_mut()?.iterations >= limit {
                    info!(limit, "iteration limit reached");
                    break StopReason::IterationLimit;
                }
            }
            match self.step()? {
                IterationOutcome::Terminate(_) => break StopReason::ThresholdReached,
                IterationOutcome::Continue(_)
                | IterationOutcome::BuildFailed { .. }
                | IterationOutcome::MalformedReply { .. }
                | IterationOutcome::EvaluationRetry { .. } => {}
            }
        };

        let state = self.state_mut()?;
        let summary = SearchSummary {
            iterations: state.iterations,
            attempts: state.attempts,
            initial_best: state.initial_best,
            best_score: state.best_score,
            best_candidate: state.best_candidate.clone(),
            last: state.last.clone(),
            stop,
        };
        info!(
            iterations = summary.iterations,
            attempts = summary.attempts,
            best = summary.best_score,
            stop = ?summary.stop,
            "search finished"
        );
        Ok(summary)
    }

    /// COMPOSE → GENERATE → PARSE. `Ok(Err(outcome))` is a recoverable
    /// malformed reply.
    fn generate(&mut self) -> Result<std::result::Result<Candidate, IterationOutcome>> {
        let prompt = match &self.state_ref()?.previous {
            Some((previous, feedback)) => self.composer.feedback(previous, feedback),
            None => {
                let ranked = self
                    .ranker
                    .top_n(AGGREGATE_WORKLOAD, self.config.search.top_n)?;
                self.composer.cold_start(&ranked)
            }
        };
        self.advance(Event::PromptReady)?;

        info!(oracle = self.oracle.name(), "requesting candidate");
        let reply = self
            .oracle
            .complete(&prompt, &self.cancel)
            .map_err(|e| match e {
                OracleError::Cancelled => SearchError::Cancelled,
                other => SearchError::Oracle(other),
            });
        let reply = match reply {
            Ok(reply) => reply,
            Err(SearchError::Cancelled) => {
                self.advance(Event::Cancelled)?;
                return Err(SearchError::Cancelled);
            }
            Err(e) => return Err(e),
        };
        self.advance(Event::ReplyReceived)?;

        match self.parser.parse(&reply) {
            ParsedReply::Parsed(candidate) => {
                self.state_mut()?.malformed_streak = 0;
                self.advance(Event::ReplyParsed)?;
                info!(candidate = %candidate.name, "reply parsed");
                Ok(Ok(candidate))
            }
            ParsedReply::Malformed { reason } => {
                let limit = self.config.search.max_reply_retries;
                let state = self.state_mut()?;
                state.malformed_streak += 1;
                let consecutive = state.malformed_streak;
                if consecutive > limit {
                    return Err(SearchError::Parse {
                        attempts: consecutive,
                        reason,
                    });
                }
                warn!(reason = %reason, consecutive, "malformed oracle reply");
                self.advance(Event::ReplyMalformed)?;
                Ok(Err(IterationOutcome::MalformedReply {
                    reason,
                    consecutive,
                }))
            }
        }
    }

    fn evaluation_failed(
        &mut self,
        candidate: Candidate,
        failures: u32,
        err: EvalError,
    ) -> Result<IterationOutcome> {
        if err.is_build_failure() {
            warn!(candidate = %candidate.name, error = %err, "build failed, discarding candidate");
            self.advance(Event::BuildFailed)?;
            self.advance(Event::Discarded)?;
            return Ok(IterationOutcome::BuildFailed {
                candidate: candidate.name,
                reason: err.to_string(),
            });
        }

        if let EvaluationFailurePolicy::Retry {
            max_attempts,
            initial_backoff_ms,
        } = self.config.search.evaluation_failures
        {
            let failures = failures + 1;
            if err.is_transient() && failures < max_attempts {
                let backoff = Duration::from_millis(initial_backoff_ms)
                    .saturating_mul(1u32 << (failures - 1).min(16));
                warn!(
                    candidate = %candidate.name,
                    error = %err,
                    attempt = failures,
                    backoff_ms = backoff.as_millis() as u64,
                    "evaluation failed, will retry"
                );
                self.advance(Event::EvaluationFailed)?;
                let reason = err.to_string();
                let name = candidate.name.clone();
                self.state_mut()?.pending = Some(PendingRetry {
                    candidate,
                    failures,
                    backoff,
                });
                return Ok(IterationOutcome::EvaluationRetry {
                    candidate: name,
                    attempt: failures,
                    backoff,
                    reason,
                });
            }
        }

        let err = SearchError::from(err);
        if matches!(err, SearchError::Cancelled) {
            self.advance(Event::Cancelled)?;
        }
        Err(err)
    }

    fn terminal_report(&self) -> Option<IterationReport> {
        if !self.phase.is_terminal() || self.cancel.is_cancelled() {
            return None;
        }
        self.state.as_ref().and_then(|s| s.last.clone())
    }

    fn check_cancelled(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            if !self.phase.is_terminal() {
                self.advance(Event::Cancelled)?;
            }
            return Err(SearchError::Cancelled);
        }
        Ok(())
    }

    fn sleep(&mut self, duration: Duration) -> Result<()> {
        let mut remaining = duration;
        while !remaining.is_zero() {
            self.check_cancelled()?;
            let slice = remaining.min(BACKOFF_SLICE);
            thread::sleep(slice);
            remaining -= slice;
        }
        self.check_cancelled()
    }

    fn advance(&mut self, event: Event) -> Result<()> {
        let Some(next) = self.phase.on(event) else {
            return Err(SearchError::IllegalTransition {
                phase: self.phase,
                event,
            });
        };
        debug!(from = %self.phase, to = %next, ?event, "phase transition");
        self.phase = next;
        Ok(())
    }

    fn state_ref(&self) -> Result<&LoopState> {
        self.state.as_ref().ok_or(SearchError::IllegalTransition {
            phase: self.phase,
            event: Event::Seeded,
        })
    }

    fn state_mut(&mut self) -> Result<&mut LoopState> {
        let phase = self.phase;
        self.state.as_mut().ok_or(SearchError::IllegalTransition {
            phase,
            event: Event::Seeded,
        })
    }
}
