//! LLM-driven search for cache replacement policies.
//!
//! The controller asks an [`oracle::Oracle`] for a new policy, has the
//! evaluator build and simulate it on every workload, records the trials in
//! the ledger and decides whether to stop:
//!
//! ```text
//! RetrievalRanker ─▶ PromptComposer ─▶ Oracle ─▶ ReplyParser
//!        ▲                                            │
//!        │                                            ▼
//! ExperimentLedger ◀──────── CandidateEvaluator ◀── Candidate
//!        │
//!        └──▶ decide (feedback, running best, termination)
//! ```
//!
//! Configuration is an explicit [`config::SearchConfig`]; nothing is global.

pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod oracle;
pub mod prompt;
pub mod reply;
pub mod state;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{
    ComparisonBaseline, EvaluationFailurePolicy, MetricConfig, OracleConfig, SearchConfig,
    SearchPolicy,
};
pub use controller::{IterationOutcome, IterationReport, SearchController, SearchSummary, StopReason};
pub use decision::{decide, Decision};
pub use error::{OracleError, SearchError};
pub use oracle::{ChatCompletionsOracle, Oracle};
pub use prompt::{OutputContract, PromptComposer};
pub use reply::{ParsedReply, ReplyParser};
pub use state::{Event, Phase};
