use crate::state::{Event, Phase};
use cacheforge_evaluator::EvalError;
use cacheforge_ledger::StorageError;
use thiserror::Error;

/// Failure talking to the text-generation service.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(String),

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle response had no completion text")]
    EmptyResponse,

    #[error("environment variable {0} is not set")]
    MissingCredentials(String),

    #[error("oracle request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// The ledger has no aggregate rows to seed the running best from.
    #[error("ledger has no aggregate trials; seed baseline policies before searching")]
    NoSeedData,

    #[error("oracle reply unusable after {attempts} attempts: {reason}")]
    Parse { attempts: u32, reason: String },

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Evaluation(EvalError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("search cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("event {event:?} is not valid in phase {phase}")]
    IllegalTransition { phase: Phase, event: Event },
}

impl From<EvalError> for SearchError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Storage(e) => SearchError::Storage(e),
            EvalError::Cancelled => SearchError::Cancelled,
            other => SearchError::Evaluation(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
