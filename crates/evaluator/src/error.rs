use crate::toolchain::ToolFailure;
use cacheforge_ledger::StorageError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    /// The candidate did not compile. Nothing was recorded.
    #[error("build of {} failed: {failure}", artifact.display())]
    Build {
        artifact: PathBuf,
        failure: ToolFailure,
    },

    #[error("simulation on workload '{workload}' failed: {failure}")]
    Run {
        workload: String,
        failure: ToolFailure,
    },

    #[error("no hit statistics in the report for workload '{workload}'; report tail: {tail}")]
    MetricNotFound { workload: String, tail: String },

    #[error("no workloads to evaluate against")]
    NoWorkloads,

    #[error("artifact I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvalError {
    pub fn is_build_failure(&self) -> bool {
        matches!(self, EvalError::Build { .. })
    }

    /// Failures of a single simulator run that may succeed when repeated.
    /// Storage failures and cancellation never are.
    pub fn is_transient(&self) -> bool {
        match self {
            EvalError::Run { failure, .. } => !matches!(failure, ToolFailure::Cancelled),
            EvalError::MetricNotFound { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let build = EvalError::Build {
            artifact: PathBuf::from("001_x.cc"),
            failure: ToolFailure::Cancelled,
        };
        assert!(build.is_build_failure());
        assert!(!build.is_transient());

        let run = EvalError::Run {
            workload: "mcf".into(),
            failure: ToolFailure::TimedOut {
                program: "sim".into(),
                after: std::time::Duration::from_secs(1),
            },
        };
        assert!(run.is_transient());

        let missing = EvalError::MetricNotFound {
            workload: "mcf".into(),
            tail: String::new(),
        };
        assert!(missing.is_transient());
        assert!(!EvalError::Cancelled.is_transient());
        assert!(!EvalError::Storage(StorageError::Catalog("x".into())).is_transient());
    }
}
