//! Candidate evaluation pipeline.
//!
//! Turns a proposed replacement-policy source file into per-workload hit
//! rates and an aggregate score:
//!
//! ```text
//! Candidate → ArtifactStore → Toolchain::build → Toolchain::run (per workload)
//!                 (NNN_name.cc)      (binary)          (textual report)
//!                                                         ↓
//!                     ExperimentLedger ← mean score ← MetricExtractor
//! ```
//!
//! The compiler and the simulator are external collaborators behind the
//! [`toolchain::Toolchain`] trait; [`toolchain::CommandToolchain`] drives them
//! as child processes (optionally inside a container) with a deadline and a
//! [`cancel::CancelToken`].

pub mod artifact;
pub mod cancel;
pub mod candidate;
pub mod error;
pub mod evaluator;
pub mod metric;
pub mod process;
pub mod sanitize;
pub mod toolchain;

pub use artifact::ArtifactStore;
pub use cancel::CancelToken;
pub use candidate::Candidate;
pub use error::EvalError;
pub use evaluator::{CandidateEvaluator, Evaluation, WorkloadResult};
pub use metric::{HitStats, MetricExtractor, MetricNotFound};
pub use sanitize::sanitize;
pub use toolchain::{
    CommandToolchain, ContainerConfig, Invocation, ToolFailure, Toolchain, ToolchainConfig,
};
