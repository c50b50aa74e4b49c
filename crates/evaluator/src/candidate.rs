//! The per-iteration proposal handed to the evaluator.

use serde::{Deserialize, Serialize};

/// A replacement policy proposed by the oracle.
///
/// Lives for one iteration; only its trials and the source artifact persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub description: String,
    pub source: String,
}

impl Candidate {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            source: source.into(),
        }
    }
}
