//! Score comparison, feedback and the termination test.

use crate::config::{ComparisonBaseline, SearchPolicy};
use crate::prompt::percent;
use serde::Serialize;

/// Outcome of comparing one evaluated candidate with the scores in force.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub improved: bool,
    /// Feedback sentence for the next prompt.
    pub feedback: String,
    /// Running best after this iteration.
    pub best_score: f64,
    /// Score the termination ratio was taken against.
    pub baseline: f64,
    /// `current / baseline`; `None` when the baseline is not positive.
    pub ratio: Option<f64>,
    pub terminate: bool,
}

/// Compare `current` with `running_best` (the best before this iteration).
///
/// The running best is raised on any improvement. The termination ratio is
/// taken against the running best or the initial seed, per `policy.baseline`.
pub fn decide(current: f64, running_best: f64, initial_seed: f64, policy: &SearchPolicy) -> Decision {
    let improved = current > running_best;
    let feedback = if improved {
        format!(
            "Great! Policy improved from {} to {}. Please refine further.",
            percent(running_best),
            percent(current)
        )
    } else {
        format!(
            "Policy hit rate was {}, not better than {} (short by {:.2} percentage points). \
             Try a different approach.",
            percent(current),
            percent(running_best),
            (running_best - current) * 100.0
        )
    };

    let baseline = match policy.baseline {
        ComparisonBaseline::RunningBest => running_best,
        ComparisonBaseline::InitialSeed => initial_seed,
    };
    let ratio = (baseline > 0.0 && baseline.is_finite()).then(|| current / baseline);
    let terminate = ratio.is_some_and(|r| r > policy.termination_threshold);

    Decision {
        improved,
        feedback,
        best_score: if improved { current } else { running_best },
        baseline,
        ratio,
        terminate,
    }
}
