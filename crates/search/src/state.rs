//! Controller phases and the transitions between them.
//!
//! ```text
//! Init ─Seeded→ Compose ─PromptReady→ Generate ─ReplyReceived→ Parse
//!   Parse ─ReplyMalformed→ Compose
//!   Parse ─ReplyParsed→ Evaluate
//!   Evaluate ─BuildFailed→ BuildFail ─Discarded→ Compose
//!   Evaluate ─EvaluationFailed→ Evaluate          (retry with backoff)
//!   Evaluate ─Evaluated→ Record ─Recorded→ Decide
//!   Decide ─Continue→ Compose | Decide ─Stop→ Terminated
//! any live phase ─Cancelled→ Terminated
//! ```

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Init,
    Compose,
    Generate,
    Parse,
    Evaluate,
    BuildFail,
    Record,
    Decide,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Event {
    Seeded,
    PromptReady,
    ReplyReceived,
    ReplyParsed,
    ReplyMalformed,
    BuildFailed,
    Discarded,
    EvaluationFailed,
    Evaluated,
    Recorded,
    Continue,
    Stop,
    Cancelled,
}

impl Phase {
    /// Next phase, or `None` if `event` is not valid in this phase.
    pub fn on(self, event: Event) -> Option<Phase> {
        use Event as E;
        use Phase as P;

        let next = match (self, event) {
            (P::Terminated, _) => return None,
            (_, E::Cancelled) => P::Terminated,
            (P::Init, E::Seeded) => P::Compose,
            (P::Compose, E::PromptReady) => P::Generate,
            (P::Generate, E::ReplyReceived) => P::Parse,
            (P::Parse, E::ReplyParsed) => P::Evaluate,
            (P::Parse, E::ReplyMalformed) => P::Compose,
            (P::Evaluate, E::BuildFailed) => P::BuildFail,
            (P::BuildFail, E::Discarded) => P::Compose,
            (P::Evaluate, E::EvaluationFailed) => P::Evaluate,
            (P::Evaluate, E::Evaluated) => P::Record,
            (P::Record, E::Recorded) => P::Decide,
            (P::Decide, E::Continue) => P::Compose,
            (P::Decide, E::Stop) => P::Terminated,
            _ => return None,
        };
        Some(next)
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Terminated
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "INIT",
            Phase::Compose => "COMPOSE",
            Phase::Generate => "GENERATE",
            Phase::Parse => "PARSE",
            Phase::Evaluate => "EVALUATE",
            Phase::BuildFail => "BUILD_FAIL",
            Phase::Record => "RECORD",
            Phase::Decide => "DECIDE",
            Phase::Terminated => "TERMINATE",
        };
        f.write_str(name)
    }
}
