//! Persistent experiment ledger for the cacheforge policy search.
//!
//! Every evaluation of a candidate replacement policy lands here as a set of
//! immutable [`Trial`] rows: one per workload plus one aggregate row under the
//! [`AGGREGATE_WORKLOAD`] sentinel. The ledger is append-only; ranking reads it
//! back to seed the next generation prompt.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Seeding        │────▶│  ExperimentLedger│────▶│ RetrievalRanker │
//! │  (bootstrap)    │     │  (SQLite, append)│     │ (top-N by score)│
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`trial::Trial`]: one recorded observation
//! - [`store::ExperimentLedger`]: `append` / `query` over short-lived connections
//! - [`ranker::RetrievalRanker`]: deduplicated, deterministic top-N retrieval
//! - [`seed`]: out-of-band reset and baseline seeding

pub mod error;
pub mod ranker;
mod schema;
pub mod seed;
pub mod store;
pub mod trial;

pub use error::StorageError;
pub use ranker::{rank, RankedCandidate, RetrievalRanker};
pub use seed::{BaselinePolicy, SeedCatalog, SeedReport};
pub use store::ExperimentLedger;
pub use trial::{StoredTrial, Trial, TrialId, Workload, AGGREGATE_WORKLOAD};
