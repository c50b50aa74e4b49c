//! Search configuration.
//!
//! Everything the loop needs is loaded once from a JSON file into an
//! immutable [`SearchConfig`] and handed to the controller.

use crate::error::SearchError;
use anyhow::{Context, Result};
use cacheforge_evaluator::{MetricExtractor, ToolchainConfig};
use cacheforge_ledger::{Workload, AGGREGATE_WORKLOAD};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_ledger")]
    pub ledger: PathBuf,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_source_extension")]
    pub source_extension: String,
    /// Evaluated in this order.
    pub workloads: Vec<Workload>,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub metric: MetricConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub search: SearchPolicy,
}

fn default_ledger() -> PathBuf {
    PathBuf::from("cacheforge.db")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("ChampSim_CRC2/new_policies")
}

fn default_source_extension() -> String {
    "cc".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Only count `ACCESS/HIT` lines introduced by this prefix, e.g.
    /// `LLC TOTAL`. Without it the first match in the report wins, which in
    /// a ChampSim report is the L1D line, not the LLC.
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-4o".into(),
            api_key_env: "CACHEFORGE_LLM_API_KEY".into(),
            timeout_secs: 600,
            temperature: None,
        }
    }
}

/// Score the termination test compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonBaseline {
    /// The best score in force before the iteration; raised on every
    /// improvement. A slowly improving search may never clear the threshold
    /// because the target keeps moving.
    #[default]
    RunningBest,
    /// The score seeded at startup, never moved.
    InitialSeed,
}

/// What to do when a simulator run fails or its report has no metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum EvaluationFailurePolicy {
    #[default]
    Abort,
    /// Re-run the same candidate up to `max_attempts` times in total,
    /// doubling the pause after each failure.
    Retry {
        max_attempts: u32,
        initial_backoff_ms: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPolicy {
    /// Ranked candidates shown in the cold-start prompt.
    pub top_n: usize,
    /// Stop once `current / baseline` exceeds this ratio.
    pub termination_threshold: f64,
    pub baseline: ComparisonBaseline,
    /// `None` runs until the threshold is crossed.
    pub max_iterations: Option<u64>,
    /// Consecutive malformed replies tolerated before giving up.
    pub max_reply_retries: u32,
    pub evaluation_failures: EvaluationFailurePolicy,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            top_n: 5,
            termination_threshold: 1.3,
            baseline: ComparisonBaseline::default(),
            max_iterations: None,
            max_reply_retries: 3,
            evaluation_failures: EvaluationFailurePolicy::default(),
        }
    }
}

impl SearchConfig {
    /// Configuration with every default and the given workloads.
    pub fn with_workloads(workloads: Vec<Workload>) -> Self {
        Self {
            ledger: default_ledger(),
            artifact_dir: default_artifact_dir(),
            source_extension: default_source_extension(),
            workloads,
            toolchain: ToolchainConfig::default(),
            metric: MetricConfig::default(),
            oracle: OracleConfig::default(),
            search: SearchPolicy::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let blob = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: SearchConfig = serde_json::from_str(&blob)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), SearchError> {
        let invalid = |msg: String| Err(SearchError::Config(msg));

        if self.workloads.is_empty() {
            return invalid("at least one workload is required".into());
        }
        let mut names = HashSet::new();
        for workload in &self.workloads {
            if workload.name.is_empty() {
                return invalid("workload names must be non-empty".into());
            }
            if workload.name == AGGREGATE_WORKLOAD {
                return invalid(format!(
                    "'{AGGREGATE_WORKLOAD}' is reserved for aggregate trials"
                ));
            }
            if !names.insert(workload.name.as_str()) {
                return invalid(format!("workload '{}' listed twice", workload.name));
            }
        }

        let policy = &self.search;
        if !(policy.termination_threshold.is_finite() && policy.termination_threshold > 0.0) {
            return invalid(format!(
                "termination_threshold must be positive, got {}",
                policy.termination_threshold
            ));
        }
        if policy.top_n == 0 {
            return invalid("top_n must be at least 1".into());
        }
        if let EvaluationFailurePolicy::Retry { max_attempts, .. } = policy.evaluation_failures {
            if max_attempts == 0 {
                return invalid("evaluation retry max_attempts must be at least 1".into());
            }
        }
        if self.source_extension.trim_start_matches('.').is_empty() {
            return invalid("source_extension must be non-empty".into());
        }
        Ok(())
    }

    /// Metric extractor for the configured report scope.
    pub fn extractor(&self) -> std::result::Result<MetricExtractor, SearchError> {
        match &self.metric.scope {
            None => Ok(MetricExtractor::new()),
            Some(scope) => MetricExtractor::scoped(scope)
                .map_err(|e| SearchError::Config(format!("metric scope '{scope}': {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workloads() -> Vec<Workload> {
        vec![
            Workload::new("astar", "", "astar.trace.gz"),
            Workload::new("mcf", "", "mcf.trace.gz"),
        ]
    }

    #[test]
    fn test_minimal_json_takes_defaults() -> Result<()> {
        let json = r#"{"workloads": [{"name": "mcf", "description": "pointer chasing",
            "trace": "ChampSim_CRC2/traces/mcf_250B.trace.gz"}]}"#;
        let config: SearchConfig = serde_json::from_str(json)?;
        config.validate()?;
        assert_eq!(config.search.top_n, 5);
        assert_eq!(config.search.termination_threshold, 1.3);
        assert_eq!(config.search.baseline, ComparisonBaseline::RunningBest);
        assert_eq!(config.search.max_iterations, None);
        assert_eq!(config.search.evaluation_failures, EvaluationFailurePolicy::Abort);
        assert_eq!(config.source_extension, "cc");
        assert_eq!(config.toolchain.compiler, "g++");
        assert_eq!(config.oracle.api_key_env, "CACHEFORGE_LLM_API_KEY");
        Ok(())
    }

    #[test]
    fn test_unscoped_metric_reads_first_cache_level() -> Result<()> {
        let report = "L1D TOTAL     ACCESS:     900000  HIT:     850000\n\
                      LLC TOTAL     ACCESS:      10000  HIT:       4000  MISS: 6000\n";
        let mut config = SearchConfig::with_workloads(workloads());
        assert!(config.metric.scope.is_none());
        assert_eq!(config.extractor()?.extract(report)?.hits, 850_000);

        config.metric.scope = Some("LLC TOTAL".into());
        assert_eq!(config.extractor()?.extract(report)?.hits, 4_000);
        Ok(())
    }

    #[test]
    fn test_policy_knobs_parse() -> Result<()> {
        let json = r#"{
            "workloads": [{"name": "mcf", "description": "", "trace": "mcf.gz"}],
            "metric": {"scope": "LLC TOTAL"},
            "search": {
                "baseline": "initial_seed",
                "max_iterations": 20,
                "evaluation_failures": {"mode": "retry", "max_attempts": 3, "initial_backoff_ms": 250}
            }
        }"#;
        let config: SearchConfig = serde_json::from_str(json)?;
        assert_eq!(config.search.baseline, ComparisonBaseline::InitialSeed);
        assert_eq!(config.search.max_iterations, Some(20));
        assert_eq!(
            config.search.evaluation_failures,
            EvaluationFailurePolicy::Retry {
                max_attempts: 3,
                initial_backoff_ms: 250
            }
        );
        assert!(config.extractor().is_ok());
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_workload_sets() {
        assert!(SearchConfig::with_workloads(vec![]).validate().is_err());

        let mut dup = workloads();
        dup.push(Workload::new("mcf", "", "other.gz"));
        assert!(SearchConfig::with_workloads(dup).validate().is_err());

        let reserved = vec![Workload::new(AGGREGATE_WORKLOAD, "", "x.gz")];
        assert!(matches!(
            SearchConfig::with_workloads(reserved).validate(),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let mut config = SearchConfig::with_workloads(workloads());
        config.search.termination_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::with_workloads(workloads());
        config.search.top_n = 0;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::with_workloads(workloads());
        config.search.evaluation_failures = EvaluationFailurePolicy::Retry {
            max_attempts: 0,
            initial_backoff_ms: 10,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reports_path_on_parse_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cacheforge.json");
        fs::write(&path, "{ not json")?;
        let err = SearchConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("cacheforge.json"));
        Ok(())
    }
}
