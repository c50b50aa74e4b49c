use anyhow::Result;
use approx::assert_abs_diff_eq;
use cacheforge_evaluator::{CancelToken, ToolFailure, Toolchain};
use cacheforge_ledger::{
    seed, ExperimentLedger, RetrievalRanker, SeedCatalog, Workload, AGGREGATE_WORKLOAD,
};
use cacheforge_search::{
    Oracle, OracleError, SearchConfig, SearchController, SearchError, StopReason,
};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedOracle {
    fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, _prompt: &str, cancel: &CancelToken) -> Result<String, OracleError> {
        if cancel.is_cancelled() {
            return Err(OracleError::Cancelled);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .ok_or(OracleError::EmptyResponse)
    }
}

/// Reads `hit_rate.<workload>=<rate>` markers out of the candidate source.
struct MarkerToolchain;

impl Toolchain for MarkerToolchain {
    fn name(&self) -> &str {
        "marker"
    }

    fn build(&self, source: &Path, _cancel: &CancelToken) -> Result<PathBuf, ToolFailure> {
        let text = fs::read_to_string(source).map_err(|e| ToolFailure::Launch {
            program: "cc".into(),
            detail: e.to_string(),
        })?;
        if text.contains("#error") {
            return Err(ToolFailure::Exit {
                program: "g++".into(),
                status: "exit status: 1".into(),
                detail: "#error directive".into(),
            });
        }
        let binary = source.with_extension("out");
        fs::copy(source, &binary).map_err(|e| ToolFailure::Launch {
            program: "cc".into(),
            detail: e.to_string(),
        })?;
        Ok(binary)
    }

    fn run(
        &self,
        binary: &Path,
        workload: &Workload,
        _cancel: &CancelToken,
    ) -> Result<String, ToolFailure> {
        let text = fs::read_to_string(binary).unwrap_or_default();
        let key = format!("hit_rate.{}=", workload.name);
        let rate: f64 = text
            .split(&key)
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);
        Ok(format!(
            "L1D TOTAL     ACCESS:     900000  HIT:     850000\n\
             LLC TOTAL     ACCESS:      10000  HIT:  {:>9}  MISS: 0\n",
            (rate * 10_000.0).round() as u64
        ))
    }
}

fn reply(name: &str, rates: &[(&str, f64)], extra: &str) -> String {
    let markers: Vec<String> = rates
        .iter()
        .map(|(w, r)| format!("hit_rate.{w}={r}"))
        .collect();
    format!(
        "Ideas considered: three.\n\n## Policy Name\n{name}\n\n## Policy Description\n\
         {name} combines recency with reuse prediction.\n\n## C++ Implementation\n\
         ```cpp\n// {}\n{extra}\nvoid InitReplacementState() {{}}\n```\n",
        markers.join(" ")
    )
}

fn workloads() -> Vec<Workload> {
    vec![
        Workload::new(
            "astar",
            "pathfinding with irregular branches",
            "traces/astar_313B.trace.gz",
        ),
        Workload::new("mcf", "pointer chasing", "traces/mcf_250B.trace.gz"),
    ]
}

fn config(dir: &Path) -> SearchConfig {
    let mut config = SearchConfig::with_workloads(workloads());
    config.ledger = dir.join("db").join("cacheforge.db");
    config.artifact_dir = dir.join("new_policies");
    config.metric.scope = Some("LLC TOTAL".into());
    config
}

fn seed_catalog(dir: &Path, ledger: &ExperimentLedger) -> Result<()> {
    let catalog_path = dir.join("baselines.json");
    fs::write(
        &catalog_path,
        r#"{"policies": [
            {"name": "LRU", "description": "least recently used",
             "file_path": "champ_repl_pol/lru.cc",
             "hit_rates": {"astar": 0.45, "mcf": 0.55}},
            {"name": "Hawkeye", "description": "Belady-guided reuse predictor",
             "source_reference": "champ_repl_pol/hawkeye.cc", "score": 0.48}
        ]}"#,
    )?;
    let catalog = SeedCatalog::load(&catalog_path)?;
    seed::seed_baselines(ledger, &catalog, &workloads())?;
    Ok(())
}

#[test]
fn search_runs_from_seed_to_threshold() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path());
    let ledger = ExperimentLedger::open(&config.ledger)?;
    seed_catalog(dir.path(), &ledger)?;

    let oracle = ScriptedOracle::new(vec![
        reply("Alpha RRIP", &[("astar", 0.55), ("mcf", 0.65)], ""),
        "I could not decide on a format.".into(),
        reply("Broken", &[("astar", 0.9), ("mcf", 0.9)], "#error missing header"),
        reply("Beta Hybrid", &[("astar", 0.75), ("mcf", 0.85)], ""),
    ]);
    let mut controller =
        SearchController::new(config.clone(), Box::new(oracle), Box::new(MarkerToolchain))?;

    assert_abs_diff_eq!(controller.init()?, 0.5, epsilon = 1e-12);
    let summary = controller.run()?;

    assert_eq!(summary.stop, StopReason::ThresholdReached);
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.best_candidate.as_deref(), Some("Beta Hybrid"));
    assert_abs_diff_eq!(summary.best_score, 0.8, epsilon = 1e-9);
    let last = summary.last.expect("last iteration");
    assert_abs_diff_eq!(last.ratio.expect("ratio"), 0.8 / 0.6, epsilon = 1e-9);

    // Every attempt left a source artifact; the failed build recorded nothing.
    for name in ["000_alpha_rrip.cc", "001_broken.cc", "002_beta_hybrid.cc"] {
        assert!(config.artifact_dir.join(name).exists(), "{name} missing");
    }
    assert!(ledger.candidate_history("Broken")?.is_empty());

    // The aggregate score equals the mean of the per-workload metrics.
    let mut per_candidate: HashMap<String, Vec<f64>> = HashMap::new();
    for workload in workloads() {
        for stored in ledger.query(&workload.name)? {
            per_candidate
                .entry(stored.trial.candidate.clone())
                .or_default()
                .push(stored.trial.metric);
        }
    }
    for aggregate in ledger.query(AGGREGATE_WORKLOAD)? {
        let Some(metrics) = per_candidate.get(&aggregate.trial.candidate) else {
            continue;
        };
        let mean = metrics.iter().sum::<f64>() / metrics.len() as f64;
        assert_abs_diff_eq!(aggregate.trial.score, mean, epsilon = 1e-9);
    }

    let top = RetrievalRanker::new(ledger.clone()).top_n(AGGREGATE_WORKLOAD, 5)?;
    let names: Vec<_> = top.iter().map(|r| r.candidate.as_str()).collect();
    assert_eq!(names, vec!["Beta Hybrid", "Alpha RRIP", "LRU", "Hawkeye"]);
    Ok(())
}

#[test]
fn search_refuses_unseeded_ledger() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let oracle = ScriptedOracle::new(vec![]);
    let mut controller =
        SearchController::new(config(dir.path()), Box::new(oracle), Box::new(MarkerToolchain))?;
    assert!(matches!(controller.run(), Err(SearchError::NoSeedData)));
    Ok(())
}

#[test]
fn second_run_continues_artifact_sequence() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut config = config(dir.path());
    config.search.max_iterations = Some(1);
    let ledger = ExperimentLedger::open(&config.ledger)?;
    seed_catalog(dir.path(), &ledger)?;

    for name in ["First", "Second"] {
        let oracle = ScriptedOracle::new(vec![reply(name, &[("astar", 0.5), ("mcf", 0.5)], "")]);
        let mut controller =
            SearchController::new(config.clone(), Box::new(oracle), Box::new(MarkerToolchain))?;
        let summary = controller.run()?;
        assert_eq!(summary.stop, StopReason::IterationLimit);
    }

    assert!(config.artifact_dir.join("000_first.cc").exists());
    assert!(config.artifact_dir.join("001_second.cc").exists());
    assert_eq!(ledger.query(AGGREGATE_WORKLOAD)?.len(), 4);
    Ok(())
}
