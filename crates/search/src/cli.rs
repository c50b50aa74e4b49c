//! CLI wiring for cacheforge.

use crate::config::SearchConfig;
use crate::controller::SearchController;
use crate::oracle::ChatCompletionsOracle;
use crate::prompt::percent;
use anyhow::{Context, Result};
use cacheforge_evaluator::CommandToolchain;
use cacheforge_ledger::{seed, ExperimentLedger, RetrievalRanker, SeedCatalog};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cacheforge", about = "LLM-driven cache replacement policy search")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load baseline policies into the ledger.
    Seed {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        catalog: PathBuf,
        /// Delete every recorded trial first.
        #[arg(long, default_value_t = false)]
        reset: bool,
    },
    /// Run the generate/evaluate/decide loop.
    Search {
        #[arg(long)]
        config: PathBuf,
    },
    /// Show the best recorded candidates for a workload.
    Top {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "all")]
        workload: String,
        #[arg(short = 'n', long, default_value_t = 5)]
        n: usize,
    },
    /// Show every trial of one candidate.
    History {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        candidate: String,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match cli.command {
        Command::Seed {
            config,
            catalog,
            reset,
        } => {
            let config = SearchConfig::load(&config)?;
            let ledger = open_ledger(&config)?;
            if reset {
                let removed = seed::reset(&ledger)?;
                println!("removed {removed} trials");
            }
            let catalog = SeedCatalog::load(&catalog)
                .with_context(|| format!("failed to load catalog {}", catalog.display()))?;
            let report = seed::seed_baselines(&ledger, &catalog, &config.workloads)?;
            println!(
                "seeded {} policies: {} workload trials, {} aggregate trials",
                report.policies, report.workload_trials, report.aggregate_trials
            );
        }
        Command::Search { config } => {
            let config = SearchConfig::load(&config)?;
            let oracle = ChatCompletionsOracle::from_config(&config.oracle)?;
            let toolchain = CommandToolchain::new(config.toolchain.clone());
            let mut controller =
                SearchController::new(config, Box::new(oracle), Box::new(toolchain))?;

            let seeded = controller.init()?;
            info!(seed = seeded, "starting search");
            let summary = controller.run()?;

            println!(
                "stop={:?}, iterations={}, attempts={}",
                summary.stop, summary.iterations, summary.attempts
            );
            println!(
                "best hit rate {} (started at {}), best new candidate: {}",
                percent(summary.best_score),
                percent(summary.initial_best),
                summary.best_candidate.as_deref().unwrap_or("none")
            );
            if let Some(last) = &summary.last {
                println!("{}", serde_json::to_string_pretty(last)?);
            }
        }
        Command::Top {
            config,
            workload,
            n,
        } => {
            let config = SearchConfig::load(&config)?;
            let ranker = RetrievalRanker::new(open_ledger(&config)?);
            let ranked = ranker.top_n(&workload, n)?;
            if ranked.is_empty() {
                println!("no trials recorded for workload '{workload}'");
            }
            for (rank, entry) in ranked.iter().enumerate() {
                println!(
                    "{:>2}. {:<40} {:>8}  {} ({})",
                    rank + 1,
                    entry.candidate,
                    percent(entry.score),
                    entry.source_reference,
                    entry.trial_id
                );
            }
        }
        Command::History { config, candidate } => {
            let config = SearchConfig::load(&config)?;
            let ledger = open_ledger(&config)?;
            let trials = ledger.candidate_history(&candidate)?;
            if trials.is_empty() {
                println!("no trials recorded for candidate '{candidate}'");
            }
            for stored in &trials {
                println!(
                    "{} {} workload={} metric={:.4} score={:.4} source={}",
                    stored.id,
                    stored.recorded_at,
                    stored.trial.workload,
                    stored.trial.metric,
                    stored.trial.score,
                    stored.trial.source_reference
                );
            }
        }
    }

    Ok(())
}

fn open_ledger(config: &SearchConfig) -> Result<ExperimentLedger> {
    ExperimentLedger::open(&config.ledger)
        .with_context(|| format!("failed to open ledger {}", config.ledger.display()))
}
