//! Generation requests.
//!
//! Every prompt has three sections in a fixed order: the workloads, the
//! context (ranked history or the previous attempt with its feedback), and
//! the task with the output-format contract the reply parser relies on.

use cacheforge_evaluator::Candidate;
use cacheforge_ledger::{RankedCandidate, Workload};
use std::fmt::Write;

/// Section markers the oracle must reproduce, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputContract {
    pub name_marker: &'static str,
    pub description_marker: &'static str,
    pub source_marker: &'static str,
    /// Info string of the fenced source block.
    pub fence_language: &'static str,
}

impl Default for OutputContract {
    fn default() -> Self {
        Self {
            name_marker: "## Policy Name",
            description_marker: "## Policy Description",
            source_marker: "## C++ Implementation",
            fence_language: "cpp",
        }
    }
}

/// Skeleton of a ChampSim CRC2 replacement policy.
pub const CODE_TEMPLATE: &str = r#"#include <vector>
#include <cstdint>
#include <iostream>
#include "../inc/champsim_crc2.h"

#define NUM_CORE 1
#define LLC_SETS (NUM_CORE * 2048)
#define LLC_WAYS 16

// Per-block and per-set replacement metadata goes here.

// Initialize replacement state
void InitReplacementState() {
}

// Find victim in the set
uint32_t GetVictimInSet(uint32_t cpu, uint32_t set, const BLOCK *current_set, uint64_t PC, uint64_t paddr, uint32_t type) {
    return 0;
}

// Update replacement state
void UpdateReplacementState(uint32_t cpu, uint32_t set, uint32_t way, uint64_t paddr, uint64_t PC, uint64_t victim_addr, uint32_t type, uint8_t hit) {
}

// Print end-of-simulation statistics
void PrintStats() {
}

// Print periodic (heartbeat) statistics
void PrintStats_Heartbeat() {
}"#;

const COLD_START_TASK: &str = "Task: propose a new cache replacement policy that outperforms every \
policy above across these workloads. Take branching behavior, memory access patterns, spatial and \
temporal locality and phase changes into account.\n\
Approach:\n\
1) Sketch 3-4 distinct policy ideas and note which workloads each could help.\n\
2) Pick the most promising one and give a complete C++ implementation.\n\
3) Expose tunable parameters and note which statistics are worth tracking.";

const FEEDBACK_TASK: &str = "Task: refine or redesign the policy to raise the hit rate across all \
workloads. Modifications, hybrids or entirely new ideas are all acceptable.";

/// Renders oracle requests for one fixed workload set.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    workloads: Vec<Workload>,
    contract: OutputContract,
}

impl PromptComposer {
    pub fn new(workloads: Vec<Workload>, contract: OutputContract) -> Self {
        Self {
            workloads,
            contract,
        }
    }

    pub fn contract(&self) -> &OutputContract {
        &self.contract
    }

    /// First-iteration request: ranked history to beat.
    pub fn cold_start(&self, ranked: &[RankedCandidate]) -> String {
        let mut out = self.workload_section();

        out.push_str("The top-performing cache replacement policies from past experiments are:\n\n");
        if ranked.is_empty() {
            out.push_str("(none recorded yet)\n");
        }
        for entry in ranked {
            let _ = writeln!(
                out,
                "Policy: {}\nHit Rate: {}\nDescription:\n{}\n",
                entry.candidate,
                percent(entry.score),
                entry.description.trim()
            );
        }
        out.push('\n');

        out.push_str(COLD_START_TASK);
        out.push_str("\n\n");
        out.push_str(&self.format_section());
        out
    }

    /// Follow-up request: the immediately preceding attempt and how it did.
    pub fn feedback(&self, previous: &Candidate, feedback: &str) -> String {
        let mut out = self.workload_section();

        let _ = write!(
            out,
            "Your previous design was **{}**:\n\nDescription:\n{}\n\nImplementation:\n```{}\n{}\n```\n\n\
             Feedback from the last run:\n{}\n\n",
            previous.name,
            previous.description.trim(),
            self.contract.fence_language,
            previous.source.trim_end(),
            feedback
        );

        out.push_str(FEEDBACK_TASK);
        out.push_str("\n\n");
        out.push_str(&self.format_section());
        out
    }

    fn workload_section(&self) -> String {
        let mut out = String::from("The following workloads are under consideration:\n");
        for workload in &self.workloads {
            let _ = writeln!(out, "- {}: {}", workload.name, workload.description.trim());
        }
        out.push('\n');
        out
    }

    fn format_section(&self) -> String {
        format!(
            "Use exactly this output format:\n\n\
             {}\n<name>\n\n\
             {}\n<one paragraph describing the approach and why it helps>\n\n\
             {}\n```{}\n{}\n```\n",
            self.contract.name_marker,
            self.contract.description_marker,
            self.contract.source_marker,
            self.contract.fence_language,
            CODE_TEMPLATE
        )
    }
}

/// `0.4321` as `43.21%`.
pub fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cacheforge_ledger::TrialId;

    fn composer() -> PromptComposer {
        PromptComposer::new(
            vec![
                Workload::new("astar", "grid pathfinding, irregular branches", "astar.gz"),
                Workload::new("mcf", "pointer chasing over a large graph", "mcf.gz"),
            ],
            OutputContract::default(),
        )
    }

    fn ranked(name: &str, score: f64, id: i64) -> RankedCandidate {
        RankedCandidate {
            candidate: name.into(),
            description: format!("{name} description"),
            score,
            source_reference: format!("{name}.cc"),
            trial_id: TrialId(id),
        }
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("'{needle}' missing from prompt"))
    }

    #[test]
    fn test_cold_start_sections_in_order() {
        let prompt = composer().cold_start(&[ranked("SHiP++", 0.4312, 1), ranked("LRU", 0.41, 2)]);

        let workloads = position(&prompt, "- mcf: pointer chasing");
        let history = position(&prompt, "Policy: SHiP++\nHit Rate: 43.12%");
        let second = position(&prompt, "Policy: LRU");
        let name = position(&prompt, "## Policy Name\n<name>");
        let desc = position(&prompt, "## Policy Description");
        let code = position(&prompt, "## C++ Implementation\n```cpp\n#include");
        assert!(workloads < history && history < second);
        assert!(second < name && name < desc && desc < code);
        assert!(prompt.contains("GetVictimInSet"));
    }

    #[test]
    fn test_feedback_embeds_previous_attempt() {
        let previous = Candidate::new("Hybrid RRIP", "mixes SRRIP and BRRIP", "int rrpv[16];\n");
        let prompt = composer().feedback(&previous, "Try a different approach.");

        assert!(prompt.contains("Your previous design was **Hybrid RRIP**"));
        assert!(prompt.contains("```cpp\nint rrpv[16];\n```"));
        let feedback = position(&prompt, "Feedback from the last run:\nTry a different approach.");
        let contract = position(&prompt, "## Policy Name");
        assert!(feedback < contract);
        assert!(!prompt.contains("past experiments"));
    }

    #[test]
    fn test_cold_start_without_history() {
        let prompt = composer().cold_start(&[]);
        assert!(prompt.contains("(none recorded yet)"));
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.5), "50.00%");
        assert_eq!(percent(0.66666), "66.67%");
    }
}
