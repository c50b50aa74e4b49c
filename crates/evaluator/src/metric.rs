//! Hit-rate extraction from simulator reports.
//!
//! The simulator prints a line such as
//! `LLC TOTAL     ACCESS:   12345678  HIT:    4567890  MISS: ...`.
//! Only the access and hit counts are used.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const COUNTS_PATTERN: &str = r"ACCESS:\s*(\d+)\s+HIT:\s*(\d+)";
const REPORT_TAIL_CHARS: usize = 500;

static UNSCOPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(COUNTS_PATTERN).expect("counts pattern is a valid regex"));

/// Access and hit counts for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitStats {
    pub accesses: u64,
    pub hits: u64,
}

impl HitStats {
    /// `hits / accesses`, or 0.0 when nothing was accessed.
    pub fn hit_rate(&self) -> f64 {
        if self.accesses == 0 {
            return 0.0;
        }
        self.hits as f64 / self.accesses as f64
    }
}

/// The report had no access/hit line.
#[derive(Debug, Clone, Error)]
#[error("no ACCESS/HIT statistics found in report")]
pub struct MetricNotFound {
    /// Last few hundred characters of the report, for diagnostics.
    pub tail: String,
}

/// Finds the first `ACCESS: <n> HIT: <n>` match, optionally restricted to
/// lines introduced by a scope prefix such as `LLC TOTAL`.
#[derive(Debug, Clone)]
pub struct MetricExtractor {
    pattern: Regex,
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self {
            pattern: UNSCOPED.clone(),
        }
    }
}

impl MetricExtractor {
    /// Match the counts wherever they appear.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match only counts preceded by `scope`; whitespace inside the scope is
    /// tolerant (`"LLC TOTAL"` matches `LLC   TOTAL`).
    pub fn scoped(scope: &str) -> Result<Self, regex::Error> {
        let words: Vec<String> = scope.split_whitespace().map(regex::escape).collect();
        if words.is_empty() {
            return Ok(Self::new());
        }
        let pattern = Regex::new(&format!(r"{}\s+{}", words.join(r"\s+"), COUNTS_PATTERN))?;
        Ok(Self { pattern })
    }

    pub fn extract(&self, report: &str) -> Result<HitStats, MetricNotFound> {
        let not_found = || MetricNotFound {
            tail: report_tail(report),
        };
        let caps = self.pattern.captures(report).ok_or_else(not_found)?;
        let accesses = caps[1].parse::<u64>().map_err(|_| not_found())?;
        let hits = caps[2].parse::<u64>().map_err(|_| not_found())?;
        Ok(HitStats { accesses, hits })
    }
}

fn report_tail(report: &str) -> String {
    match report.char_indices().rev().nth(REPORT_TAIL_CHARS - 1) {
        Some((idx, _)) => report[idx..].to_string(),
        None => report.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_extracts_counts_and_rate() {
        let stats = MetricExtractor::new()
            .extract("warmup done ... ACCESS: 100 HIT: 40 MISS: 60 ...")
            .unwrap();
        assert_eq!(stats, HitStats { accesses: 100, hits: 40 });
        assert_abs_diff_eq!(stats.hit_rate(), 0.4);
    }

    #[test]
    fn test_zero_accesses_yield_zero_rate() {
        let stats = MetricExtractor::new().extract("ACCESS: 0 HIT: 0").unwrap();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_missing_pattern_is_an_error() {
        let err = MetricExtractor::new()
            .extract("simulation crashed before stats")
            .unwrap_err();
        assert_eq!(err.tail, "simulation crashed before stats");
    }

    #[test]
    fn test_whitespace_tolerance() {
        let stats = MetricExtractor::new()
            .extract("LLC TOTAL     ACCESS:\t 2000\n  HIT:   500")
            .unwrap();
        assert_eq!(stats.accesses, 2000);
        assert_eq!(stats.hits, 500);
    }

    #[test]
    fn test_scope_selects_the_right_line() {
        let report = "L2C TOTAL     ACCESS:        900  HIT:        800  MISS: 100\n\
                      LLC TOTAL     ACCESS:        400  HIT:        100  MISS: 300\n";
        let unscoped = MetricExtractor::new().extract(report).unwrap();
        assert_eq!(unscoped.accesses, 900);

        let scoped = MetricExtractor::scoped("LLC TOTAL").unwrap().extract(report).unwrap();
        assert_eq!(scoped, HitStats { accesses: 400, hits: 100 });
        assert_abs_diff_eq!(scoped.hit_rate(), 0.25);
    }

    #[test]
    fn test_report_tail_is_bounded() {
        let report = "x".repeat(2000);
        let err = MetricExtractor::new().extract(&report).unwrap_err();
        assert_eq!(err.tail.len(), REPORT_TAIL_CHARS);
    }
}
