// src/core/aggregator.rs

//! Folds probe results into a verdict and assembles the final report.

use tracing::debug;

use crate::core::models::{ProbeResult, Report, RiskLevel, Target, Verdict};

/// Sums the score contributions (clamped to `score_cap`), bands the total and
/// concatenates warnings in the order the results are given.
///
/// Warnings are neither deduplicated nor sorted: registration order first,
/// then the order each probe emitted them.
pub fn aggregate(results: &[ProbeResult], score_cap: u32) -> Verdict {
    let raw_total = results
        .iter()
        .fold(0u32, |acc, r| acc.saturating_add(r.score_contribution));
    let total_score = raw_total.min(score_cap);

    let warnings: Vec<String> = results.iter().flat_map(|r| r.warnings.iter().cloned()).collect();

    debug!(raw_total, total_score, warnings = warnings.len(), "Aggregated probe results.");
    Verdict {
        total_score,
        risk_level: RiskLevel::from_score(total_score),
        warnings,
    }
}

pub fn assemble_report(target: Target, results: Vec<ProbeResult>, score_cap: u32) -> Report {
    let verdict = aggregate(&results, score_cap);
    Report::new(target, results, verdict)
}
