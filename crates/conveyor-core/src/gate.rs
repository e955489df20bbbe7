//! Quality gate controller.
//!
//! Decides whether a gated stage's output is acceptable, by rigidity band.
//! Bands include their lower bound and exclude their upper, except the top
//! band which is closed. The orchestrator enforces the configured iteration
//! cap independently of this logic.

use crate::config::WellFormedRule;
use crate::output::StageOutput;
use crate::types::GateDecision;

// ---------------------------------------------------------------------------
// GateVerdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub decision: GateDecision,
    pub reason: String,
}

impl GateVerdict {
    fn new(decision: GateDecision, reason: impl Into<String>) -> Self {
        Self {
            decision,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

pub fn well_formed(output: &StageOutput, rule: WellFormedRule) -> bool {
    match rule {
        WellFormedRule::ArtifactPresent => !output.artifacts.is_empty(),
        WellFormedRule::NonEmptySummary => !output.summary.trim().is_empty(),
    }
}

/// Evaluate one gated attempt.
///
/// `attempt` is the 1-indexed iteration just consumed for this stage.
/// `max_iterations` only governs the top band; the lower bands carry their
/// own effective caps (1, 2, and 3 attempts respectively).
pub fn evaluate(
    output: &StageOutput,
    attempt: u32,
    rigidity: f64,
    max_iterations: u32,
    rule: WellFormedRule,
) -> GateVerdict {
    if rigidity <= 0.0 {
        // Normally unreached: the orchestrator skips evaluation entirely at
        // rigidity zero so no iteration is consumed.
        return GateVerdict::new(GateDecision::Advance, "gating disabled");
    }

    if rigidity < 0.4 {
        if well_formed(output, rule) {
            return GateVerdict::new(GateDecision::Advance, "well-formed output accepted");
        }
        return GateVerdict::new(
            GateDecision::Advance,
            "output not well-formed, but the effective iteration cap at this rigidity is 1; forcing advance",
        );
    }

    if rigidity < 0.8 {
        let allowed_attempts = if rigidity < 0.6 { 2 } else { 3 };
        if well_formed(output, rule) && !output.has_critical_issue() {
            return GateVerdict::new(
                GateDecision::Advance,
                "well-formed output with no critical issues",
            );
        }
        if attempt < allowed_attempts {
            return GateVerdict::new(GateDecision::Retry, rejection_reason(output, rule));
        }
        return GateVerdict::new(
            GateDecision::Advance,
            format!("retries exhausted after {attempt} attempts; forcing advance"),
        );
    }

    // 0.8..=1.0: only an explicit pass advances; never force.
    if output.explicit_pass() {
        return GateVerdict::new(GateDecision::Advance, "worker reported an explicit pass");
    }
    if attempt < max_iterations {
        return GateVerdict::new(GateDecision::Retry, rejection_reason(output, rule));
    }
    GateVerdict::new(
        GateDecision::Escalate,
        format!("no explicit pass after {attempt} attempts"),
    )
}

fn rejection_reason(output: &StageOutput, rule: WellFormedRule) -> String {
    if !well_formed(output, rule) {
        return "output is not structurally well-formed".to_string();
    }
    let critical: Vec<&str> = output
        .issues
        .iter()
        .filter(|i| i.severity == crate::output::Severity::Critical)
        .map(|i| i.message.as_str())
        .collect();
    if critical.is_empty() {
        "worker did not report an explicit pass".to_string()
    } else {
        format!("critical issues flagged: {}", critical.join("; "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
