use crate::config::RunConfig;
use crate::gateway::ToolInvocation;
use crate::output::StageOutput;
use crate::types::{GateDecision, Stage, StagePointer};
use crate::worker::{ContextEntry, WorkerFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    Transient,
    Fatal,
    Malformed,
    Escalated,
    Rejected,
    Cancelled,
}

impl std::fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunErrorKind::Transient => "transient",
            RunErrorKind::Fatal => "fatal",
            RunErrorKind::Malformed => "malformed",
            RunErrorKind::Escalated => "escalated",
            RunErrorKind::Rejected => "rejected",
            RunErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One recorded failure. Non-fatal failures never clear prior entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StageRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageAttemptOutcome {
    Output { output: StageOutput },
    Failure { failure: WorkerFailure },
}

/// Immutable snapshot of one stage attempt. History records are never
/// mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub attempt: u32,
    pub input_context: Vec<ContextEntry>,
    pub outcome: StageAttemptOutcome,
    pub gate_decision: GateDecision,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkflowRun
// ---------------------------------------------------------------------------

/// One execution of the pipeline for one task. Plain structured data —
/// no live handles — so a suspended run survives process restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub thread_id: String,
    pub task_description: String,
    pub current_stage: StagePointer,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_history: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub iteration_counts: BTreeMap<Stage, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transient_failures: BTreeMap<Stage, u32>,
    pub config: RunConfig,
    #[serde(default)]
    pub pending_approval: bool,
    /// Capabilities granted for the active checkpoint cycle; cleared on
    /// each new suspension.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub approved_capabilities: BTreeSet<String>,
    /// Checkpoint stage the latest `resume` cleared; revisiting a
    /// checkpoint after moving on suspends again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared_checkpoint: Option<Stage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_log: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RunError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(task_description: impl Into<String>, config: RunConfig) -> Self {
        let now = Utc::now();
        Self {
            thread_id: Uuid::new_v4().to_string(),
            task_description: task_description.into(),
            current_stage: StagePointer::Stage(Stage::Requirements),
            stage_history: Vec::new(),
            iteration_counts: BTreeMap::new(),
            transient_failures: BTreeMap::new(),
            config,
            pending_approval: false,
            approved_capabilities: BTreeSet::new(),
            cleared_checkpoint: None,
            tool_log: Vec::new(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    pub fn iteration(&self, stage: Stage) -> u32 {
        self.iteration_counts.get(&stage).copied().unwrap_or(0)
    }

    /// Consume one gate iteration; returns the new count.
    pub fn bump_iteration(&mut self, stage: Stage) -> u32 {
        let count = self.iteration_counts.entry(stage).or_insert(0);
        *count += 1;
        *count
    }

    pub fn transient_count(&self, stage: Stage) -> u32 {
        self.transient_failures.get(&stage).copied().unwrap_or(0)
    }

    pub fn bump_transient(&mut self, stage: Stage) -> u32 {
        let count = self.transient_failures.entry(stage).or_insert(0);
        *count += 1;
        *count
    }

    /// 1-indexed ordinal of the next attempt for `stage`, counting every
    /// record (gate-evaluated or not).
    pub fn next_attempt_number(&self, stage: Stage) -> u32 {
        self.stage_history.iter().filter(|r| r.stage == stage).count() as u32 + 1
    }

    // -----------------------------------------------------------------------
    // Mutations (orchestrator-mediated only)
    // -----------------------------------------------------------------------

    pub fn push_record(
        &mut self,
        stage: Stage,
        attempt: u32,
        input_context: Vec<ContextEntry>,
        outcome: StageAttemptOutcome,
        gate_decision: GateDecision,
    ) {
        self.stage_history.push(StageRecord {
            stage,
            attempt,
            input_context,
            outcome,
            gate_decision,
            timestamp: Utc::now(),
        });
        self.touch();
    }

    pub fn record_error(&mut self, kind: RunErrorKind, stage: Option<Stage>, message: &str) {
        self.errors.push(RunError {
            kind,
            stage,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        self.touch();
    }

    /// Move past the current stage: the next backbone stage, or `Complete`.
    pub fn advance(&mut self) {
        if let StagePointer::Stage(stage) = self.current_stage {
            self.cleared_checkpoint = None;
            self.current_stage = match stage.next() {
                Some(next) => StagePointer::Stage(next),
                None => StagePointer::Complete,
            };
            self.touch();
        }
    }

    /// Suspend for human approval. Opens a new checkpoint cycle, so prior
    /// cycle approvals are revoked.
    pub fn suspend(&mut self) {
        self.pending_approval = true;
        self.approved_capabilities.clear();
        self.touch();
    }

    pub fn abort(&mut self) {
        self.current_stage = StagePointer::Aborted;
        self.pending_approval = false;
        self.touch();
    }

    /// Send the run back to an earlier stage after a rejected checkpoint.
    /// Iteration budgets from the target onward are restored.
    pub fn reenter(&mut self, target: Stage) {
        self.iteration_counts.retain(|s, _| s.index() < target.index());
        self.current_stage = StagePointer::Stage(target);
        self.cleared_checkpoint = None;
        self.pending_approval = false;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn pre_authorized_set(&self) -> BTreeSet<String> {
        self.config.pre_authorized.iter().cloned().collect()
    }

    pub fn cycle_approved_set(&self) -> BTreeSet<String> {
        self.approved_capabilities.clone()
    }

    /// Context handed to the next worker: every produced output so far, with
    /// gate-rejected attempts marked and their flagged issues attached.
    pub fn accumulated_context(&self) -> Vec<ContextEntry> {
        self.stage_history
            .iter()
            .filter_map(|record| match &record.outcome {
                StageAttemptOutcome::Output { output } => {
                    let rejected = matches!(
                        record.gate_decision,
                        GateDecision::Retry | GateDecision::Escalate
                    );
                    Some(ContextEntry {
                        stage: record.stage,
                        attempt: record.attempt,
                        summary: output.summary.clone(),
                        rejected,
                        issues: if rejected {
                            output.issues.iter().map(|i| i.message.clone()).collect()
                        } else {
                            Vec::new()
                        },
                    })
                }
                StageAttemptOutcome::Failure { .. } => None,
            })
            .collect()
    }

    /// True when the run is suspended because the gate escalated the current
    /// stage (as opposed to arriving at a configured checkpoint).
    pub fn suspended_by_escalation(&self) -> bool {
        match (self.current_stage, self.stage_history.last()) {
            (StagePointer::Stage(stage), Some(record)) => {
                record.stage == stage && record.gate_decision == GateDecision::Escalate
            }
            _ => false,
        }
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            thread_id: self.thread_id.clone(),
            current_stage: self.current_stage,
            pending_approval: self.pending_approval,
            stages: self
                .stage_history
                .iter()
                .map(|record| StageSummary {
                    stage: record.stage,
                    attempt: record.attempt,
                    ok: matches!(record.outcome, StageAttemptOutcome::Output { .. }),
                    gate_decision: record.gate_decision,
                    timestamp: record.timestamp,
                })
                .collect(),
            errors: self.errors.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Read-only projection for external monitoring collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub thread_id: String,
    pub current_stage: StagePointer,
    pub pending_approval: bool,
    pub stages: Vec<StageSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RunError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub attempt: u32,
    pub ok: bool,
    pub gate_decision: GateDecision,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
