//! Drives the stage graph.
//!
//! The orchestrator sequences stage execution, applies quality-gate
//! decisions, suspends at checkpoints, and terminates runs in `Complete` or
//! `Aborted`. Execution within one run is strictly sequential: a per-thread
//! in-flight guard rejects interleaved `step`/`resume` calls with `RunBusy`.
//! Distinct threads are independent; the checkpoint store is the only
//! shared resource.

use crate::checkpoint::CheckpointStore;
use crate::config::RunConfig;
use crate::error::{ConveyorError, Result};
use crate::gate;
use crate::gateway::ToolGateway;
use crate::output::StageOutput;
use crate::run::{RunErrorKind, RunStatus, StageAttemptOutcome, WorkflowRun};
use crate::types::{GateDecision, Stage, StagePointer};
use crate::worker::{ContextEntry, StageWorker, WorkerFailure, WorkerRegistry, WorkerRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

// ---------------------------------------------------------------------------
// HumanDecision
// ---------------------------------------------------------------------------

/// The resume payload: what the human decided about a suspended run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum HumanDecision {
    /// Accept and continue. `grants` become the capability approvals for
    /// the new checkpoint cycle.
    Approve {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        grants: Vec<String>,
    },
    /// Refuse. Aborts the run unless the configuration names a re-entry
    /// stage.
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Adjust the permitted configuration fields and re-enter the suspended
    /// stage with a fresh iteration budget.
    Modify {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rigidity: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_iterations: Option<u32>,
    },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    store: CheckpointStore,
    workers: WorkerRegistry,
    gateway: ToolGateway,
    in_flight: Mutex<BTreeSet<String>>,
    cancel_requested: Mutex<BTreeSet<String>>,
}

fn lock(m: &Mutex<BTreeSet<String>>) -> MutexGuard<'_, BTreeSet<String>> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes the thread id from the in-flight set when the call returns.
struct FlightGuard<'a> {
    set: &'a Mutex<BTreeSet<String>>,
    thread_id: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.thread_id);
    }
}

impl Orchestrator {
    pub fn new(store: CheckpointStore, workers: WorkerRegistry, gateway: ToolGateway) -> Self {
        Self {
            store,
            workers,
            gateway,
            in_flight: Mutex::new(BTreeSet::new()),
            cancel_requested: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn gateway(&self) -> &ToolGateway {
        &self.gateway
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Create a run and execute it until it completes, aborts, or suspends
    /// at a checkpoint. Returns the new thread id.
    pub fn start(&self, task_description: impl Into<String>, config: RunConfig) -> Result<String> {
        config.validate()?;
        let worker = self.workers.resolve(&config.worker)?;
        self.validate_capabilities(&config)?;

        let mut run = WorkflowRun::new(task_description, config);
        let thread_id = run.thread_id.clone();
        self.store.save(&run)?;

        let _guard = self.claim(&thread_id)?;
        self.drive(&mut run, worker.as_ref())?;
        Ok(thread_id)
    }

    /// Advance a run by exactly one stage attempt.
    pub fn step(&self, thread_id: &str) -> Result<WorkflowRun> {
        let _guard = self.claim(thread_id)?;
        let mut run = self.store.load(thread_id)?;
        self.ensure_runnable(&run)?;
        let worker = self.workers.resolve(&run.config.worker)?;
        self.execute_attempt(&mut run, worker.as_ref())?;
        self.store.save(&run)?;
        Ok(run)
    }

    /// Apply a human decision to a suspended run and continue execution.
    pub fn resume(&self, thread_id: &str, decision: HumanDecision) -> Result<WorkflowRun> {
        let _guard = self.claim(thread_id)?;
        let mut run = self.store.load(thread_id)?;
        if !run.pending_approval {
            return Err(ConveyorError::NotSuspended(thread_id.to_string()));
        }

        let escalated = run.suspended_by_escalation();
        match decision {
            HumanDecision::Approve { grants } => {
                for grant in &grants {
                    if !self.gateway.registry().contains(grant) {
                        return Err(ConveyorError::UnknownCapability(grant.clone()));
                    }
                }
                run.pending_approval = false;
                run.approved_capabilities.extend(grants);
                if escalated {
                    // The human accepted the output the gate rejected.
                    run.advance();
                } else if let StagePointer::Stage(stage) = run.current_stage {
                    run.cleared_checkpoint = Some(stage);
                }
                run.touch();
            }
            HumanDecision::Reject { reason } => {
                let message = reason.unwrap_or_else(|| "checkpoint rejected".to_string());
                run.record_error(RunErrorKind::Rejected, run.current_stage.stage(), &message);
                match run.config.reentry_on_reject {
                    Some(target) => run.reenter(target),
                    None => run.abort(),
                }
            }
            HumanDecision::Modify {
                rigidity,
                max_iterations,
            } => {
                if let Some(r) = rigidity {
                    if !r.is_finite() || !(0.0..=1.0).contains(&r) {
                        return Err(ConveyorError::Configuration(format!(
                            "rigidity {r} is outside [0.0, 1.0]"
                        )));
                    }
                    run.config.rigidity = r;
                }
                if let Some(m) = max_iterations {
                    if m == 0 {
                        return Err(ConveyorError::Configuration(
                            "max_iterations must be at least 1".to_string(),
                        ));
                    }
                    run.config.max_iterations = m;
                }
                run.pending_approval = false;
                if let StagePointer::Stage(stage) = run.current_stage {
                    run.iteration_counts.remove(&stage);
                    run.cleared_checkpoint = Some(stage);
                }
                run.touch();
            }
        }
        self.store.save(&run)?;

        if !run.pending_approval && !run.current_stage.is_terminal() {
            let worker = self.workers.resolve(&run.config.worker)?;
            self.drive(&mut run, worker.as_ref())?;
        }
        Ok(run)
    }

    /// Cancel a run at a stage boundary. If the run is executing, the
    /// in-flight attempt completes but its result is discarded.
    pub fn cancel(&self, thread_id: &str) -> Result<WorkflowRun> {
        if !self.store.exists(thread_id)? {
            return Err(ConveyorError::NotFound(thread_id.to_string()));
        }
        match self.claim(thread_id) {
            Ok(_guard) => {
                let mut run = self.store.load(thread_id)?;
                if run.current_stage.is_terminal() {
                    return Err(ConveyorError::RunTerminal(thread_id.to_string()));
                }
                run.record_error(
                    RunErrorKind::Cancelled,
                    run.current_stage.stage(),
                    "run cancelled",
                );
                run.abort();
                self.store.save(&run)?;
                Ok(run)
            }
            Err(ConveyorError::RunBusy(_)) => {
                // The drive loop honors the flag at the next stage boundary.
                lock(&self.cancel_requested).insert(thread_id.to_string());
                self.store.load(thread_id)
            }
            Err(e) => Err(e),
        }
    }

    pub fn status(&self, thread_id: &str) -> Result<RunStatus> {
        Ok(self.store.load(thread_id)?.status())
    }

    pub fn list(&self) -> Result<Vec<RunStatus>> {
        let mut statuses = Vec::new();
        for id in self.store.list_ids()? {
            statuses.push(self.store.load(&id)?.status());
        }
        Ok(statuses)
    }

    /// Remove a terminal run from the store.
    pub fn archive(&self, thread_id: &str) -> Result<()> {
        let run = self.store.load(thread_id)?;
        if !run.current_stage.is_terminal() {
            return Err(ConveyorError::RunActive(thread_id.to_string()));
        }
        self.store.delete(thread_id)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    fn drive(&self, run: &mut WorkflowRun, worker: &dyn StageWorker) -> Result<()> {
        loop {
            if run.pending_approval || run.current_stage.is_terminal() {
                break;
            }
            if self.take_cancel(&run.thread_id) {
                run.record_error(
                    RunErrorKind::Cancelled,
                    run.current_stage.stage(),
                    "run cancelled",
                );
                run.abort();
                self.store.save(run)?;
                break;
            }
            self.execute_attempt(run, worker)?;
            self.store.save(run)?;
        }
        Ok(())
    }

    /// One stage attempt: fast-forward skipped stages, suspend on checkpoint
    /// arrival, otherwise invoke the worker and apply the gate.
    fn execute_attempt(&self, run: &mut WorkflowRun, worker: &dyn StageWorker) -> Result<()> {
        let stage = loop {
            match run.current_stage {
                StagePointer::Stage(s) if run.config.is_skipped(s) => run.advance(),
                StagePointer::Stage(s) => break s,
                _ => return Ok(()),
            }
        };

        if run.config.is_checkpoint(stage) && run.cleared_checkpoint != Some(stage) {
            run.suspend();
            return Ok(());
        }

        let context = run.accumulated_context();
        let request = WorkerRequest {
            stage,
            task: run.task_description.clone(),
            context: context.clone(),
            capabilities: run.config.bindings_for(stage).to_vec(),
        };

        loop {
            let tools = self.gateway.bind(
                request.capabilities.iter().cloned(),
                run.pre_authorized_set(),
                run.cycle_approved_set(),
            );
            let result = worker.execute(&request, &tools);

            if self.take_cancel(&run.thread_id) {
                // The attempt finished, but the run was cancelled at this
                // boundary: discard the result.
                run.record_error(
                    RunErrorKind::Cancelled,
                    Some(stage),
                    "run cancelled; in-flight stage result discarded",
                );
                run.abort();
                return Ok(());
            }
            run.tool_log.extend(tools.take_log());

            match result {
                Ok(output) => {
                    self.apply_gate(run, stage, context, output);
                    return Ok(());
                }
                Err(WorkerFailure::Malformed { message }) => {
                    self.apply_malformed(run, stage, context, message);
                    return Ok(());
                }
                Err(WorkerFailure::Fatal { message }) => {
                    let attempt = run.next_attempt_number(stage);
                    run.push_record(
                        stage,
                        attempt,
                        context,
                        StageAttemptOutcome::Failure {
                            failure: WorkerFailure::Fatal {
                                message: message.clone(),
                            },
                        },
                        GateDecision::NotEvaluated,
                    );
                    run.record_error(RunErrorKind::Fatal, Some(stage), &message);
                    run.abort();
                    return Ok(());
                }
                Err(WorkerFailure::Transient { message }) => {
                    let failures = run.bump_transient(stage);
                    let attempt = run.next_attempt_number(stage);
                    run.push_record(
                        stage,
                        attempt,
                        context.clone(),
                        StageAttemptOutcome::Failure {
                            failure: WorkerFailure::Transient {
                                message: message.clone(),
                            },
                        },
                        GateDecision::NotEvaluated,
                    );
                    run.record_error(RunErrorKind::Transient, Some(stage), &message);
                    if failures > run.config.transient_retry_cap {
                        run.record_error(
                            RunErrorKind::Fatal,
                            Some(stage),
                            &format!("transient retries exhausted after {failures} failures"),
                        );
                        run.abort();
                        return Ok(());
                    }
                    self.backoff(run, failures);
                }
            }
        }
    }

    fn apply_gate(
        &self,
        run: &mut WorkflowRun,
        stage: Stage,
        context: Vec<ContextEntry>,
        output: StageOutput,
    ) {
        let attempt = run.next_attempt_number(stage);
        let rigidity = run.config.rigidity;

        if !run.config.is_gated(stage) || rigidity <= 0.0 {
            run.push_record(
                stage,
                attempt,
                context,
                StageAttemptOutcome::Output { output },
                GateDecision::NotEvaluated,
            );
            run.advance();
            return;
        }

        let iteration = run.bump_iteration(stage);
        let cap = run.config.max_iterations_for(stage);
        let verdict = gate::evaluate(&output, iteration, rigidity, cap, run.config.well_formed);

        // Hard cap, enforced independently of the gate's own logic: a retry
        // past the configured budget becomes an escalation, never a silent
        // extra iteration.
        let (decision, reason) = if verdict.decision == GateDecision::Retry && iteration >= cap {
            (
                GateDecision::Escalate,
                format!("iteration cap {cap} reached: {}", verdict.reason),
            )
        } else {
            (verdict.decision, verdict.reason)
        };

        run.push_record(
            stage,
            attempt,
            context,
            StageAttemptOutcome::Output { output },
            decision,
        );
        match decision {
            GateDecision::Advance => run.advance(),
            GateDecision::Retry => {
                run.current_stage = StagePointer::Stage(stage.retry_target());
                run.touch();
            }
            GateDecision::Escalate => {
                run.record_error(RunErrorKind::Escalated, Some(stage), &reason);
                run.suspend();
            }
            GateDecision::NotEvaluated => {}
        }
    }

    /// Output that failed to parse into the structured schema: a failure
    /// regardless of rigidity, consuming one iteration. There is no output
    /// to rework, so the retry re-invokes the same stage; at the cap the
    /// run escalates rather than advancing with nothing.
    fn apply_malformed(
        &self,
        run: &mut WorkflowRun,
        stage: Stage,
        context: Vec<ContextEntry>,
        message: String,
    ) {
        let attempt = run.next_attempt_number(stage);
        let iteration = run.bump_iteration(stage);
        let cap = run.config.max_iterations_for(stage);
        run.record_error(RunErrorKind::Malformed, Some(stage), &message);

        let decision = if iteration >= cap {
            GateDecision::Escalate
        } else {
            GateDecision::Retry
        };
        run.push_record(
            stage,
            attempt,
            context,
            StageAttemptOutcome::Failure {
                failure: WorkerFailure::Malformed { message },
            },
            decision,
        );
        if decision == GateDecision::Escalate {
            run.record_error(
                RunErrorKind::Escalated,
                Some(stage),
                &format!("malformed output after {iteration} iterations"),
            );
            run.suspend();
        }
    }

    // -----------------------------------------------------------------------
    // Guards and helpers
    // -----------------------------------------------------------------------

    fn claim(&self, thread_id: &str) -> Result<FlightGuard<'_>> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(thread_id.to_string()) {
            return Err(ConveyorError::RunBusy(thread_id.to_string()));
        }
        Ok(FlightGuard {
            set: &self.in_flight,
            thread_id: thread_id.to_string(),
        })
    }

    fn take_cancel(&self, thread_id: &str) -> bool {
        lock(&self.cancel_requested).remove(thread_id)
    }

    fn ensure_runnable(&self, run: &WorkflowRun) -> Result<()> {
        if run.current_stage.is_terminal() {
            return Err(ConveyorError::RunTerminal(run.thread_id.clone()));
        }
        if run.pending_approval {
            return Err(ConveyorError::ApprovalPending(run.thread_id.clone()));
        }
        Ok(())
    }

    fn validate_capabilities(&self, config: &RunConfig) -> Result<()> {
        let registry = self.gateway.registry();
        for id in &config.pre_authorized {
            if !registry.contains(id) {
                return Err(ConveyorError::Configuration(format!(
                    "pre-authorized capability '{id}' is not declared"
                )));
            }
        }
        for (stage, capabilities) in &config.capability_bindings {
            for id in capabilities {
                if !registry.contains(id) {
                    return Err(ConveyorError::Configuration(format!(
                        "capability '{id}' bound to {stage} is not declared"
                    )));
                }
            }
        }
        Ok(())
    }

    fn backoff(&self, run: &WorkflowRun, failures: u32) {
        let base = run.config.retry_backoff_ms;
        if base == 0 {
            return;
        }
        let exponent = failures.saturating_sub(1).min(6);
        std::thread::sleep(Duration::from_millis(base.saturating_mul(1 << exponent)));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
