//! The Stage Worker seam.
//!
//! Workers wrap a language-model call (or any other black box) behind a
//! synchronous trait: request in, structured output or typed failure out.
//! Implementations are looked up in a [`WorkerRegistry`] resolved once at
//! `start`, never per call.

use crate::config::validate_identifier;
use crate::error::{ConveyorError, Result};
use crate::gateway::BoundGateway;
use crate::output::{Artifact, StageOutput, Verdict};
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ContextEntry / WorkerRequest
// ---------------------------------------------------------------------------

/// One accumulated-context item: what an earlier attempt produced, and
/// whether the gate rejected it. Rejected entries carry the flagged issues
/// so the worker sees what was rejected and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub stage: Stage,
    pub attempt: u32,
    pub summary: String,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// Everything a worker sees for one stage attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub stage: Stage,
    pub task: String,
    pub context: Vec<ContextEntry>,
    /// Capability ids the stage may invoke through the bound gateway.
    pub capabilities: Vec<String>,
}

// ---------------------------------------------------------------------------
// WorkerFailure
// ---------------------------------------------------------------------------

/// Typed worker failure. `Transient` is retried with backoff, `Fatal`
/// aborts the run, `Malformed` consumes a gate iteration like any other
/// rejected output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerFailure {
    Transient { message: String },
    Fatal { message: String },
    Malformed { message: String },
}

impl WorkerFailure {
    pub fn message(&self) -> &str {
        match self {
            WorkerFailure::Transient { message }
            | WorkerFailure::Fatal { message }
            | WorkerFailure::Malformed { message } => message,
        }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerFailure::Transient { message } => write!(f, "transient: {message}"),
            WorkerFailure::Fatal { message } => write!(f, "fatal: {message}"),
            WorkerFailure::Malformed { message } => write!(f, "malformed output: {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// StageWorker
// ---------------------------------------------------------------------------

pub trait StageWorker: Send + Sync {
    fn execute(
        &self,
        request: &WorkerRequest,
        tools: &BoundGateway<'_>,
    ) -> std::result::Result<StageOutput, WorkerFailure>;
}

// ---------------------------------------------------------------------------
// WorkerRegistry
// ---------------------------------------------------------------------------

/// Maps worker-selection ids to implementations. Built by the embedding
/// binary; the orchestrator resolves `config.worker` against it at `start`.
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: BTreeMap<String, Arc<dyn StageWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, worker: Arc<dyn StageWorker>) -> Result<()> {
        let id = id.into();
        validate_identifier(&id)?;
        self.workers.insert(id, worker);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workers.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    /// Resolve a worker id; an unknown id is a configuration fault.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn StageWorker>> {
        self.workers
            .get(id)
            .cloned()
            .ok_or_else(|| ConveyorError::Configuration(format!("unknown worker '{id}'")))
    }
}

// ---------------------------------------------------------------------------
// EchoWorker
// ---------------------------------------------------------------------------

/// Built-in worker that acknowledges every stage with a passing artifact.
/// Useful for smoke-testing a pipeline configuration without a model.
pub struct EchoWorker;

impl StageWorker for EchoWorker {
    fn execute(
        &self,
        request: &WorkerRequest,
        _tools: &BoundGateway<'_>,
    ) -> std::result::Result<StageOutput, WorkerFailure> {
        Ok(StageOutput {
            summary: format!("{} acknowledged: {}", request.stage, request.task),
            artifacts: vec![Artifact::named(format!("{}.md", request.stage))],
            issues: Vec::new(),
            verdict: Some(Verdict::Pass),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
