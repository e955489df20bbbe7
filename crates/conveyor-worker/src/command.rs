//! Subprocess invocation of an external stage worker.
//!
//! Protocol: one JSON document on stdin, one JSON document on stdout.
//! Stderr flows through so worker log lines appear in the terminal.
//!
//! Failure classification:
//! - spawn or pipe I/O error → `Transient` (retried with backoff)
//! - non-zero exit → `Fatal` (aborts the run)
//! - exit 0 with unparseable stdout → `Malformed` (consumes a gate iteration)

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::debug;

use conveyor_core::gateway::BoundGateway;
use conveyor_core::output::StageOutput;
use conveyor_core::types::Stage;
use conveyor_core::worker::{ContextEntry, StageWorker, WorkerFailure, WorkerRequest};

use crate::error::WorkerSetupError;
use crate::instructions;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// The document written to the worker's stdin: the orchestrator's request
/// plus the stage instruction set.
#[derive(Serialize)]
struct WireRequest<'a> {
    stage: Stage,
    instructions: &'static str,
    task: &'a str,
    context: &'a [ContextEntry],
    capabilities: &'a [String],
}

// ---------------------------------------------------------------------------
// CommandWorker
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CommandWorker {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandWorker {
    /// Resolve `program` on PATH. A missing executable is a setup fault
    /// surfaced before any run starts, not a per-stage failure.
    pub fn new(program: impl AsRef<str>) -> Result<Self, WorkerSetupError> {
        let program = program.as_ref();
        let resolved = which::which(program)
            .map_err(|_| WorkerSetupError::ExecutableNotFound(program.to_string()))?;
        Ok(Self {
            program: resolved,
            args: Vec::new(),
        })
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Build a worker from a whitespace-separated command line
    /// (`"claude-pipe --json"` → program `claude-pipe`, one argument).
    pub fn from_command_line(line: &str) -> Result<Self, WorkerSetupError> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| WorkerSetupError::ExecutableNotFound(line.to_string()))?;
        Ok(Self::new(program)?.with_args(parts.map(str::to_string)))
    }
}

impl StageWorker for CommandWorker {
    fn execute(
        &self,
        request: &WorkerRequest,
        _tools: &BoundGateway<'_>,
    ) -> Result<StageOutput, WorkerFailure> {
        let payload = serde_json::to_string(&WireRequest {
            stage: request.stage,
            instructions: instructions::for_stage(request.stage),
            task: &request.task,
            context: &request.context,
            capabilities: &request.capabilities,
        })
        .map_err(|e| WorkerFailure::Fatal {
            message: format!("failed to encode worker request: {e}"),
        })?;

        debug!(stage = %request.stage, program = %self.program.display(), "spawning stage worker");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| WorkerFailure::Transient {
                message: format!("failed to spawn worker: {e}"),
            })?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(payload.as_bytes())
                .map_err(|e| WorkerFailure::Transient {
                    message: format!("failed to write worker stdin: {e}"),
                })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| WorkerFailure::Transient {
                message: format!("failed to collect worker output: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let hint: String = stdout.chars().take(500).collect();
            return Err(WorkerFailure::Fatal {
                message: format!("worker exited with {}: {hint}", output.status),
            });
        }

        serde_json::from_str(stdout.trim()).map_err(|e| WorkerFailure::Malformed {
            message: format!("worker stdout did not parse as a stage output: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
