pub mod archive;
pub mod cancel;
pub mod capabilities;
pub mod init;
pub mod list;
pub mod resume;
pub mod start;
pub mod status;
pub mod step;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use conveyor_core::checkpoint::CheckpointStore;
use conveyor_core::config::RunConfig;
use conveyor_core::gateway::ToolGateway;
use conveyor_core::orchestrator::Orchestrator;
use conveyor_core::worker::{EchoWorker, WorkerRegistry};
use conveyor_worker::CommandWorker;

use crate::paths;

/// Load the project run configuration, falling back to defaults when the
/// project has no config file.
pub fn load_config(root: &Path) -> anyhow::Result<RunConfig> {
    let path = paths::config_path(root);
    if path.exists() {
        RunConfig::load(&path).with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(RunConfig::default())
    }
}

/// Open the checkpoint store and assemble the worker registry and gateway.
///
/// Two workers are always available: `echo` (built-in smoke worker) and,
/// when the configuration names a `worker_command`, `command` (the
/// subprocess adapter).
pub fn build_orchestrator(root: &Path, config: &RunConfig) -> anyhow::Result<Orchestrator> {
    let store = CheckpointStore::open(&paths::db_path(root))?;
    let mut workers = WorkerRegistry::new();
    workers.register("echo", Arc::new(EchoWorker))?;
    if let Some(line) = &config.worker_command {
        workers.register("command", Arc::new(CommandWorker::from_command_line(line)?))?;
    }
    Ok(Orchestrator::new(store, workers, ToolGateway::builtin()))
}
