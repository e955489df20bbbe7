use std::path::Path;

use anyhow::Context;
use conveyor_core::config::RunConfig;

use crate::output;

pub fn run(
    root: &Path,
    task: &str,
    config_file: Option<&Path>,
    rigidity: Option<f64>,
    worker: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = match config_file {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => super::load_config(root)?,
    };
    if let Some(r) = rigidity {
        config.rigidity = r;
    }
    if let Some(w) = worker {
        config.worker = w.to_string();
    }

    let orch = super::build_orchestrator(root, &config)?;
    let thread_id = orch.start(task, config)?;
    let status = orch.status(&thread_id)?;

    if json {
        output::print_json(&status)?;
    } else {
        output::print_status(&status);
    }
    Ok(())
}
