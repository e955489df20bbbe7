use std::path::Path;

use crate::output;

pub fn run(root: &Path, thread_id: &str, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let orch = super::build_orchestrator(root, &config)?;
    let run = orch.cancel(thread_id)?;

    if json {
        output::print_json(&run.status())?;
    } else {
        output::print_status(&run.status());
    }
    Ok(())
}
