use std::path::Path;

use crate::output;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let orch = super::build_orchestrator(root, &config)?;
    let statuses = orch.list()?;

    if json {
        output::print_json(&statuses)?;
        return Ok(());
    }

    let rows = statuses
        .iter()
        .map(|s| {
            vec![
                s.thread_id.clone(),
                s.current_stage.to_string(),
                if s.pending_approval { "pending" } else { "-" }.to_string(),
                s.stages.len().to_string(),
                s.errors.len().to_string(),
            ]
        })
        .collect();
    output::print_table(&["THREAD", "STAGE", "APPROVAL", "ATTEMPTS", "ERRORS"], rows);
    Ok(())
}
