use std::path::Path;

use crate::output;

pub fn run(root: &Path, thread_id: &str, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(root)?;
    let orch = super::build_orchestrator(root, &config)?;
    orch.archive(thread_id)?;

    if json {
        output::print_json(&serde_json::json!({ "archived": thread_id }))?;
    } else {
        println!("archived {thread_id}");
    }
    Ok(())
}
