use std::path::Path;

use conveyor_core::config::RunConfig;
use conveyor_core::io;

use crate::output;
use crate::paths;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    io::ensure_dir(&paths::conveyor_dir(root))?;

    let config_path = paths::config_path(root);
    let default_yaml = serde_yaml::to_string(&RunConfig::default())?;
    let created = io::write_if_missing(&config_path, default_yaml.as_bytes())?;

    if json {
        output::print_json(&serde_json::json!({
            "config": config_path,
            "created": created,
        }))?;
    } else if created {
        println!("initialized conveyor ({})", config_path.display());
    } else {
        println!("already initialized ({})", config_path.display());
    }
    Ok(())
}
