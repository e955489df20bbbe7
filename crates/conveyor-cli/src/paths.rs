use std::path::{Path, PathBuf};

pub const CONVEYOR_DIR: &str = ".conveyor";
pub const CONFIG_FILE: &str = ".conveyor/config.yaml";
pub const DB_FILE: &str = ".conveyor/runs.redb";

pub fn conveyor_dir(root: &Path) -> PathBuf {
    root.join(CONVEYOR_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}
