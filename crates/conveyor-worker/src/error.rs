use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerSetupError {
    #[error("worker executable not found: {0}")]
    ExecutableNotFound(String),
}
