use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConveyorError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("workflow run not found: {0}")]
    NotFound(String),

    #[error("run {0} is not suspended at a checkpoint")]
    NotSuspended(String),

    #[error("run {0} is awaiting approval: resolve it with resume")]
    ApprovalPending(String),

    #[error("run {0} already reached a terminal state")]
    RunTerminal(String),

    #[error("run {0} has not reached a terminal state")]
    RunActive(String),

    #[error("run {0} is currently executing")]
    RunBusy(String),

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("invalid identifier '{0}': must be lowercase alphanumeric with hyphens or underscores")]
    InvalidIdentifier(String),

    #[error("checkpoint store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConveyorError>;
