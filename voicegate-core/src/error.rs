use thiserror::Error;

/// All errors produced by voicegate-core.
#[derive(Debug, Error)]
pub enum VoicegateError {
    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VoicegateError>;
