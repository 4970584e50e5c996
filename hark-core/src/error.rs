use thiserror::Error;

/// All errors produced by hark-core.
#[derive(Debug, Error)]
pub enum HarkError {
    #[error("serial device error: {0}")]
    SerialDevice(String),

    #[error("reference dictionary is empty — build one before classifying")]
    EmptyDictionary,

    #[error("feature dimension mismatch: candidate has {candidate}, dictionary has {dictionary}")]
    DimensionMismatch {
        candidate: usize,
        dictionary: usize,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HarkError>;
