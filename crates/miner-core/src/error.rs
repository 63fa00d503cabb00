use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("indexer RPC failed: {0}")]
    Indexer(String),

    #[error("monitor backend error: {0}")]
    Monitor(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("another instance is already running")]
    AlreadyRunning,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MinerError>;
