use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Root already registered: {0}")]
    AlreadyRegistered(PathBuf),

    #[error("Root not registered: {0}")]
    NotRegistered(PathBuf),

    #[error("Watch subscription failed: {0}")]
    WatchInit(String),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
