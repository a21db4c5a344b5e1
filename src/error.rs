use std::sync::PoisonError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockError {
    #[error("{0}")]
    Error(String),

    #[error("StdSyncPoisonError {0}")]
    StdSyncPoisonError(String),

    #[error("No display available")]
    NoDisplay,

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Desktop entry not found: {0}")]
    DesktopEntryNotFound(String),

    #[error("Scratch file error: {0}")]
    Scratch(String),

    #[error("Configuration store error: {0}")]
    ConfigStore(String),

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Backend disconnected")]
    BackendGone,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DockError {
    pub fn new<S: ToString>(err: S) -> Self {
        DockError::Error(err.to_string())
    }
}

pub type DockResult<T> = Result<T, DockError>;

impl<T> From<PoisonError<T>> for DockError {
    fn from(value: PoisonError<T>) -> Self {
        DockError::StdSyncPoisonError(value.to_string())
    }
}
