use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stride_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Title cannot be empty")]
    EmptyTitle,
    #[error("Invalid date '{0}': use YYYY-MM-DD, today, tomorrow or yesterday")]
    InvalidDate(String),
    #[error("No {0} found for id/prefix: {1}")]
    NotFound(&'static str, String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Invalid conflict choice '{0}': use kind:id=local|server")]
    InvalidChoice(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `stride config init --sync-url <URL>` or set STRIDE_SYNC_URL."
    )]
    SyncNotConfigured,
    #[error("Sync failed: {0}")]
    SyncFailed(String),
}
