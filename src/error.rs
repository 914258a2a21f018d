//! Error types for queuectl.

use thiserror::Error;

use crate::model::State;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job already exists: {0}")]
    DuplicateJob(String),

    #[error("job {id} is not in the DLQ (state: {state})")]
    NotInDlq { id: String, state: State },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// The worker no longer owns the processing lease on this job.
    #[error("lease lost on job {0}")]
    LeaseLost(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
