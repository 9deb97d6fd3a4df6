use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Core(#[from] clausegraph_core::CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] clausegraph_storage::StorageError),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Returned for both unknown runs and runs owned by another tenant, so
    /// existence never leaks across the tenant boundary.
    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
