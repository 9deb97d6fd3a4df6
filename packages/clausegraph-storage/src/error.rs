use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("tenant scope violation: {0}")]
    TenantScope(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("embedding dimension mismatch: got {got}, expected {expected}")]
    DimensionMismatch { got: usize, expected: usize },

    #[error("invalid stored record: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Pool timeouts and I/O faults are retryable; constraint and data
    /// errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::PoolTimedOut)
                | StorageError::Database(sqlx::Error::Io(_))
        )
    }
}

impl From<StorageError> for clausegraph_core::CoreError {
    fn from(e: StorageError) -> Self {
        match &e {
            StorageError::TenantScope(msg) => {
                clausegraph_core::CoreError::TenantScopeViolation(msg.clone())
            }
            _ if e.is_transient() => clausegraph_core::CoreError::StoreTransient(e.to_string()),
            _ => clausegraph_core::CoreError::Store(e.to_string()),
        }
    }
}
