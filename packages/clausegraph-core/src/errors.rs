use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy for the retrieval core.
///
/// Component-internal recoveries (embedding retries, reranker fallback) do
/// not surface here; anything that only degrades result quality is carried
/// as result metadata instead.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// A query was issued without a tenant id, or a store returned rows for
    /// a foreign tenant. Fatal for the request; always logged with context.
    #[error("tenant scope violation: {0}")]
    TenantScopeViolation(String),

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("reranker unavailable: {0}")]
    RerankerUnavailable(String),

    /// Transient store fault, retryable by the caller.
    #[error("store transient failure: {0}")]
    StoreTransient(String),

    #[error("store failure: {0}")]
    Store(String),
}

impl CoreError {
    pub fn input<E: std::fmt::Display>(e: E) -> Self {
        Self::InputInvalid(e.to_string())
    }

    /// Transient faults are eligible for retry; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::StoreTransient(_) | CoreError::EmbeddingUnavailable(_)
        )
    }
}
