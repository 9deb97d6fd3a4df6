//! Embedding provider port
//!
//! The engine never talks to an embedding vendor directly; it goes through
//! `EmbeddingProvider`, constructed once at startup and passed into the
//! services that need it. Truncation to the provider's input limit happens
//! here and nowhere else.

mod http;

pub use http::{HttpEmbeddingClient, HttpEmbeddingConfig};

use async_trait::async_trait;

use crate::errors::CoreError;

/// Stateless adapter to a dense-embedding provider.
///
/// Implementations must return one vector of the configured dimension per
/// input, in input order. Provider faults surface as
/// `CoreError::EmbeddingUnavailable`; an empty-vector substitute is never
/// acceptable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts. Order-preserving, one row per input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError>;

    /// Fixed output dimension of this provider.
    fn dimension(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let mut rows = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        rows.pop()
            .ok_or_else(|| CoreError::EmbeddingUnavailable("provider returned no rows".into()))
    }
}
