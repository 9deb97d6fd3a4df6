//! Search ports implemented by the section store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::models::{DocKind, Section};

/// A section with the score assigned by one search leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSection {
    pub section: Section,
    pub score: f64,
}

/// Tenant-scoped search over indexed sections.
///
/// Implementations must refuse an empty `tenant_id` and may never return a
/// section whose `tenant_id` differs from the argument.
#[async_trait]
pub trait SectionSearch: Send + Sync {
    /// Dense search: cosine similarity of `query_vec` against stored
    /// embeddings, clamped to [0, 1]; results at or above `min_similarity`,
    /// best first, at most `top_k`.
    async fn vector_search(
        &self,
        tenant_id: &str,
        query_vec: &[f32],
        doc_kind: Option<DocKind>,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<ScoredSection>, CoreError>;

    /// Lexical search: weighted trigram score over clause id, heading and
    /// text; positive-scoring sections, best first, at most `top_k`.
    async fn lexical_search(
        &self,
        tenant_id: &str,
        query: &str,
        doc_kind: Option<DocKind>,
        top_k: usize,
    ) -> Result<Vec<ScoredSection>, CoreError>;
}
