//! Hybrid retrieval pipeline
//!
//! Lexical and dense candidates are fetched from the store, merged by
//! section id, reranked by the cross-encoder and calibrated into a
//! confidence. Ranker faults degrade to vector ordering instead of failing
//! the request.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::embedding::EmbeddingProvider;
use crate::errors::CoreError;
use crate::models::{DocKind, Match, Section};
use crate::retrieval::confidence::{calibrate, ConfidenceWeights};
use crate::retrieval::ports::SectionSearch;
use crate::retrieval::rerank::Reranker;

/// Characters of section text fed to the cross-encoder per passage.
const RERANK_PASSAGE_CHARS: usize = 500;

struct Candidate {
    section: Section,
    bm25_score: f64,
    vector_score: f64,
    rerank_raw: Option<f64>,
}

/// Tenant-scoped hybrid search over indexed sections.
///
/// Holds shared service handles; construct once at startup and clone the
/// `Arc`s into request scopes.
pub struct HybridRetriever {
    search: Arc<dyn SectionSearch>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    config: EngineConfig,
}

impl HybridRetriever {
    pub fn new(
        search: Arc<dyn SectionSearch>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            search,
            embedder,
            reranker,
            config,
        }
    }

    fn weights(&self) -> ConfidenceWeights {
        ConfidenceWeights {
            bm25: self.config.conf_w_bm25,
            vector: self.config.conf_w_vector,
            rerank: self.config.conf_w_rerank,
            clause_bonus: self.config.conf_w_clause,
        }
    }

    /// Run the full pipeline and return the top `top_k` matches by
    /// confidence, deterministically tie-broken by section id.
    pub async fn hybrid_search(
        &self,
        tenant_id: &str,
        query: &str,
        doc_kind: Option<DocKind>,
        top_k: usize,
    ) -> Result<Vec<Match>, CoreError> {
        if tenant_id.is_empty() {
            return Err(CoreError::TenantScopeViolation(
                "hybrid_search requires a tenant id".into(),
            ));
        }
        if query.trim().is_empty() {
            return Err(CoreError::InputInvalid("empty query".into()));
        }

        let lexical = self
            .search
            .lexical_search(tenant_id, query, doc_kind, self.config.hybrid_bm25_k)
            .await?;
        debug!(candidates = lexical.len(), "lexical leg complete");

        let query_vec = self.embedder.embed(query).await?;
        let dense = self
            .search
            .vector_search(tenant_id, &query_vec, doc_kind, self.config.hybrid_vec_k, 0.0)
            .await?;
        debug!(candidates = dense.len(), "vector leg complete");

        // Merge by section id, keeping both scores; an absent leg scores 0.
        let mut merged: AHashMap<Uuid, Candidate> = AHashMap::new();
        for scored in lexical {
            merged.insert(
                scored.section.section_id,
                Candidate {
                    section: scored.section,
                    bm25_score: scored.score,
                    vector_score: 0.0,
                    rerank_raw: None,
                },
            );
        }
        for scored in dense {
            match merged.get_mut(&scored.section.section_id) {
                Some(existing) => existing.vector_score = scored.score,
                None => {
                    merged.insert(
                        scored.section.section_id,
                        Candidate {
                            section: scored.section,
                            bm25_score: 0.0,
                            vector_score: scored.score,
                            rerank_raw: None,
                        },
                    );
                }
            }
        }

        let mut candidates: Vec<Candidate> = merged.into_values().collect();
        // Stable passage order for the reranker call
        candidates.sort_by(|a, b| a.section.section_id.cmp(&b.section.section_id));

        let degraded = self.apply_rerank(query, &mut candidates).await;

        let weights = self.weights();
        let query_lower = query.to_lowercase();
        let mut matches: Vec<Match> = candidates
            .into_iter()
            .map(|c| {
                let clause_id_match = c
                    .section
                    .clause_id
                    .as_deref()
                    .is_some_and(|id| query_lower.contains(&id.to_lowercase()));
                let confidence = calibrate(
                    &weights,
                    c.bm25_score,
                    c.vector_score,
                    c.rerank_raw,
                    clause_id_match,
                );
                Match {
                    section: c.section,
                    bm25_score: c.bm25_score,
                    vector_score: c.vector_score,
                    rerank_raw: c.rerank_raw,
                    confidence,
                    clause_id_match,
                    degraded_ranking: degraded,
                }
            })
            .collect();

        if degraded {
            matches.sort_by(|a, b| {
                b.vector_score
                    .partial_cmp(&a.vector_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.section.section_id.cmp(&b.section.section_id))
            });
        } else {
            matches.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.section.section_id.cmp(&b.section.section_id))
            });
        }
        matches.truncate(top_k);

        info!(
            results = matches.len(),
            degraded, "hybrid search complete"
        );
        Ok(matches)
    }

    /// Score candidates with the cross-encoder. Returns true when ranking
    /// degraded to vector order because the reranker faulted.
    async fn apply_rerank(&self, query: &str, candidates: &mut [Candidate]) -> bool {
        if !self.config.rerank_enabled || candidates.is_empty() {
            return false;
        }
        let Some(reranker) = self.reranker.as_ref() else {
            return false;
        };

        let passages: Vec<String> = candidates
            .iter()
            .map(|c| passage_for(&c.section))
            .collect();

        match reranker.score(query, &passages).await {
            Ok(scores) => {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.rerank_raw = Some(score);
                }
                false
            }
            Err(e) => {
                warn!(error = %e, "reranker unavailable, falling back to vector order");
                true
            }
        }
    }
}

fn passage_for(section: &Section) -> String {
    let snippet: String = section.text.chars().take(RERANK_PASSAGE_CHARS).collect();
    format!("{}: {}", section.heading, snippet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ports::ScoredSection;
    use async_trait::async_trait;
    use chrono::Utc;

    fn section(id_byte: u8, clause: Option<&str>, heading: &str, text: &str) -> Section {
        Section {
            section_id: Uuid::from_bytes([id_byte; 16]),
            doc_id: Uuid::from_bytes([0xAA; 16]),
            tenant_id: "tenant-a".into(),
            clause_id: clause.map(str::to_string),
            section_path: clause.unwrap_or_default().to_string(),
            heading: heading.into(),
            text: text.into(),
            page: None,
            depth: 1,
            created_at: Utc::now(),
        }
    }

    struct StubSearch {
        lexical: Vec<ScoredSection>,
        dense: Vec<ScoredSection>,
    }

    #[async_trait]
    impl SectionSearch for StubSearch {
        async fn vector_search(
            &self,
            tenant_id: &str,
            _query_vec: &[f32],
            _doc_kind: Option<DocKind>,
            top_k: usize,
            _min_similarity: f64,
        ) -> Result<Vec<ScoredSection>, CoreError> {
            assert_eq!(tenant_id, "tenant-a");
            Ok(self.dense.iter().take(top_k).cloned().collect())
        }

        async fn lexical_search(
            &self,
            tenant_id: &str,
            _query: &str,
            _doc_kind: Option<DocKind>,
            top_k: usize,
        ) -> Result<Vec<ScoredSection>, CoreError> {
            assert_eq!(tenant_id, "tenant-a");
            Ok(self.lexical.iter().take(top_k).cloned().collect())
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            3
        }
    }

    struct FixedReranker(Vec<f64>);

    #[async_trait]
    impl Reranker for FixedReranker {
        async fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f64>, CoreError> {
            Ok(self.0.iter().copied().take(passages.len()).collect())
        }
    }

    struct BrokenReranker;

    #[async_trait]
    impl Reranker for BrokenReranker {
        async fn score(&self, _query: &str, _passages: &[String]) -> Result<Vec<f64>, CoreError> {
            Err(CoreError::RerankerUnavailable("model host down".into()))
        }
    }

    fn retriever(
        search: StubSearch,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> HybridRetriever {
        HybridRetriever::new(
            Arc::new(search),
            Arc::new(StubEmbedder),
            reranker,
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn merges_legs_and_keeps_both_scores() {
        let shared = section(1, Some("4.2.4"), "Records", "Record control text");
        let lexical_only = section(2, None, "Training", "Training text");
        let dense_only = section(3, None, "Design", "Design text");

        let search = StubSearch {
            lexical: vec![
                ScoredSection { section: shared.clone(), score: 3.0 },
                ScoredSection { section: lexical_only, score: 1.5 },
            ],
            dense: vec![
                ScoredSection { section: shared, score: 0.9 },
                ScoredSection { section: dense_only, score: 0.6 },
            ],
        };
        let r = retriever(search, Some(Arc::new(FixedReranker(vec![2.0, 2.0, 2.0]))));
        let matches = r
            .hybrid_search("tenant-a", "records 4.2.4", None, 10)
            .await
            .unwrap();

        assert_eq!(matches.len(), 3);
        let merged = matches
            .iter()
            .find(|m| m.section.clause_id.as_deref() == Some("4.2.4"))
            .unwrap();
        assert_eq!(merged.bm25_score, 3.0);
        assert_eq!(merged.vector_score, 0.9);
        assert!(merged.clause_id_match);
        assert!(!merged.degraded_ranking);
    }

    #[tokio::test]
    async fn confidence_is_bounded_and_sorted() {
        let search = StubSearch {
            lexical: vec![ScoredSection {
                section: section(1, Some("7.5"), "Production", "text"),
                score: 5.0,
            }],
            dense: vec![ScoredSection {
                section: section(2, None, "Purchasing", "text"),
                score: 0.4,
            }],
        };
        let r = retriever(search, Some(Arc::new(FixedReranker(vec![1.0, -1.0]))));
        let matches = r.hybrid_search("tenant-a", "production", None, 10).await.unwrap();
        for m in &matches {
            assert!((0.0..=1.0).contains(&m.confidence));
        }
        assert!(matches.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[tokio::test]
    async fn reranker_fault_degrades_to_vector_order() {
        let high_vec = section(1, None, "A", "text");
        let low_vec = section(2, None, "B", "text");
        let search = StubSearch {
            lexical: vec![ScoredSection { section: low_vec.clone(), score: 6.0 }],
            dense: vec![
                ScoredSection { section: high_vec, score: 0.9 },
                ScoredSection { section: low_vec, score: 0.2 },
            ],
        };
        let r = retriever(search, Some(Arc::new(BrokenReranker)));
        let matches = r.hybrid_search("tenant-a", "anything", None, 10).await.unwrap();

        assert!(matches.iter().all(|m| m.degraded_ranking));
        assert!(matches.iter().all(|m| m.rerank_raw.is_none()));
        assert_eq!(matches[0].vector_score, 0.9);
    }

    #[tokio::test]
    async fn empty_tenant_is_refused() {
        let search = StubSearch { lexical: vec![], dense: vec![] };
        let r = retriever(search, None);
        let err = r.hybrid_search("", "query", None, 5).await.unwrap_err();
        assert!(matches!(err, CoreError::TenantScopeViolation(_)));
    }

    #[tokio::test]
    async fn rerank_disabled_is_not_degraded() {
        let search = StubSearch {
            lexical: vec![],
            dense: vec![ScoredSection {
                section: section(1, None, "A", "text"),
                score: 0.7,
            }],
        };
        let mut config = EngineConfig::default();
        config.rerank_enabled = false;
        let r = HybridRetriever::new(
            Arc::new(search),
            Arc::new(StubEmbedder),
            Some(Arc::new(BrokenReranker)),
            config,
        );
        let matches = r.hybrid_search("tenant-a", "query", None, 5).await.unwrap();
        assert!(!matches[0].degraded_ranking);
        assert!(matches[0].rerank_raw.is_none());
    }
}
