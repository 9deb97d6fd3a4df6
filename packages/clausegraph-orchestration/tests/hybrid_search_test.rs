//! Hybrid retrieval over the real section store: lexical and dense legs,
//! rerank calibration, and tenant scoping exercised together.

use std::sync::Arc;

use async_trait::async_trait;

use clausegraph_core::embedding::EmbeddingProvider;
use clausegraph_core::models::DocKind;
use clausegraph_core::retrieval::{HybridRetriever, Reranker};
use clausegraph_core::{CoreError, EngineConfig};
use clausegraph_orchestration::{IngestService, TraceabilityService};
use clausegraph_storage::SqliteSectionStore;

const DIM: usize = 4;

struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v = vec![0.0f32; DIM];
                if lower.contains("record") {
                    v[0] = 1.0;
                }
                if lower.contains("design") {
                    v[1] = 1.0;
                }
                if v.iter().all(|&x| x == 0.0) {
                    v[3] = 1.0;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Scores passages by naive query-term overlap; stands in for the
/// cross-encoder with stable outputs.
struct OverlapReranker;

#[async_trait]
impl Reranker for OverlapReranker {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f64>, CoreError> {
        let query_terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Ok(passages
            .iter()
            .map(|p| {
                let lower = p.to_lowercase();
                query_terms.iter().filter(|t| lower.contains(*t)).count() as f64
            })
            .collect())
    }
}

async fn seeded_store() -> Arc<SqliteSectionStore> {
    let store = Arc::new(SqliteSectionStore::in_memory(DIM).await.unwrap());
    let config = EngineConfig {
        embedding_dim: DIM,
        ..EngineConfig::default()
    };
    let ingest = IngestService::new(store.clone(), Arc::new(KeywordEmbedder), config);
    ingest
        .ingest_text(
            "tenant-a",
            DocKind::Qsp,
            "4.2-4 QSP 4.2-4 R5 Document Control",
            "\
4.2.4 Control of Records
Quality records are maintained per QSP 4.2-1 and logged on F-QA-101.

6.2 Competence
Personnel competence requirements are defined.",
        )
        .await
        .unwrap();
    ingest
        .ingest_text(
            "tenant-a",
            DocKind::Qsp,
            "7.3-3 QSP 7.3-3 R9 Design Control",
            "\
5.1 Design Planning
Design and development activities are planned. Records are kept per WI-ENG-003.",
        )
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn hybrid_search_fuses_both_legs_over_the_store() {
    let store = seeded_store().await;
    let retriever = HybridRetriever::new(
        store.clone(),
        Arc::new(KeywordEmbedder),
        Some(Arc::new(OverlapReranker)),
        EngineConfig {
            embedding_dim: DIM,
            ..EngineConfig::default()
        },
    );

    let matches = retriever
        .hybrid_search("tenant-a", "control of records 4.2.4", Some(DocKind::Qsp), 5)
        .await
        .unwrap();

    assert!(!matches.is_empty());
    let top = &matches[0];
    assert_eq!(top.section.clause_id.as_deref(), Some("4.2.4"));
    assert!(top.clause_id_match);
    assert!(top.bm25_score > 0.0);
    assert!(top.vector_score > 0.9);
    assert!(!top.degraded_ranking);
    for m in &matches {
        assert!((0.0..=1.0).contains(&m.confidence));
        assert_eq!(m.section.tenant_id, "tenant-a");
    }
    assert!(matches.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[tokio::test]
async fn hybrid_search_is_tenant_scoped() {
    let store = seeded_store().await;
    let retriever = HybridRetriever::new(
        store,
        Arc::new(KeywordEmbedder),
        None,
        EngineConfig {
            embedding_dim: DIM,
            ..EngineConfig::default()
        },
    );
    // Another tenant sees nothing from tenant-a
    let matches = retriever
        .hybrid_search("tenant-b", "records", None, 5)
        .await
        .unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn traceability_follows_cross_references_downstream() {
    let store = seeded_store().await;
    let trace = TraceabilityService::new(store);

    let hierarchy = trace.build_hierarchy("tenant-a").await.unwrap();
    let record_control = hierarchy.get("4.2-4").expect("QSP node present");
    assert_eq!(record_control.kind, "QSP");
    assert!(record_control.children.contains(&"F-QA-101".to_string()));

    let design = hierarchy.get("7.3-3").expect("QSP node present");
    assert!(design.children.contains(&"WI-ENG-003".to_string()));

    let impacted = trace.impacted_documents("tenant-a", "7.3-3").await.unwrap();
    assert_eq!(impacted, vec!["WI-ENG-003".to_string()]);
}
