//! Integration tests for the SQLite section store.

use chrono::Utc;
use uuid::Uuid;

use clausegraph_core::models::{Criticality, DocKind, Document, FrameworkClause, Section};
use clausegraph_core::retrieval::SectionSearch;
use clausegraph_core::CoreError;
use clausegraph_storage::{
    CatalogStore, SectionFilter, SectionStore, SqliteSectionStore, StorageError,
};

const DIM: usize = 4;

fn doc(tenant: &str, kind: DocKind, name: &str) -> Document {
    Document::new(tenant, kind, name)
}

fn section(tenant: &str, doc_id: Uuid, clause: &str, heading: &str, text: &str) -> Section {
    Section {
        section_id: Uuid::new_v4(),
        doc_id,
        tenant_id: tenant.to_string(),
        clause_id: Some(clause.to_string()),
        section_path: clause.to_string(),
        heading: heading.to_string(),
        text: text.to_string(),
        page: None,
        depth: clause.split('.').count() as u32,
        created_at: Utc::now(),
    }
}

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[axis] = 1.0;
    v
}

async fn store() -> SqliteSectionStore {
    SqliteSectionStore::in_memory(DIM).await.unwrap()
}

#[tokio::test]
async fn ingest_roundtrip_preserves_full_text() {
    let store = store().await;
    let d = doc("tenant-a", DocKind::Qsp, "QSP 4.2-4 Document Control R5");
    store.upsert_document(&d).await.unwrap();

    // A six-hundred-kilobyte section must come back byte for byte.
    let long_text = "The organization shall control records. ".repeat(15_000);
    let s = section("tenant-a", d.doc_id, "4.2.4", "Control of Records", &long_text);
    let expected_len = s.text.len();

    store
        .upsert_sections("tenant-a", d.doc_id, vec![s], vec![unit(0)])
        .await
        .unwrap();

    let got = store
        .get_sections("tenant-a", &SectionFilter::default())
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].text.len(), expected_len);
}

#[tokio::test]
async fn tenant_isolation_on_reads_and_search() {
    let store = store().await;
    for tenant in ["tenant-a", "tenant-b"] {
        let d = doc(tenant, DocKind::Qsp, "QSP 7.3-1");
        store.upsert_document(&d).await.unwrap();
        let s = section(tenant, d.doc_id, "7.3", "Design", &format!("{tenant} design text"));
        store
            .upsert_sections(tenant, d.doc_id, vec![s], vec![unit(1)])
            .await
            .unwrap();
    }

    let rows = store
        .get_sections("tenant-a", &SectionFilter::default())
        .await
        .unwrap();
    assert!(rows.iter().all(|s| s.tenant_id == "tenant-a"));

    let hits = store
        .vector_search("tenant-b", &unit(1), None, 10, 0.0)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.section.tenant_id == "tenant-b"));
}

#[tokio::test]
async fn empty_tenant_id_is_refused() {
    let store = store().await;
    let err = store
        .get_sections("", &SectionFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::TenantScope(_)));

    let err = store.lexical_search("  ", "query", None, 5).await.unwrap_err();
    assert!(matches!(err, CoreError::TenantScopeViolation(_)));
}

#[tokio::test]
async fn reupsert_replaces_text_and_embedding() {
    let store = store().await;
    let d = doc("tenant-a", DocKind::Qsp, "QSP 8.2-1");
    store.upsert_document(&d).await.unwrap();

    let mut s = section("tenant-a", d.doc_id, "8.2", "Monitoring", "old text");
    store
        .upsert_sections("tenant-a", d.doc_id, vec![s.clone()], vec![unit(0)])
        .await
        .unwrap();

    s.text = "new text".to_string();
    store
        .upsert_sections("tenant-a", d.doc_id, vec![s.clone()], vec![unit(2)])
        .await
        .unwrap();

    let rows = store
        .get_sections("tenant-a", &SectionFilter::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text, "new text");

    // The embedding moved to axis 2 with the replacement
    let hits = store
        .vector_search("tenant-a", &unit(2), None, 10, 0.9)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn delete_doc_cascades() {
    let store = store().await;
    let d = doc("tenant-a", DocKind::Qsp, "QSP 9.1-3");
    store.upsert_document(&d).await.unwrap();
    let s = section("tenant-a", d.doc_id, "9.1", "Feedback", "text");
    store
        .upsert_sections("tenant-a", d.doc_id, vec![s], vec![unit(0)])
        .await
        .unwrap();

    store.delete_doc("tenant-a", d.doc_id).await.unwrap();

    let rows = store
        .get_sections("tenant-a", &SectionFilter::default())
        .await
        .unwrap();
    assert!(rows.is_empty());
    let hits = store
        .vector_search("tenant-a", &unit(0), None, 10, 0.0)
        .await
        .unwrap();
    assert!(hits.is_empty());

    let fetched = store.get_document("tenant-a", d.doc_id).await.unwrap().unwrap();
    assert!(fetched.deleted_at.is_some());
}

#[tokio::test]
async fn vector_search_ranks_and_filters() {
    let store = store().await;
    let qsp = doc("tenant-a", DocKind::Qsp, "QSP 4.2-4");
    let reg = doc("tenant-a", DocKind::Regulatory, "ISO 13485:2016");
    store.upsert_document(&qsp).await.unwrap();
    store.upsert_document(&reg).await.unwrap();

    let close = section("tenant-a", qsp.doc_id, "4.2.4", "Records", "records text");
    let far = section("tenant-a", qsp.doc_id, "6.2", "Training", "training text");
    let reg_sec = section("tenant-a", reg.doc_id, "4.2.4", "Records", "regulatory text");

    store
        .upsert_sections(
            "tenant-a",
            qsp.doc_id,
            vec![close.clone(), far],
            vec![vec![0.9, 0.1, 0.0, 0.0], unit(3)],
        )
        .await
        .unwrap();
    store
        .upsert_sections("tenant-a", reg.doc_id, vec![reg_sec], vec![unit(0)])
        .await
        .unwrap();

    let hits = store
        .vector_search("tenant-a", &unit(0), Some(DocKind::Qsp), 10, 0.55)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].section.section_id, close.section_id);
    assert!(hits[0].score > 0.9);
    assert!(hits[0].score <= 1.0);
}

#[tokio::test]
async fn lexical_search_weights_clause_hits_highest() {
    let store = store().await;
    let d = doc("tenant-a", DocKind::Qsp, "QSP 4.2-4");
    store.upsert_document(&d).await.unwrap();

    let by_clause = section("tenant-a", d.doc_id, "4.2.4", "Something else", "unrelated body");
    let by_text = section(
        "tenant-a",
        d.doc_id,
        "6.1",
        "Resources",
        "mentions 4.2.4 deep in the body text",
    );
    store
        .upsert_sections(
            "tenant-a",
            d.doc_id,
            vec![by_clause.clone(), by_text],
            vec![unit(0), unit(1)],
        )
        .await
        .unwrap();

    let hits = store.lexical_search("tenant-a", "4.2.4", None, 10).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].section.section_id, by_clause.section_id);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn dimension_mismatch_is_rejected() {
    let store = store().await;
    let d = doc("tenant-a", DocKind::Qsp, "QSP 4.2-4");
    store.upsert_document(&d).await.unwrap();
    let s = section("tenant-a", d.doc_id, "4.2", "Records", "text");

    let err = store
        .upsert_sections("tenant-a", d.doc_id, vec![s], vec![vec![1.0, 0.0]])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DimensionMismatch { got: 2, expected: 4 }));
}

#[tokio::test]
async fn mismatched_section_scope_is_refused() {
    let store = store().await;
    let d = doc("tenant-a", DocKind::Qsp, "QSP 4.2-4");
    store.upsert_document(&d).await.unwrap();
    let foreign = section("tenant-b", d.doc_id, "4.2", "Records", "text");

    let err = store
        .upsert_sections("tenant-a", d.doc_id, vec![foreign], vec![unit(0)])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::TenantScope(_)));
}

#[tokio::test]
async fn catalog_roundtrip() {
    let store = store().await;
    let clauses = vec![
        FrameworkClause {
            framework: "ISO_13485".into(),
            clause_id: "7.3".into(),
            title: "Design and development".into(),
            criticality: Criticality::High,
            category: "Design".into(),
        },
        FrameworkClause {
            framework: "ISO_13485".into(),
            clause_id: "4.2".into(),
            title: "Documentation requirements".into(),
            criticality: Criticality::Medium,
            category: "Documentation".into(),
        },
    ];
    store.upsert_clauses(&clauses).await.unwrap();

    let got = store.get_clauses("ISO_13485").await.unwrap();
    assert_eq!(got.len(), 2);
    assert!(got.iter().any(|c| c.clause_id == "7.3" && c.criticality == Criticality::High));

    assert!(store.get_clauses("MDR_2017_745").await.unwrap().is_empty());
}
