//! Storage ports
//!
//! # Contracts
//!
//! 1. **Tenant scope**: every operation takes a `tenant_id`; an empty id is
//!    refused and no returned row may carry a different tenant.
//! 2. **Transactional ingest**: a document's sections and embeddings land
//!    together or not at all; re-upsert of a `section_id` replaces both.
//! 3. **Cascade delete**: deleting a document removes its sections and
//!    embeddings.
//! 4. **No truncation**: section text is persisted at full length.

use async_trait::async_trait;
use uuid::Uuid;

use clausegraph_core::models::{DocKind, Document, FrameworkClause, Section};
use clausegraph_core::retrieval::SectionSearch;

use crate::Result;

/// Filter for section reads. Empty filter means a full-tenant scan.
#[derive(Debug, Clone, Default)]
pub struct SectionFilter {
    pub doc_kind: Option<DocKind>,
    pub doc_id: Option<Uuid>,
    pub clause_id: Option<String>,
}

/// A section paired with its embedding, as stored.
#[derive(Debug, Clone)]
pub struct StoredSection {
    pub section: Section,
    pub vector: Vec<f32>,
}

/// Tenant-scoped persistent index of sections and their embeddings.
///
/// Search (`SectionSearch`) is part of the same port so retrieval always
/// goes through the coherent store rather than a second code path.
#[async_trait]
pub trait SectionStore: SectionSearch {
    /// Register or refresh document metadata.
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    async fn get_document(&self, tenant_id: &str, doc_id: Uuid) -> Result<Option<Document>>;

    /// Persist a document's sections with their embeddings, transactionally.
    /// `embeddings[i]` belongs to `sections[i]`; mismatched lengths or a
    /// vector of the wrong dimension fail the whole call.
    async fn upsert_sections(
        &self,
        tenant_id: &str,
        doc_id: Uuid,
        sections: Vec<Section>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()>;

    async fn get_sections(&self, tenant_id: &str, filter: &SectionFilter) -> Result<Vec<Section>>;

    /// Delete a document, cascading to sections and embeddings.
    async fn delete_doc(&self, tenant_id: &str, doc_id: Uuid) -> Result<()>;
}

/// Read-mostly store for framework clause catalogs. Catalogs are reference
/// data shared by all tenants.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_clauses(&self, clauses: &[FrameworkClause]) -> Result<()>;

    async fn get_clauses(&self, framework: &str) -> Result<Vec<FrameworkClause>>;
}
