//! SQLite adapter for the section store
//!
//! Sections, embeddings, documents and framework catalogs live in one
//! SQLite database; vectors are little-endian `f32` BLOBs. Search legs run
//! over the tenant cache rather than SQL so trigram and cosine scoring stay
//! in one place.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use clausegraph_core::models::{
    Criticality, DocKind, Document, FrameworkClause, Section, StandardIdentity,
};
use clausegraph_core::retrieval::trigram::weighted_field_score;
use clausegraph_core::retrieval::{ScoredSection, SectionSearch};
use clausegraph_core::vector::unit_similarity;
use clausegraph_core::CoreError;

use crate::cache::TenantCache;
use crate::domain::{CatalogStore, SectionFilter, SectionStore, StoredSection};
use crate::{Result, StorageError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    doc_id        TEXT PRIMARY KEY,
    tenant_id     TEXT NOT NULL,
    doc_kind      TEXT NOT NULL,
    framework     TEXT,
    std_series    INTEGER,
    std_part      INTEGER,
    std_year      INTEGER,
    display_name  TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    deleted_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id);

CREATE TABLE IF NOT EXISTS sections (
    section_id    TEXT PRIMARY KEY,
    doc_id        TEXT NOT NULL,
    tenant_id     TEXT NOT NULL,
    clause_id     TEXT,
    section_path  TEXT NOT NULL,
    heading       TEXT NOT NULL,
    text          TEXT NOT NULL,
    page          INTEGER,
    depth         INTEGER NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sections_tenant ON sections(tenant_id);
CREATE INDEX IF NOT EXISTS idx_sections_tenant_doc ON sections(tenant_id, doc_id);
CREATE INDEX IF NOT EXISTS idx_sections_tenant_clause ON sections(tenant_id, clause_id);

CREATE TABLE IF NOT EXISTS section_embeddings (
    section_id    TEXT PRIMARY KEY,
    tenant_id     TEXT NOT NULL,
    vector        BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_embeddings_tenant ON section_embeddings(tenant_id);

CREATE TABLE IF NOT EXISTS framework_clauses (
    framework     TEXT NOT NULL,
    clause_id     TEXT NOT NULL,
    title         TEXT NOT NULL,
    criticality   TEXT NOT NULL,
    category      TEXT NOT NULL,
    PRIMARY KEY (framework, clause_id)
);
"#;

/// SQLite-backed `SectionStore` + `CatalogStore`.
pub struct SqliteSectionStore {
    pool: SqlitePool,
    embedding_dim: usize,
    cache: TenantCache,
    /// Serializes ingest per (tenant, doc); other documents are unaffected
    doc_locks: DashMap<(String, Uuid), Arc<Mutex<()>>>,
}

impl SqliteSectionStore {
    /// Connect and initialize the schema.
    pub async fn connect(url: &str, embedding_dim: usize) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await?;
        Self::with_pool(pool, embedding_dim).await
    }

    /// Single-connection in-memory store, for tests and local tooling.
    pub async fn in_memory(embedding_dim: usize) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool, embedding_dim).await
    }

    pub async fn with_pool(pool: SqlitePool, embedding_dim: usize) -> Result<Self> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!(embedding_dim, "section store ready");
        Ok(Self {
            pool,
            embedding_dim,
            cache: TenantCache::new(),
            doc_locks: DashMap::new(),
        })
    }

    /// Shared pool handle, for stores that persist alongside sections.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn require_tenant(tenant_id: &str) -> Result<()> {
        if tenant_id.trim().is_empty() {
            return Err(StorageError::TenantScope(
                "query issued without a tenant id".into(),
            ));
        }
        Ok(())
    }

    fn doc_lock(&self, tenant_id: &str, doc_id: Uuid) -> Arc<Mutex<()>> {
        self.doc_locks
            .entry((tenant_id.to_string(), doc_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Current tenant snapshot: cache hit or a load from SQLite.
    async fn tenant_snapshot(&self, tenant_id: &str) -> Result<Arc<Vec<StoredSection>>> {
        if let Some(hit) = self.cache.get(tenant_id).await {
            return Ok(hit);
        }

        let rows = sqlx::query(
            "SELECT s.section_id, s.doc_id, s.tenant_id, s.clause_id, s.section_path,
                    s.heading, s.text, s.page, s.depth, s.created_at, e.vector
             FROM sections s
             JOIN section_embeddings e ON e.section_id = s.section_id
             WHERE s.tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = Vec::with_capacity(rows.len());
        for row in rows {
            let section = decode_section(&row)?;
            if section.tenant_id != tenant_id {
                return Err(StorageError::TenantScope(format!(
                    "section {} belongs to tenant {}, queried as {}",
                    section.section_id, section.tenant_id, tenant_id
                )));
            }
            let vector = decode_vector(row.get::<Vec<u8>, _>("vector"))?;
            snapshot.push(StoredSection { section, vector });
        }

        let snapshot = Arc::new(snapshot);
        self.cache.insert(tenant_id, snapshot.clone()).await;
        Ok(snapshot)
    }
}

#[async_trait]
impl SectionStore for SqliteSectionStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        Self::require_tenant(&doc.tenant_id)?;
        sqlx::query(
            "INSERT INTO documents (doc_id, tenant_id, doc_kind, framework,
                                    std_series, std_part, std_year,
                                    display_name, created_at, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(doc_id) DO UPDATE SET
                 framework = excluded.framework,
                 display_name = excluded.display_name,
                 deleted_at = excluded.deleted_at",
        )
        .bind(doc.doc_id.to_string())
        .bind(&doc.tenant_id)
        .bind(doc.doc_kind.as_str())
        .bind(&doc.framework)
        .bind(doc.standard.map(|s| s.series as i64))
        .bind(doc.standard.and_then(|s| s.part).map(|p| p as i64))
        .bind(doc.standard.map(|s| s.year as i64))
        .bind(&doc.display_name)
        .bind(doc.created_at.to_rfc3339())
        .bind(doc.deleted_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, tenant_id: &str, doc_id: Uuid) -> Result<Option<Document>> {
        Self::require_tenant(tenant_id)?;
        let row = sqlx::query(
            "SELECT doc_id, tenant_id, doc_kind, framework, std_series, std_part,
                    std_year, display_name, created_at, deleted_at
             FROM documents WHERE doc_id = ? AND tenant_id = ?",
        )
        .bind(doc_id.to_string())
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_document(&r)).transpose()
    }

    #[instrument(skip_all, fields(tenant = tenant_id, doc = %doc_id, sections = sections.len()))]
    async fn upsert_sections(
        &self,
        tenant_id: &str,
        doc_id: Uuid,
        sections: Vec<Section>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<()> {
        Self::require_tenant(tenant_id)?;
        if sections.len() != embeddings.len() {
            return Err(StorageError::Corrupt(format!(
                "{} sections with {} embeddings",
                sections.len(),
                embeddings.len()
            )));
        }
        for vector in &embeddings {
            if vector.len() != self.embedding_dim {
                return Err(StorageError::DimensionMismatch {
                    got: vector.len(),
                    expected: self.embedding_dim,
                });
            }
        }
        for section in &sections {
            if section.tenant_id != tenant_id || section.doc_id != doc_id {
                return Err(StorageError::TenantScope(format!(
                    "section {} is scoped to ({}, {}), upsert targets ({}, {})",
                    section.section_id, section.tenant_id, section.doc_id, tenant_id, doc_id
                )));
            }
        }

        let lock = self.doc_lock(tenant_id, doc_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;
        for (section, vector) in sections.iter().zip(&embeddings) {
            sqlx::query(
                "INSERT INTO sections (section_id, doc_id, tenant_id, clause_id,
                                       section_path, heading, text, page, depth, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(section_id) DO UPDATE SET
                     clause_id = excluded.clause_id,
                     section_path = excluded.section_path,
                     heading = excluded.heading,
                     text = excluded.text,
                     page = excluded.page,
                     depth = excluded.depth",
            )
            .bind(section.section_id.to_string())
            .bind(section.doc_id.to_string())
            .bind(&section.tenant_id)
            .bind(&section.clause_id)
            .bind(&section.section_path)
            .bind(&section.heading)
            .bind(&section.text)
            .bind(section.page.map(|p| p as i64))
            .bind(section.depth as i64)
            .bind(section.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO section_embeddings (section_id, tenant_id, vector)
                 VALUES (?, ?, ?)
                 ON CONFLICT(section_id) DO UPDATE SET vector = excluded.vector",
            )
            .bind(section.section_id.to_string())
            .bind(&section.tenant_id)
            .bind(encode_vector(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.cache.invalidate(tenant_id).await;
        info!("sections persisted");
        Ok(())
    }

    async fn get_sections(&self, tenant_id: &str, filter: &SectionFilter) -> Result<Vec<Section>> {
        Self::require_tenant(tenant_id)?;

        let mut sql = String::from(
            "SELECT s.section_id, s.doc_id, s.tenant_id, s.clause_id, s.section_path,
                    s.heading, s.text, s.page, s.depth, s.created_at
             FROM sections s
             JOIN documents d ON d.doc_id = s.doc_id
             WHERE s.tenant_id = ? AND d.deleted_at IS NULL",
        );
        if filter.doc_kind.is_some() {
            sql.push_str(" AND d.doc_kind = ?");
        }
        if filter.doc_id.is_some() {
            sql.push_str(" AND s.doc_id = ?");
        }
        if filter.clause_id.is_some() {
            sql.push_str(" AND s.clause_id = ?");
        }
        sql.push_str(" ORDER BY s.doc_id, s.section_path, s.section_id");

        let mut query = sqlx::query(&sql).bind(tenant_id);
        if let Some(kind) = filter.doc_kind {
            query = query.bind(kind.as_str());
        }
        if let Some(doc_id) = filter.doc_id {
            query = query.bind(doc_id.to_string());
        }
        if let Some(clause_id) = &filter.clause_id {
            query = query.bind(clause_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_section).collect()
    }

    async fn delete_doc(&self, tenant_id: &str, doc_id: Uuid) -> Result<()> {
        Self::require_tenant(tenant_id)?;
        let lock = self.doc_lock(tenant_id, doc_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM section_embeddings WHERE tenant_id = ? AND section_id IN
                 (SELECT section_id FROM sections WHERE tenant_id = ? AND doc_id = ?)",
        )
        .bind(tenant_id)
        .bind(tenant_id)
        .bind(doc_id.to_string())
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM sections WHERE tenant_id = ? AND doc_id = ?")
            .bind(tenant_id)
            .bind(doc_id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE documents SET deleted_at = ? WHERE tenant_id = ? AND doc_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(tenant_id)
            .bind(doc_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.cache.invalidate(tenant_id).await;
        Ok(())
    }
}

#[async_trait]
impl SectionSearch for SqliteSectionStore {
    async fn vector_search(
        &self,
        tenant_id: &str,
        query_vec: &[f32],
        doc_kind: Option<DocKind>,
        top_k: usize,
        min_similarity: f64,
    ) -> std::result::Result<Vec<ScoredSection>, CoreError> {
        Self::require_tenant(tenant_id).map_err(CoreError::from)?;
        if query_vec.len() != self.embedding_dim {
            warn!(
                got = query_vec.len(),
                expected = self.embedding_dim,
                "query vector has wrong dimension"
            );
        }
        let snapshot = self.tenant_snapshot(tenant_id).await.map_err(CoreError::from)?;
        let kinds = self.doc_kinds(tenant_id).await.map_err(CoreError::from)?;

        let mut scored: Vec<ScoredSection> = snapshot
            .iter()
            .filter(|s| matches_kind(&kinds, &s.section, doc_kind))
            .map(|s| ScoredSection {
                section: s.section.clone(),
                score: unit_similarity(query_vec, &s.vector),
            })
            .filter(|s| s.score >= min_similarity)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.section.section_id.cmp(&b.section.section_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn lexical_search(
        &self,
        tenant_id: &str,
        query: &str,
        doc_kind: Option<DocKind>,
        top_k: usize,
    ) -> std::result::Result<Vec<ScoredSection>, CoreError> {
        Self::require_tenant(tenant_id).map_err(CoreError::from)?;
        let snapshot = self.tenant_snapshot(tenant_id).await.map_err(CoreError::from)?;
        let kinds = self.doc_kinds(tenant_id).await.map_err(CoreError::from)?;

        let mut scored: Vec<ScoredSection> = snapshot
            .iter()
            .filter(|s| matches_kind(&kinds, &s.section, doc_kind))
            .map(|s| ScoredSection {
                score: weighted_field_score(
                    query,
                    s.section.clause_id.as_deref(),
                    &s.section.heading,
                    &s.section.text,
                ),
                section: s.section.clone(),
            })
            .filter(|s| s.score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.section.section_id.cmp(&b.section.section_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

impl SqliteSectionStore {
    /// doc_id → kind map for one tenant, excluding soft-deleted documents.
    async fn doc_kinds(&self, tenant_id: &str) -> Result<ahash::AHashMap<Uuid, DocKind>> {
        let rows = sqlx::query(
            "SELECT doc_id, doc_kind FROM documents WHERE tenant_id = ? AND deleted_at IS NULL",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        let mut kinds = ahash::AHashMap::with_capacity(rows.len());
        for row in rows {
            let id = parse_uuid(&row.get::<String, _>("doc_id"))?;
            let kind = DocKind::parse(&row.get::<String, _>("doc_kind"))
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            kinds.insert(id, kind);
        }
        Ok(kinds)
    }
}

fn matches_kind(
    kinds: &ahash::AHashMap<Uuid, DocKind>,
    section: &Section,
    wanted: Option<DocKind>,
) -> bool {
    match kinds.get(&section.doc_id) {
        // Sections of soft-deleted documents never match
        None => false,
        Some(kind) => wanted.map_or(true, |w| *kind == w),
    }
}

#[async_trait]
impl CatalogStore for SqliteSectionStore {
    async fn upsert_clauses(&self, clauses: &[FrameworkClause]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for clause in clauses {
            sqlx::query(
                "INSERT INTO framework_clauses (framework, clause_id, title, criticality, category)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(framework, clause_id) DO UPDATE SET
                     title = excluded.title,
                     criticality = excluded.criticality,
                     category = excluded.category",
            )
            .bind(&clause.framework)
            .bind(&clause.clause_id)
            .bind(&clause.title)
            .bind(clause.criticality.as_str())
            .bind(&clause.category)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_clauses(&self, framework: &str) -> Result<Vec<FrameworkClause>> {
        let rows = sqlx::query(
            "SELECT framework, clause_id, title, criticality, category
             FROM framework_clauses WHERE framework = ? ORDER BY clause_id",
        )
        .bind(framework)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(FrameworkClause {
                    framework: row.get("framework"),
                    clause_id: row.get("clause_id"),
                    title: row.get("title"),
                    criticality: Criticality::parse(&row.get::<String, _>("criticality"))
                        .map_err(|e| StorageError::Corrupt(e.to_string()))?,
                    category: row.get("category"),
                })
            })
            .collect()
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Row codecs
// ───────────────────────────────────────────────────────────────────────────

pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub(crate) fn decode_vector(bytes: Vec<u8>) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::Corrupt(format!(
            "vector blob of {} bytes is not f32-aligned",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StorageError::Corrupt(format!("bad uuid {s:?}: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

fn decode_section(row: &SqliteRow) -> Result<Section> {
    Ok(Section {
        section_id: parse_uuid(&row.get::<String, _>("section_id"))?,
        doc_id: parse_uuid(&row.get::<String, _>("doc_id"))?,
        tenant_id: row.get("tenant_id"),
        clause_id: row.get("clause_id"),
        section_path: row.get("section_path"),
        heading: row.get("heading"),
        text: row.get("text"),
        page: row.get::<Option<i64>, _>("page").map(|p| p as u32),
        depth: row.get::<i64, _>("depth") as u32,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn decode_document(row: &SqliteRow) -> Result<Document> {
    let standard = match (
        row.get::<Option<i64>, _>("std_series"),
        row.get::<Option<i64>, _>("std_year"),
    ) {
        (Some(series), Some(year)) => Some(StandardIdentity {
            series: series as u32,
            part: row.get::<Option<i64>, _>("std_part").map(|p| p as u32),
            year: year as u32,
        }),
        _ => None,
    };
    Ok(Document {
        doc_id: parse_uuid(&row.get::<String, _>("doc_id"))?,
        tenant_id: row.get("tenant_id"),
        doc_kind: DocKind::parse(&row.get::<String, _>("doc_kind"))
            .map_err(|e| StorageError::Corrupt(e.to_string()))?,
        framework: row.get("framework"),
        standard,
        display_name: row.get("display_name"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        deleted_at: row
            .get::<Option<String>, _>("deleted_at")
            .map(|s| parse_timestamp(&s))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_codec_roundtrip() {
        let v = vec![0.25f32, -1.5, 3.75, 0.0];
        assert_eq!(decode_vector(encode_vector(&v)).unwrap(), v);
    }

    #[test]
    fn misaligned_blob_is_rejected() {
        assert!(decode_vector(vec![1, 2, 3]).is_err());
    }
}
