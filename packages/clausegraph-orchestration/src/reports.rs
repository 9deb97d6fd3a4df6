//! Run and impact persistence, JSON/CSV export
//!
//! Impact rows are keyed `(run_id, clause_id, impact_index)` so a rerun with
//! identical inputs overwrites cleanly instead of deleting and rewriting.
//! Report retrieval is tenant-scoped: a run owned by another tenant reads as
//! not found, never as forbidden.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

use clausegraph_core::diff::compare_clause_ids;
use clausegraph_core::models::{ChangeType, ImpactRecord};

use crate::error::{AnalysisError, Result};
use crate::run::{AnalysisRun, RunState};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_runs (
    run_id         TEXT PRIMARY KEY,
    tenant_id      TEXT NOT NULL,
    run_type       TEXT NOT NULL,
    status         TEXT NOT NULL,
    error          TEXT,
    started_at     TEXT NOT NULL,
    completed_at   TEXT,
    total_impacts  INTEGER,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_tenant ON analysis_runs(tenant_id, started_at);

CREATE TABLE IF NOT EXISTS impact_records (
    impact_id         TEXT PRIMARY KEY,
    run_id            TEXT NOT NULL,
    tenant_id         TEXT NOT NULL,
    clause_id         TEXT NOT NULL,
    change_type       TEXT NOT NULL,
    impact_index      INTEGER NOT NULL,
    qsp_doc           TEXT NOT NULL,
    qsp_clause        TEXT,
    qsp_text          TEXT NOT NULL,
    qsp_text_full     TEXT NOT NULL,
    heading           TEXT NOT NULL,
    similarity        REAL NOT NULL,
    rationale         TEXT NOT NULL,
    reviewed          INTEGER NOT NULL DEFAULT 0,
    custom_rationale  TEXT NOT NULL DEFAULT '',
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE (run_id, clause_id, impact_index)
);
CREATE INDEX IF NOT EXISTS idx_impacts_run ON impact_records(run_id, tenant_id);
"#;

/// Columns of the CSV export, in order.
const CSV_COLUMNS: [&str; 7] = [
    "clause_id",
    "change_type",
    "qsp_doc",
    "qsp_clause",
    "heading",
    "similarity",
    "rationale",
];

pub struct ReportStore {
    pool: SqlitePool,
}

impl ReportStore {
    /// Initialize the report tables on a shared pool.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub async fn save_run(&self, run: &AnalysisRun) -> Result<()> {
        let (status, error, completed_at, total_impacts) = match &run.state {
            RunState::Running { .. } => ("running", None, None, None),
            RunState::Completed {
                completed_at,
                total_impacts,
                ..
            } => (
                "completed",
                None,
                Some(completed_at.to_rfc3339()),
                Some(*total_impacts as i64),
            ),
            RunState::Failed {
                failed_at,
                error,
                total_impacts,
                ..
            } => (
                "failed",
                Some(error.clone()),
                Some(failed_at.to_rfc3339()),
                total_impacts.map(|t| t as i64),
            ),
        };

        sqlx::query(
            "INSERT INTO analysis_runs (run_id, tenant_id, run_type, status, error,
                                        started_at, completed_at, total_impacts,
                                        created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(run_id) DO UPDATE SET
                 status = excluded.status,
                 error = excluded.error,
                 completed_at = excluded.completed_at,
                 total_impacts = excluded.total_impacts,
                 updated_at = excluded.updated_at",
        )
        .bind(run.run_id.to_string())
        .bind(&run.tenant_id)
        .bind(&run.run_type)
        .bind(status)
        .bind(error)
        .bind(run.started_at().to_rfc3339())
        .bind(completed_at)
        .bind(total_impacts)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a run under tenant scope. Foreign or unknown runs both read as
    /// `RunNotFound`.
    pub async fn get_run(&self, run_id: Uuid, tenant_id: &str) -> Result<StoredRun> {
        let row = sqlx::query(
            "SELECT run_id, tenant_id, run_type, status, error, started_at,
                    completed_at, total_impacts
             FROM analysis_runs WHERE run_id = ? AND tenant_id = ?",
        )
        .bind(run_id.to_string())
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => decode_run(&row),
            None => Err(AnalysisError::RunNotFound(run_id.to_string())),
        }
    }

    /// Most recent runs for a tenant, newest first.
    pub async fn list_runs(&self, tenant_id: &str, limit: u32) -> Result<Vec<StoredRun>> {
        let rows = sqlx::query(
            "SELECT run_id, tenant_id, run_type, status, error, started_at,
                    completed_at, total_impacts
             FROM analysis_runs WHERE tenant_id = ?
             ORDER BY started_at DESC LIMIT ?",
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_run).collect()
    }

    /// Upsert a run's impact rows. Writes are serialized by the caller per
    /// run; the unique key makes reruns idempotent.
    #[instrument(skip_all, fields(impacts = impacts.len()))]
    pub async fn upsert_impacts(&self, impacts: &[ImpactRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for impact in impacts {
            sqlx::query(
                "INSERT INTO impact_records (impact_id, run_id, tenant_id, clause_id,
                                             change_type, impact_index, qsp_doc, qsp_clause,
                                             qsp_text, qsp_text_full, heading, similarity,
                                             rationale, reviewed, custom_rationale,
                                             created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(run_id, clause_id, impact_index) DO UPDATE SET
                     qsp_doc = excluded.qsp_doc,
                     qsp_clause = excluded.qsp_clause,
                     qsp_text = excluded.qsp_text,
                     qsp_text_full = excluded.qsp_text_full,
                     heading = excluded.heading,
                     similarity = excluded.similarity,
                     rationale = excluded.rationale,
                     updated_at = excluded.updated_at",
            )
            .bind(impact.impact_id.to_string())
            .bind(impact.run_id.to_string())
            .bind(&impact.tenant_id)
            .bind(&impact.clause_id)
            .bind(impact.change_type.as_str())
            .bind(impact.impact_index as i64)
            .bind(&impact.qsp_doc)
            .bind(&impact.qsp_clause)
            .bind(&impact.qsp_text)
            .bind(&impact.qsp_text_full)
            .bind(&impact.heading)
            .bind(impact.similarity)
            .bind(&impact.rationale)
            .bind(impact.reviewed as i64)
            .bind(&impact.custom_rationale)
            .bind(impact.created_at.to_rfc3339())
            .bind(impact.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!("impact rows upserted");
        Ok(())
    }

    /// A run's impacts, grouped by clause order and then by stored index.
    pub async fn get_impacts(&self, run_id: Uuid, tenant_id: &str) -> Result<Vec<ImpactRecord>> {
        let rows = sqlx::query(
            "SELECT impact_id, run_id, tenant_id, clause_id, change_type, impact_index,
                    qsp_doc, qsp_clause, qsp_text, qsp_text_full, heading, similarity,
                    rationale, reviewed, custom_rationale, created_at, updated_at
             FROM impact_records WHERE run_id = ? AND tenant_id = ?",
        )
        .bind(run_id.to_string())
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        let mut impacts: Vec<ImpactRecord> =
            rows.iter().map(decode_impact).collect::<Result<_>>()?;
        impacts.sort_by(|a, b| {
            compare_clause_ids(&a.clause_id, &b.clause_id)
                .then_with(|| a.impact_index.cmp(&b.impact_index))
        });
        Ok(impacts)
    }

    /// Reviewer update on one impact. Allowed after the run completes.
    pub async fn mark_reviewed(
        &self,
        run_id: Uuid,
        tenant_id: &str,
        impact_id: Uuid,
        reviewed: bool,
        custom_rationale: Option<String>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE impact_records
             SET reviewed = ?, custom_rationale = COALESCE(?, custom_rationale), updated_at = ?
             WHERE impact_id = ? AND run_id = ? AND tenant_id = ?",
        )
        .bind(reviewed as i64)
        .bind(custom_rationale)
        .bind(Utc::now().to_rfc3339())
        .bind(impact_id.to_string())
        .bind(run_id.to_string())
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AnalysisError::RunNotFound(run_id.to_string()));
        }
        Ok(())
    }

    /// JSON export: the run header with the exact impact record array.
    pub async fn export_json(&self, run_id: Uuid, tenant_id: &str) -> Result<serde_json::Value> {
        let run = self.get_run(run_id, tenant_id).await?;
        let impacts = self.get_impacts(run_id, tenant_id).await?;
        Ok(serde_json::json!({
            "run_id": run.run_id,
            "status": run.status,
            "started_at": run.started_at,
            "completed_at": run.completed_at,
            "total_impacts": impacts.len(),
            "impacts": impacts,
        }))
    }

    /// CSV export with RFC 4180 quoting and the fixed column order.
    pub async fn export_csv(&self, run_id: Uuid, tenant_id: &str) -> Result<String> {
        // Existence check applies tenant scope before any rows are read
        self.get_run(run_id, tenant_id).await?;
        let impacts = self.get_impacts(run_id, tenant_id).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(CSV_COLUMNS)
            .map_err(|e| AnalysisError::Export(e.to_string()))?;
        for impact in &impacts {
            writer
                .write_record([
                    impact.clause_id.as_str(),
                    impact.change_type.as_str(),
                    impact.qsp_doc.as_str(),
                    impact.qsp_clause.as_deref().unwrap_or(""),
                    impact.heading.as_str(),
                    &format!("{:.3}", impact.similarity),
                    impact.rationale.as_str(),
                ])
                .map_err(|e| AnalysisError::Export(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AnalysisError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| AnalysisError::Export(e.to_string()))
    }
}

/// A run row as persisted.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredRun {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub run_type: String,
    pub status: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_impacts: Option<usize>,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AnalysisError::Export(format!("bad timestamp {s:?}: {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AnalysisError::Export(format!("bad uuid {s:?}: {e}")))
}

fn decode_run(row: &SqliteRow) -> Result<StoredRun> {
    Ok(StoredRun {
        run_id: parse_uuid(&row.get::<String, _>("run_id"))?,
        tenant_id: row.get("tenant_id"),
        run_type: row.get("run_type"),
        status: row.get("status"),
        error: row.get("error"),
        started_at: parse_timestamp(&row.get::<String, _>("started_at"))?,
        completed_at: row
            .get::<Option<String>, _>("completed_at")
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        total_impacts: row
            .get::<Option<i64>, _>("total_impacts")
            .map(|t| t as usize),
    })
}

fn decode_impact(row: &SqliteRow) -> Result<ImpactRecord> {
    Ok(ImpactRecord {
        impact_id: parse_uuid(&row.get::<String, _>("impact_id"))?,
        run_id: parse_uuid(&row.get::<String, _>("run_id"))?,
        tenant_id: row.get("tenant_id"),
        clause_id: row.get("clause_id"),
        change_type: ChangeType::parse(&row.get::<String, _>("change_type"))
            .map_err(AnalysisError::Core)?,
        impact_index: row.get::<i64, _>("impact_index") as u32,
        qsp_doc: row.get("qsp_doc"),
        qsp_clause: row.get("qsp_clause"),
        qsp_text: row.get("qsp_text"),
        qsp_text_full: row.get("qsp_text_full"),
        heading: row.get("heading"),
        similarity: row.get("similarity"),
        rationale: row.get("rationale"),
        reviewed: row.get::<i64, _>("reviewed") != 0,
        custom_rationale: row.get("custom_rationale"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}
