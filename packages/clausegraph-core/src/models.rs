//! Shared domain records
//!
//! Every record that crosses a component boundary is a closed struct with
//! explicit optional fields. Stored records carry `tenant_id`; no query path
//! may return a record whose `tenant_id` differs from the caller's.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;

// ═══════════════════════════════════════════════════════════════════════════
// Documents & sections
// ═══════════════════════════════════════════════════════════════════════════

/// Document kind at ingest time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocKind {
    /// Internal Quality System Procedure
    Qsp,
    /// External regulatory standard (ISO, FDA, MDR, ...)
    Regulatory,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Qsp => "QSP",
            DocKind::Regulatory => "REGULATORY",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "QSP" => Ok(DocKind::Qsp),
            "REGULATORY" => Ok(DocKind::Regulatory),
            other => Err(CoreError::InputInvalid(format!(
                "unknown document kind: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for DocKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ingested document. Immutable after ingest except for soft delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: Uuid,
    pub tenant_id: String,
    pub doc_kind: DocKind,
    /// Regulatory scheme tag (e.g. "ISO_13485"), when known
    pub framework: Option<String>,
    /// Identity extracted from the first page of a regulatory standard
    pub standard: Option<StandardIdentity>,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(tenant_id: impl Into<String>, doc_kind: DocKind, display_name: impl Into<String>) -> Self {
        Self {
            doc_id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            doc_kind,
            framework: None,
            standard: None,
            display_name: display_name.into(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}

/// One clause-addressable section of a document.
///
/// `text` is stored verbatim after normalization and is never truncated on
/// the storage path. Truncation exists only at the embedding boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: Uuid,
    pub doc_id: Uuid,
    pub tenant_id: String,
    /// Recognized clause number (e.g. "4.2.4"), when the parser found one
    pub clause_id: Option<String>,
    pub section_path: String,
    pub heading: String,
    pub text: String,
    pub page: Option<u32>,
    /// Number of dot-separated components of the clause number; 1 when unnumbered
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

/// Parser output before identity and tenancy are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDraft {
    pub clause_id: Option<String>,
    pub section_path: String,
    pub heading: String,
    pub text: String,
    pub page: Option<u32>,
    pub depth: u32,
    /// References to other internal documents (forms, work instructions, QSPs)
    #[serde(default)]
    pub cross_references: Vec<CrossReference>,
    /// Explicit regulatory citations found in the section body
    #[serde(default)]
    pub citations: Vec<SectionCitation>,
}

impl SectionDraft {
    /// Promote a draft to a stored section under a document.
    pub fn into_section(self, tenant_id: &str, doc_id: Uuid) -> Section {
        Section {
            section_id: Uuid::new_v4(),
            doc_id,
            tenant_id: tenant_id.to_string(),
            clause_id: self.clause_id,
            section_path: self.section_path,
            heading: self.heading,
            text: self.text,
            page: self.page,
            depth: self.depth,
            created_at: Utc::now(),
        }
    }
}

/// A reference from a QSP section to another internal document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    /// Target document id as written (e.g. "WI-ENG-003", "QSP 7.3-1")
    pub target_doc: String,
    /// Reference kind: "QSP", "WI", "FORM", ...
    pub kind: String,
    /// Line the reference was found on, trimmed
    pub context: String,
}

/// An explicit regulatory citation extracted from QSP text.
///
/// Example: "per ISO 14971:2019 Clause 5.1" yields
/// `{standard: "ISO 14971", version: Some("2019"), clause: Some("5.1")}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionCitation {
    /// Framework tag when the standard maps to a known scheme
    pub framework: Option<String>,
    pub standard: String,
    pub version: Option<String>,
    pub clause: Option<String>,
    pub annex: Option<String>,
    /// Surrounding text, capped for display
    pub context: String,
    /// 1-based line number within the section
    pub line: usize,
    pub confidence: f64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Standard identity
// ═══════════════════════════════════════════════════════════════════════════

/// The `(series, part?, year)` tuple extracted from a standard's first page.
///
/// Two identities name the same standard version iff all three fields are
/// equal; companion parts share a series with differing parts; differing
/// series are unrelated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StandardIdentity {
    pub series: u32,
    pub part: Option<u32>,
    pub year: u32,
}

impl StandardIdentity {
    pub fn new(series: u32, part: Option<u32>, year: u32) -> Self {
        Self { series, part, year }
    }
}

impl std::fmt::Display for StandardIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.part {
            Some(part) => write!(f, "ISO {}-{}:{}", self.series, part, self.year),
            None => write!(f, "ISO {}:{}", self.series, self.year),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Deltas
// ═══════════════════════════════════════════════════════════════════════════

/// Classification of a per-clause change between two standard versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }

    /// Accepts "new" as an alias for "added"; reviewer exports have used both.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "added" | "new" => Ok(ChangeType::Added),
            "modified" => Ok(ChangeType::Modified),
            "deleted" => Ok(ChangeType::Deleted),
            other => Err(CoreError::InputInvalid(format!(
                "unknown change type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One classified change at clause granularity.
///
/// For `added`, `old_text` is absent; for `deleted`, `new_text` is absent;
/// for `modified`, both are present and differ after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub clause_id: String,
    pub change_type: ChangeType,
    pub old_text: Option<String>,
    pub new_text: Option<String>,
    pub framework: Option<String>,
}

impl Delta {
    /// The text that feeds downstream embedding: the new side, or the old
    /// side for deleted clauses.
    pub fn change_text(&self) -> &str {
        match self.change_type {
            ChangeType::Deleted => self.old_text.as_deref().unwrap_or(""),
            _ => self.new_text.as_deref().unwrap_or(""),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Retrieval matches
// ═══════════════════════════════════════════════════════════════════════════

/// One scored candidate from hybrid retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub section: Section,
    /// Weighted trigram score over clause id, heading and text (0..=6)
    pub bm25_score: f64,
    /// Cosine similarity clamped to [0, 1]
    pub vector_score: f64,
    /// Raw cross-encoder output; absent when the reranker was skipped
    pub rerank_raw: Option<f64>,
    /// Calibrated confidence in [0, 1], rounded to three decimals
    pub confidence: f64,
    /// The candidate's clause id appeared verbatim in the query
    pub clause_id_match: bool,
    /// Ranking fell back to vector order because the reranker was unavailable
    pub degraded_ranking: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Analysis runs & impacts
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome status carried on a run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Completed,
    /// Completed, but one or more deltas failed (embedding or deadline)
    Partial,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Completed => "completed",
            ReportStatus::Partial => "partial",
            ReportStatus::Failed => "failed",
        }
    }
}

/// A proposed link from a regulatory delta to a QSP section.
///
/// QSP fields are copied by value so later section edits do not rewrite
/// historical reports. `(run_id, clause_id, impact_index)` is the upsert key;
/// a rerun with identical inputs overwrites the same rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    pub impact_id: Uuid,
    pub run_id: Uuid,
    pub tenant_id: String,
    pub clause_id: String,
    pub change_type: ChangeType,
    /// Position of this impact within its clause group; stable across reruns
    pub impact_index: u32,
    /// Compact QSP document identifier (e.g. "7.3-3")
    pub qsp_doc: String,
    pub qsp_clause: Option<String>,
    /// Display snippet of the matched section text
    pub qsp_text: String,
    /// Full matched section text, untruncated
    pub qsp_text_full: String,
    pub heading: String,
    pub similarity: f64,
    pub rationale: String,
    pub reviewed: bool,
    pub custom_rationale: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A delta that could not be analyzed; the run continues without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDelta {
    pub clause_id: String,
    pub reason: String,
}

/// Summary returned by one change-impact analysis invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: ReportStatus,
    pub total_changes_analyzed: usize,
    pub total_impacts_found: usize,
    /// Similarity floor applied to every reported impact
    pub threshold: f64,
    #[serde(default)]
    pub partial: bool,
    /// Operator-facing note, e.g. when the tenant has no QSP corpus indexed
    pub guidance: Option<String>,
    #[serde(default)]
    pub skipped: Vec<SkippedDelta>,
    pub impacts: Vec<ImpactRecord>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Framework catalog & coverage
// ═══════════════════════════════════════════════════════════════════════════

/// Criticality of a framework clause. Ordering: High > Medium > Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    High,
    Medium,
    Low,
}

impl Criticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::High => "high",
            Criticality::Medium => "medium",
            Criticality::Low => "low",
        }
    }

    /// Sort rank with High first.
    pub fn rank(&self) -> u8 {
        match self {
            Criticality::High => 0,
            Criticality::Medium => 1,
            Criticality::Low => 2,
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "high" => Ok(Criticality::High),
            "medium" => Ok(Criticality::Medium),
            "low" => Ok(Criticality::Low),
            other => Err(CoreError::InputInvalid(format!(
                "unknown criticality: {other}"
            ))),
        }
    }
}

/// Read-only reference data describing one clause of a regulatory framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkClause {
    pub framework: String,
    pub clause_id: String,
    pub title: String,
    pub criticality: Criticality,
    pub category: String,
}
