//! Document ingest and the standards diff workflow
//!
//! Ingest path: normalize -> decompose -> embed -> transactional store
//! upsert. Diff path: identify both standards, gate the pair, build clause
//! maps, diff. The gate can be relaxed by configuration, in which case any
//! identified pair is diffed and the gate outcome rides along as context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use clausegraph_core::diff::{self, ClauseMap};
use clausegraph_core::embedding::EmbeddingProvider;
use clausegraph_core::identify::{self, ComparisonMode};
use clausegraph_core::models::{Delta, DocKind, Document, SectionDraft, StandardIdentity};
use clausegraph_core::parser::{self, ParseHints};
use clausegraph_core::{CoreError, EngineConfig};
use clausegraph_storage::SectionStore;

use crate::error::Result;

/// One parsed section as delivered by the external extraction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionInput {
    pub section_path: String,
    pub heading: String,
    pub text: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Outcome of one document ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub doc_id: Uuid,
    pub display_name: String,
    pub sections_embedded: usize,
}

/// Document ingest service: sections in, indexed corpus out.
pub struct IngestService {
    store: Arc<dyn SectionStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EngineConfig,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn SectionStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Ingest a raw document: decompose it with the section parser, then
    /// embed and persist.
    pub async fn ingest_text(
        &self,
        tenant_id: &str,
        doc_kind: DocKind,
        display_name: &str,
        raw_text: &str,
    ) -> Result<IngestReceipt> {
        let hints = ParseHints {
            display_name: display_name.to_string(),
            first_page: None,
        };
        let drafts = parser::parse(raw_text, doc_kind, &hints);
        if drafts.is_empty() {
            return Err(CoreError::InputInvalid(format!(
                "document {display_name:?} has no content"
            ))
            .into());
        }
        self.ingest_drafts(tenant_id, doc_kind, display_name, drafts)
            .await
    }

    /// Ingest externally parsed sections (the PDF/DOCX extractor path).
    pub async fn ingest_sections(
        &self,
        tenant_id: &str,
        doc_kind: DocKind,
        display_name: &str,
        sections: Vec<SectionInput>,
    ) -> Result<IngestReceipt> {
        if sections.is_empty() {
            return Err(CoreError::InputInvalid(format!(
                "document {display_name:?} has no sections"
            ))
            .into());
        }
        let drafts = sections
            .into_iter()
            .map(|s| {
                let clause_id =
                    (!s.section_path.trim().is_empty()).then(|| s.section_path.trim().to_string());
                let depth = clause_id
                    .as_deref()
                    .map_or(1, |c| c.split('.').count() as u32);
                SectionDraft {
                    clause_id,
                    section_path: s.section_path,
                    heading: s.heading,
                    text: clausegraph_core::text::normalize(&s.text),
                    page: None,
                    depth,
                    cross_references: Vec::new(),
                    citations: Vec::new(),
                }
            })
            .collect();
        self.ingest_drafts(tenant_id, doc_kind, display_name, drafts)
            .await
    }

    async fn ingest_drafts(
        &self,
        tenant_id: &str,
        doc_kind: DocKind,
        display_name: &str,
        mut drafts: Vec<SectionDraft>,
    ) -> Result<IngestReceipt> {
        if tenant_id.trim().is_empty() {
            return Err(CoreError::TenantScopeViolation("ingest requires a tenant id".into()).into());
        }

        let mut document = Document::new(tenant_id, doc_kind, display_name);
        if doc_kind == DocKind::Regulatory {
            let first_page: String = drafts
                .iter()
                .take(2)
                .map(|d| format!("{} {}", d.heading, d.text))
                .collect::<Vec<_>>()
                .join("\n");
            document.standard = identify::identify(&format!("{display_name}\n{first_page}"));
            match document.standard {
                Some(standard) => {
                    document.framework = parser::framework_for_series(standard.series)
                        .map(str::to_string);
                }
                None => warn!(display_name, "no standard identity found on first page"),
            }
        }

        // Heading + body is the embedding input; stored text stays full length.
        let inputs: Vec<String> = drafts
            .iter()
            .map(|d| format!("{}: {}", d.heading, d.text))
            .collect();
        let vectors = self.embedder.embed_batch(&inputs).await?;

        let sections: Vec<_> = drafts
            .drain(..)
            .map(|d| d.into_section(tenant_id, document.doc_id))
            .collect();
        let count = sections.len();

        self.store.upsert_document(&document).await?;
        self.store
            .upsert_sections(tenant_id, document.doc_id, sections, vectors)
            .await?;

        info!(
            tenant = tenant_id,
            doc = %document.doc_id,
            sections = count,
            "document ingested"
        );
        Ok(IngestReceipt {
            doc_id: document.doc_id,
            display_name: display_name.to_string(),
            sections_embedded: count,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Standards diff workflow
// ═══════════════════════════════════════════════════════════════════════════

/// Result of comparing two uploaded regulatory documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "analysis_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StandardsAnalysis {
    /// Clause-level deltas between two versions of one standard
    VersionDiff {
        old_standard: Option<StandardIdentity>,
        new_standard: Option<StandardIdentity>,
        total_changes: usize,
        deltas: Vec<Delta>,
    },
    /// Companion parts of one series; informational, nothing diffed
    CrossReference {
        a: StandardIdentity,
        b: StandardIdentity,
        guidance: String,
    },
    /// Not comparable; the caller decides whether to abort
    Incompatible { reason: String, guidance: String },
}

/// Gate + diff over two regulatory document texts.
pub struct StandardsDiffService {
    config: EngineConfig,
}

impl StandardsDiffService {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Compare two regulatory documents given their raw text. `old_text` is
    /// the earlier upload slot; identification is re-checked from content.
    pub fn analyze(
        &self,
        old_text: &str,
        new_text: &str,
        framework: Option<&str>,
    ) -> StandardsAnalysis {
        let old_id = identify::identify(first_page(old_text));
        let new_id = identify::identify(first_page(new_text));
        let mode = identify::classify(old_id, new_id);

        if self.config.gate_enforced {
            match mode {
                ComparisonMode::VersionDiff { old, new } => {
                    let deltas = self.diff_texts(old_text, new_text, framework);
                    StandardsAnalysis::VersionDiff {
                        old_standard: Some(old),
                        new_standard: Some(new),
                        total_changes: deltas.len(),
                        deltas,
                    }
                }
                ComparisonMode::CrossReference { a, b } => {
                    let guidance = ComparisonMode::CrossReference { a, b }.guidance();
                    StandardsAnalysis::CrossReference { a, b, guidance }
                }
                ComparisonMode::Incompatible { reason } => {
                    let guidance = ComparisonMode::Incompatible {
                        reason: reason.clone(),
                    }
                    .guidance();
                    StandardsAnalysis::Incompatible { reason, guidance }
                }
            }
        } else {
            // Ungated mode diffs whatever it is given, identity or not.
            if !mode.is_diffable() {
                info!("gate relaxed, diffing documents despite non-version pair");
            }
            let deltas = self.diff_texts(old_text, new_text, framework);
            StandardsAnalysis::VersionDiff {
                old_standard: old_id,
                new_standard: new_id,
                total_changes: deltas.len(),
                deltas,
            }
        }
    }

    fn diff_texts(&self, old_text: &str, new_text: &str, framework: Option<&str>) -> Vec<Delta> {
        let old_map = clause_map(old_text);
        let new_map = clause_map(new_text);
        diff::diff(&old_map, &new_map, framework)
    }
}

fn clause_map(text: &str) -> ClauseMap {
    let hints = ParseHints::default();
    let sections = parser::parse(text, DocKind::Regulatory, &hints);
    diff::clause_map_from_sections(
        sections
            .iter()
            .filter_map(|s| s.clause_id.as_deref().map(|c| (c, s.text.as_str()))),
    )
}

fn first_page(text: &str) -> &str {
    // Identification only needs the opening of the document
    match text.char_indices().nth(2000) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OLD_STANDARD: &str = "\
ISO 10993-18:2005
Biological evaluation of medical devices

1.0 Scope
This standard specifies requirements for chemical characterization.

2.0 General Requirements
Organizations shall establish procedures for chemical analysis.";

    const NEW_STANDARD: &str = "\
ISO 10993-18:2020
Biological evaluation of medical devices

1.0 Scope
This standard specifies comprehensive requirements for chemical characterization.

2.0 General Requirements
Organizations shall establish procedures for chemical analysis.

4.0 Reporting
Results shall be documented.";

    #[test]
    fn version_diff_produces_ordered_deltas() {
        let service = StandardsDiffService::new(EngineConfig::default());
        match service.analyze(OLD_STANDARD, NEW_STANDARD, Some("ISO_10993")) {
            StandardsAnalysis::VersionDiff {
                old_standard,
                new_standard,
                deltas,
                total_changes,
            } => {
                assert_eq!(old_standard.unwrap().year, 2005);
                assert_eq!(new_standard.unwrap().year, 2020);
                assert_eq!(total_changes, deltas.len());
                // 1.0 modified, 4.0 added; 2.0 unchanged
                let ids: Vec<&str> = deltas.iter().map(|d| d.clause_id.as_str()).collect();
                assert_eq!(ids, vec!["1.0", "4.0"]);
            }
            other => panic!("expected VersionDiff, got {other:?}"),
        }
    }

    #[test]
    fn companion_parts_are_gated() {
        let service = StandardsDiffService::new(EngineConfig::default());
        let part17 = NEW_STANDARD.replace("10993-18:2020", "10993-17:2023");
        match service.analyze(NEW_STANDARD, &part17, None) {
            StandardsAnalysis::CrossReference { a, b, guidance } => {
                assert_eq!(a.series, b.series);
                assert_ne!(a.part, b.part);
                assert!(guidance.contains("companion"));
            }
            other => panic!("expected CrossReference, got {other:?}"),
        }
    }

    #[test]
    fn unidentified_pair_is_incompatible_when_gated() {
        let service = StandardsDiffService::new(EngineConfig::default());
        match service.analyze("no identity here", NEW_STANDARD, None) {
            StandardsAnalysis::Incompatible { guidance, .. } => {
                assert!(guidance.contains("cannot be compared"));
            }
            other => panic!("expected Incompatible, got {other:?}"),
        }
    }

    #[test]
    fn relaxed_gate_diffs_any_pair() {
        let config = EngineConfig {
            gate_enforced: false,
            ..EngineConfig::default()
        };
        let service = StandardsDiffService::new(config);
        let part17 = NEW_STANDARD.replace("10993-18:2020", "10993-17:2023");
        match service.analyze(NEW_STANDARD, &part17, None) {
            StandardsAnalysis::VersionDiff { deltas, .. } => {
                // Identical clause bodies, so nothing changes beyond identity
                assert!(deltas.is_empty());
            }
            other => panic!("expected VersionDiff in ungated mode, got {other:?}"),
        }
    }
}
