//! Coverage workflow and framework catalog seeding
//!
//! Coverage runs over stored QSP sections: citations are re-extracted from
//! section text at assessment time, matched against the framework clause
//! catalog, and summarized for the reviewer.

use std::sync::Arc;

use tracing::info;

use clausegraph_core::coverage::{self, CoverageReport};
use clausegraph_core::models::{Criticality, DocKind, FrameworkClause};
use clausegraph_core::parser::extract_citations;
use clausegraph_core::CoreError;
use clausegraph_storage::{CatalogStore, SectionFilter, SectionStore};

use crate::error::Result;

pub struct CoverageService {
    store: Arc<dyn SectionStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl CoverageService {
    pub fn new(store: Arc<dyn SectionStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { store, catalog }
    }

    /// Assess how well a tenant's QSP corpus covers `framework`.
    pub async fn assess(&self, tenant_id: &str, framework: &str) -> Result<CoverageReport> {
        if tenant_id.trim().is_empty() {
            return Err(
                CoreError::TenantScopeViolation("coverage requires a tenant id".into()).into(),
            );
        }
        let clauses = self.catalog.get_clauses(framework).await?;
        let sections = self
            .store
            .get_sections(
                tenant_id,
                &SectionFilter {
                    doc_kind: Some(DocKind::Qsp),
                    ..Default::default()
                },
            )
            .await?;

        let citations: Vec<_> = sections
            .iter()
            .flat_map(|s| extract_citations(&format!("{}\n{}", s.heading, s.text)))
            .collect();

        let report = coverage::assess(framework, &clauses, &citations);
        info!(
            tenant = tenant_id,
            framework,
            covered = report.covered,
            total = report.total_clauses,
            "coverage assessed"
        );
        Ok(report)
    }
}

/// Load a framework clause catalog from its JSON array form:
/// `[{"framework": ..., "clause_id": ..., "title": ..., "criticality": ..., "category": ...}]`.
pub fn load_catalog_json(json: &str) -> Result<Vec<FrameworkClause>> {
    serde_json::from_str(json)
        .map_err(|e| CoreError::InputInvalid(format!("bad catalog json: {e}")).into())
}

/// Built-in ISO 13485:2016 clause catalog, the default reviewer baseline.
pub fn iso_13485_catalog() -> Vec<FrameworkClause> {
    let clause = |clause_id: &str, title: &str, criticality, category: &str| FrameworkClause {
        framework: "ISO_13485".to_string(),
        clause_id: clause_id.to_string(),
        title: title.to_string(),
        criticality,
        category: category.to_string(),
    };
    vec![
        clause("4.1", "General QMS requirements", Criticality::High, "Quality System"),
        clause("4.2.3", "Medical device file", Criticality::Medium, "Documentation"),
        clause("4.2.4", "Control of documents", Criticality::High, "Documentation"),
        clause("4.2.5", "Control of records", Criticality::High, "Documentation"),
        clause("5.6", "Management review", Criticality::Medium, "Management"),
        clause("6.2", "Human resources", Criticality::Medium, "Resources"),
        clause("7.3", "Design and development", Criticality::High, "Design"),
        clause("7.4", "Purchasing", Criticality::Medium, "Purchasing"),
        clause("7.5", "Production and service provision", Criticality::High, "Production"),
        clause("7.6", "Monitoring and measuring equipment", Criticality::Medium, "Production"),
        clause("8.2.1", "Feedback", Criticality::Medium, "Measurement"),
        clause("8.2.2", "Complaint handling", Criticality::High, "Measurement"),
        clause("8.3", "Control of nonconforming product", Criticality::High, "Measurement"),
        clause("8.5.2", "Corrective action", Criticality::High, "Improvement"),
        clause("8.5.3", "Preventive action", Criticality::Medium, "Improvement"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_well_formed() {
        let catalog = iso_13485_catalog();
        assert!(catalog.len() >= 10);
        assert!(catalog.iter().all(|c| c.framework == "ISO_13485"));
        assert!(catalog.iter().any(|c| c.criticality == Criticality::High));
    }

    #[test]
    fn catalog_json_roundtrip() {
        let json = serde_json::to_string(&iso_13485_catalog()).unwrap();
        let parsed = load_catalog_json(&json).unwrap();
        assert_eq!(parsed, iso_13485_catalog());
    }

    #[test]
    fn bad_catalog_json_is_rejected() {
        assert!(load_catalog_json("{\"not\": \"an array\"}").is_err());
    }
}
