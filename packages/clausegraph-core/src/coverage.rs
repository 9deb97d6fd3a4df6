//! Framework coverage assessment
//!
//! Given a framework's clause catalog and the regulatory citations extracted
//! from a tenant's QSP corpus, reports which clauses at least one procedure
//! claims to implement. A clause is covered iff some QSP citation references
//! its `(framework, clause_id)` pair.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::diff::compare_clause_ids;
use crate::models::{Criticality, FrameworkClause, SectionCitation};

/// One uncovered clause with the catalog detail a reviewer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub clause_id: String,
    pub title: String,
    pub criticality: Criticality,
    pub category: String,
}

/// Coverage of one framework by one tenant's QSP corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub framework: String,
    pub total_clauses: usize,
    pub covered: usize,
    /// Fraction covered, as a percentage with two decimals
    pub coverage_pct: f64,
    /// Every uncovered clause, criticality first then clause order
    pub uncovered: Vec<CoverageGap>,
    /// The high-criticality subset of `uncovered`
    pub high_priority_gaps: Vec<CoverageGap>,
}

/// Assess coverage of `framework` given the catalog and extracted citations.
pub fn assess(
    framework: &str,
    catalog: &[FrameworkClause],
    citations: &[SectionCitation],
) -> CoverageReport {
    let cited: AHashSet<&str> = citations
        .iter()
        .filter(|c| c.framework.as_deref() == Some(framework))
        .filter_map(|c| c.clause.as_deref())
        .collect();

    let clauses: Vec<&FrameworkClause> = catalog
        .iter()
        .filter(|c| c.framework == framework)
        .collect();

    let mut uncovered: Vec<CoverageGap> = clauses
        .iter()
        .filter(|c| !is_covered(&cited, &c.clause_id))
        .map(|c| CoverageGap {
            clause_id: c.clause_id.clone(),
            title: c.title.clone(),
            criticality: c.criticality,
            category: c.category.clone(),
        })
        .collect();

    uncovered.sort_by(|a, b| {
        a.criticality
            .rank()
            .cmp(&b.criticality.rank())
            .then_with(|| compare_clause_ids(&a.clause_id, &b.clause_id))
    });

    let total = clauses.len();
    let covered = total - uncovered.len();
    let coverage_pct = if total == 0 {
        0.0
    } else {
        round2(covered as f64 / total as f64 * 100.0)
    };

    let high_priority_gaps = uncovered
        .iter()
        .filter(|g| g.criticality == Criticality::High)
        .cloned()
        .collect();

    CoverageReport {
        framework: framework.to_string(),
        total_clauses: total,
        covered,
        coverage_pct,
        uncovered,
        high_priority_gaps,
    }
}

/// A citation of "7.3" covers catalog clause "7.3"; a citation of a deeper
/// clause also covers its catalog ancestor ("7.3.2" cites into "7.3").
fn is_covered(cited: &AHashSet<&str>, clause_id: &str) -> bool {
    if cited.contains(clause_id) {
        return true;
    }
    cited
        .iter()
        .any(|c| c.strip_prefix(clause_id).is_some_and(|rest| rest.starts_with('.')))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clause(id: &str, criticality: Criticality) -> FrameworkClause {
        FrameworkClause {
            framework: "ISO_13485".into(),
            clause_id: id.into(),
            title: format!("Clause {id}"),
            criticality,
            category: "Quality".into(),
        }
    }

    fn citation(framework: &str, clause: &str) -> SectionCitation {
        SectionCitation {
            framework: Some(framework.into()),
            standard: "ISO 13485".into(),
            version: Some("2016".into()),
            clause: Some(clause.into()),
            annex: None,
            context: String::new(),
            line: 1,
            confidence: 1.0,
        }
    }

    #[test]
    fn covered_and_uncovered_split() {
        let catalog = vec![
            clause("4.2", Criticality::Medium),
            clause("7.3", Criticality::High),
            clause("8.2", Criticality::Low),
        ];
        let citations = vec![citation("ISO_13485", "7.3")];

        let report = assess("ISO_13485", &catalog, &citations);
        assert_eq!(report.total_clauses, 3);
        assert_eq!(report.covered, 1);
        assert_eq!(report.coverage_pct, 33.33);
        assert_eq!(report.uncovered.len(), 2);
        // Criticality desc: the medium 4.2 gap sorts before the low 8.2 gap
        assert_eq!(report.uncovered[0].clause_id, "4.2");
        assert!(report.high_priority_gaps.is_empty());
    }

    #[test]
    fn deeper_citation_covers_ancestor_clause() {
        let catalog = vec![clause("7.3", Criticality::High)];
        let citations = vec![citation("ISO_13485", "7.3.2")];
        let report = assess("ISO_13485", &catalog, &citations);
        assert_eq!(report.covered, 1);
    }

    #[test]
    fn foreign_framework_citations_do_not_count() {
        let catalog = vec![clause("7.3", Criticality::High)];
        let citations = vec![citation("ISO_14971", "7.3")];
        let report = assess("ISO_13485", &catalog, &citations);
        assert_eq!(report.covered, 0);
        assert_eq!(report.high_priority_gaps.len(), 1);
    }

    #[test]
    fn gaps_sort_by_criticality_then_clause_order() {
        let catalog = vec![
            clause("10.2", Criticality::Low),
            clause("7.5", Criticality::High),
            clause("4.1", Criticality::High),
            clause("8.3", Criticality::Medium),
        ];
        let report = assess("ISO_13485", &catalog, &[]);
        let ids: Vec<&str> = report.uncovered.iter().map(|g| g.clause_id.as_str()).collect();
        assert_eq!(ids, vec!["4.1", "7.5", "8.3", "10.2"]);
        assert_eq!(report.coverage_pct, 0.0);
    }

    #[test]
    fn empty_catalog_reports_zero() {
        let report = assess("ISO_13485", &[], &[]);
        assert_eq!(report.total_clauses, 0);
        assert_eq!(report.coverage_pct, 0.0);
    }

    #[test]
    fn prefix_without_dot_boundary_is_not_coverage() {
        // A citation of "7.31" must not cover clause "7.3"
        let catalog = vec![clause("7.3", Criticality::High)];
        let citations = vec![citation("ISO_13485", "7.31")];
        let report = assess("ISO_13485", &catalog, &citations);
        assert_eq!(report.covered, 0);
    }
}
