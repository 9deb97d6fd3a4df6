//! Reviewer-facing rationale text
//!
//! Rationales state what the reviewer should do with a proposed impact;
//! they never assert compliance or non-compliance. The template is chosen
//! by change type, the leading word by similarity tier.

use once_cell::sync::Lazy;
use regex::Regex;

use clausegraph_core::models::ChangeType;

/// Similarity tier words used in rationales.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Strong,
    Moderate,
    Potential,
}

impl Strength {
    pub fn for_similarity(similarity: f64, strong_floor: f64, moderate_floor: f64) -> Self {
        if similarity > strong_floor {
            Strength::Strong
        } else if similarity > moderate_floor {
            Strength::Moderate
        } else {
            Strength::Potential
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::Strong => "Strong",
            Strength::Moderate => "Moderate",
            Strength::Potential => "Potential",
        }
    }
}

/// Build the rationale for one proposed impact.
pub fn build(
    change_type: ChangeType,
    strength: Strength,
    clause_id: &str,
    qsp_heading: &str,
    similarity: f64,
) -> String {
    let lead = strength.as_str();
    match change_type {
        ChangeType::Modified => format!(
            "{lead} match: the change to clause {clause_id} aligns with QSP section \
             '{qsp_heading}' (similarity {similarity:.2}). Review the procedure to confirm \
             it still reflects the updated requirement."
        ),
        ChangeType::Added => format!(
            "{lead} match: new clause {clause_id} relates to QSP section '{qsp_heading}' \
             (similarity {similarity:.2}). Review the procedure and update it to address \
             the new requirement."
        ),
        ChangeType::Deleted => format!(
            "{lead} match: removed clause {clause_id} was reflected in QSP section \
             '{qsp_heading}' (similarity {similarity:.2}). Review the procedure; text tied \
             to the removed requirement may be simplified."
        ),
    }
}

static QSP_DOC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*-\d+)").expect("qsp doc pattern"));

/// Extract a compact QSP document identifier from a display name.
///
/// "7.3-3 QSP 7.3-3 R9 Design Control" becomes "7.3-3"; names without a
/// leading document number fall back to their first token.
pub fn qsp_doc_id(display_name: &str) -> String {
    let trimmed = display_name.trim();
    if let Some(caps) = QSP_DOC_ID.captures(trimmed) {
        return caps[1].to_string();
    }
    trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_tiers() {
        assert_eq!(Strength::for_similarity(0.80, 0.75, 0.65), Strength::Strong);
        assert_eq!(Strength::for_similarity(0.70, 0.75, 0.65), Strength::Moderate);
        assert_eq!(Strength::for_similarity(0.60, 0.75, 0.65), Strength::Potential);
        // Floors are exclusive
        assert_eq!(Strength::for_similarity(0.75, 0.75, 0.65), Strength::Moderate);
    }

    #[test]
    fn rationale_names_heading_and_tier() {
        let r = build(
            ChangeType::Modified,
            Strength::Strong,
            "4.2.4",
            "Electronic Record Control",
            0.81,
        );
        assert!(r.starts_with("Strong match:"));
        assert!(r.contains("Electronic Record Control"));
        assert!(r.contains("4.2.4"));
        assert!(r.contains("Review"));
    }

    #[test]
    fn rationale_never_asserts_compliance() {
        for ct in [ChangeType::Added, ChangeType::Modified, ChangeType::Deleted] {
            let r = build(ct, Strength::Potential, "7.1", "Risk Management", 0.6);
            assert!(!r.to_lowercase().contains("non-compliant"));
            assert!(!r.to_lowercase().contains("violates"));
        }
    }

    #[test]
    fn qsp_doc_id_extraction() {
        assert_eq!(qsp_doc_id("7.3-3 QSP 7.3-3 R9 Design Control"), "7.3-3");
        assert_eq!(qsp_doc_id("4.2-4 Document Control"), "4.2-4");
        assert_eq!(qsp_doc_id("QSP 7.3-3 R9"), "QSP");
        assert_eq!(qsp_doc_id("  Quality Manual"), "Quality");
        assert_eq!(qsp_doc_id(""), "");
    }
}
