//! Standard identification and the diff/map gate
//!
//! Extracts the `(series, part?, year)` identity from the first page of a
//! regulatory standard and decides how two uploaded standards relate:
//! versions of the same part (diffable), companion parts of one series
//! (cross-reference), or incompatible. The decision is a structured value;
//! callers choose whether to treat a non-diffable pair as fatal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::StandardIdentity;

static ISO_PART_COLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ISO\s+(\d+)-(\d+)\s*:\s*(\d{4})").expect("identity pattern"));

static ISO_PART_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ISO\s+(\d+)-(\d+)\s*\((\d{4})\)").expect("identity pattern"));

static ISO_BARE_COLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ISO\s+(\d+)\s*:\s*(\d{4})").expect("identity pattern"));

/// Extract a standard identity from first-page text.
///
/// Patterns are tried in order of specificity; the part-qualified forms win
/// over the single-part form so "ISO 10993-18:2020" never parses as series
/// 10993 alone.
pub fn identify(first_page: &str) -> Option<StandardIdentity> {
    if let Some(caps) = ISO_PART_COLON.captures(first_page) {
        return build(&caps[1], Some(&caps[2]), &caps[3]);
    }
    if let Some(caps) = ISO_PART_PAREN.captures(first_page) {
        return build(&caps[1], Some(&caps[2]), &caps[3]);
    }
    if let Some(caps) = ISO_BARE_COLON.captures(first_page) {
        return build(&caps[1], None, &caps[2]);
    }
    None
}

fn build(series: &str, part: Option<&str>, year: &str) -> Option<StandardIdentity> {
    Some(StandardIdentity {
        series: series.parse().ok()?,
        part: match part {
            Some(p) => Some(p.parse().ok()?),
            None => None,
        },
        year: year.parse().ok()?,
    })
}

/// How two uploaded standards relate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonMode {
    /// Same series and part, different years: a clause-level diff applies
    VersionDiff {
        old: StandardIdentity,
        new: StandardIdentity,
    },
    /// Same series, different parts: companion documents, not versions
    CrossReference {
        a: StandardIdentity,
        b: StandardIdentity,
    },
    /// Not comparable at all
    Incompatible { reason: String },
}

impl ComparisonMode {
    /// Operator-facing guidance for the decision.
    pub fn guidance(&self) -> String {
        match self {
            ComparisonMode::VersionDiff { old, new } => {
                format!("Comparing {old} against {new} as successive versions.")
            }
            ComparisonMode::CrossReference { a, b } => format!(
                "{a} and {b} are companion parts of the ISO {} series. \
                 They complement each other and cannot be diffed as versions; \
                 upload two revisions of the same part to run a change analysis.",
                a.series
            ),
            ComparisonMode::Incompatible { reason } => format!(
                "These documents cannot be compared: {reason}. \
                 Upload two versions of the same standard."
            ),
        }
    }

    pub fn is_diffable(&self) -> bool {
        matches!(self, ComparisonMode::VersionDiff { .. })
    }
}

/// Decide the comparison mode for two identified standards.
///
/// The year-ordered pair is normalized so `VersionDiff.old` is the earlier
/// edition regardless of upload order.
pub fn classify(a: Option<StandardIdentity>, b: Option<StandardIdentity>) -> ComparisonMode {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return ComparisonMode::Incompatible {
                reason: "a standard identity could not be extracted from one of the documents"
                    .to_string(),
            }
        }
    };

    if a == b {
        return ComparisonMode::Incompatible {
            reason: format!("both documents identify as {a}; the same edition was uploaded twice"),
        };
    }
    if a.series != b.series {
        return ComparisonMode::Incompatible {
            reason: format!(
                "{a} and {b} belong to different standard series ({} vs {})",
                a.series, b.series
            ),
        };
    }
    if a.part != b.part {
        return ComparisonMode::CrossReference { a, b };
    }

    let (old, new) = if a.year <= b.year { (a, b) } else { (b, a) };
    ComparisonMode::VersionDiff { old, new }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_part_qualified_standard() {
        let id = identify("ISO 10993-18:2020(E) Biological evaluation of medical devices").unwrap();
        assert_eq!(id, StandardIdentity::new(10993, Some(18), 2020));
    }

    #[test]
    fn identifies_paren_year_form() {
        let id = identify("ISO 10993-5 (2009) Biological evaluation").unwrap();
        assert_eq!(id, StandardIdentity::new(10993, Some(5), 2009));
    }

    #[test]
    fn identifies_single_part_standard() {
        let id = identify("ISO 14971:2019 Medical devices - Risk management").unwrap();
        assert_eq!(id, StandardIdentity::new(14971, None, 2019));
    }

    #[test]
    fn rejects_text_without_identity() {
        assert_eq!(identify("Some random document without a standard"), None);
    }

    #[test]
    fn version_diff_for_same_part_different_years() {
        let mode = classify(
            identify("ISO 10993-18:2005 Biological evaluation"),
            identify("ISO 10993-18:2020 Biological evaluation"),
        );
        match mode {
            ComparisonMode::VersionDiff { old, new } => {
                assert_eq!(old.year, 2005);
                assert_eq!(new.year, 2020);
            }
            other => panic!("expected VersionDiff, got {other:?}"),
        }
    }

    #[test]
    fn version_diff_normalizes_upload_order() {
        let newer = StandardIdentity::new(13485, None, 2016);
        let older = StandardIdentity::new(13485, None, 2003);
        match classify(Some(newer), Some(older)) {
            ComparisonMode::VersionDiff { old, new } => {
                assert_eq!(old.year, 2003);
                assert_eq!(new.year, 2016);
            }
            other => panic!("expected VersionDiff, got {other:?}"),
        }
    }

    #[test]
    fn cross_reference_for_companion_parts() {
        let mode = classify(
            identify("ISO 10993-18:2020"),
            identify("ISO 10993-17:2023"),
        );
        assert!(matches!(mode, ComparisonMode::CrossReference { .. }));
        assert!(mode.guidance().contains("companion parts"));
    }

    #[test]
    fn incompatible_for_different_series() {
        let mode = classify(identify("ISO 10993-18:2020"), identify("ISO 14971:2019"));
        assert!(matches!(mode, ComparisonMode::Incompatible { .. }));
    }

    #[test]
    fn incompatible_for_same_document_twice() {
        let id = identify("ISO 10993-18:2020");
        let mode = classify(id, id);
        match mode {
            ComparisonMode::Incompatible { reason } => {
                assert!(reason.contains("uploaded twice"));
            }
            other => panic!("expected Incompatible, got {other:?}"),
        }
    }

    #[test]
    fn incompatible_for_missing_identity() {
        let mode = classify(None, identify("ISO 14971:2019"));
        assert!(matches!(mode, ComparisonMode::Incompatible { .. }));
    }

    #[test]
    fn part_and_partless_same_series_is_cross_reference() {
        // ISO 10993:2018 (umbrella) vs ISO 10993-18:2020 (part)
        let mode = classify(
            Some(StandardIdentity::new(10993, None, 2018)),
            Some(StandardIdentity::new(10993, Some(18), 2020)),
        );
        assert!(matches!(mode, ComparisonMode::CrossReference { .. }));
    }
}
