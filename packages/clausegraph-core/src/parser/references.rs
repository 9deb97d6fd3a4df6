//! Reference extraction from QSP section text
//!
//! Two extraction passes run over each QSP section: internal document
//! references (other QSPs, work instructions, forms) and explicit regulatory
//! citations ("per ISO 14971:2019 Clause 5.1"). Citations feed coverage
//! assessment; document references feed the traceability view.

use crate::models::{CrossReference, SectionCitation};
use crate::parser::patterns::{
    framework_for_series, ACTION_VERBS, CFR_SECTION, CITATION_ANNEX, CITATION_CLAUSE,
    DOC_REF_PATTERNS, ISO_STANDARD, MDR_ARTICLE,
};

const CONTEXT_CAP: usize = 200;

static VERSION_YEAR: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r":\d{4}").expect("citation pattern"));

/// Extract references to other internal documents.
pub fn extract_cross_references(text: &str) -> Vec<CrossReference> {
    let mut refs = Vec::new();
    for line in text.lines() {
        for pattern in DOC_REF_PATTERNS {
            for m in pattern.regex.find_iter(line) {
                refs.push(CrossReference {
                    target_doc: m.as_str().trim().to_string(),
                    kind: pattern.kind.to_string(),
                    context: line.trim().to_string(),
                });
            }
        }
    }
    refs.sort_by(|a, b| a.target_doc.cmp(&b.target_doc));
    refs.dedup_by(|a, b| a.target_doc == b.target_doc && a.kind == b.kind);
    refs
}

/// Extract explicit regulatory citations with a line of context on each side.
pub fn extract_citations(text: &str) -> Vec<SectionCitation> {
    let lines: Vec<&str> = text.lines().collect();
    let mut citations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let context = context_window(&lines, idx);

        for m in ISO_STANDARD.captures_iter(line) {
            let series: u32 = match m[1].parse() {
                Ok(s) => s,
                Err(_) => continue,
            };
            let version = m.get(2).map(|v| v.as_str().to_string());
            let clause = CITATION_CLAUSE
                .captures(&context)
                .map(|c| trim_trailing_dot(&c[1]));
            let annex = CITATION_ANNEX.captures(&context).map(|c| c[1].to_string());

            citations.push(SectionCitation {
                framework: framework_for_series(series).map(str::to_string),
                standard: format!("ISO {series}"),
                version,
                clause,
                annex,
                context: cap(&context),
                line: idx + 1,
                confidence: citation_confidence(&context),
            });
        }

        for m in CFR_SECTION.captures_iter(line) {
            citations.push(SectionCitation {
                framework: Some(cfr_framework(&m[1]).to_string()),
                standard: "21 CFR".to_string(),
                version: None,
                clause: Some(trim_trailing_dot(&m[1])),
                annex: None,
                context: cap(&context),
                line: idx + 1,
                confidence: citation_confidence(&context),
            });
        }

        for m in MDR_ARTICLE.captures_iter(line) {
            // Bare "Art. N" without an MDR anchor nearby is too ambiguous
            if !line.to_ascii_uppercase().contains("MDR")
                && !context.to_ascii_lowercase().contains("medical device regulation")
            {
                continue;
            }
            citations.push(SectionCitation {
                framework: Some("MDR_2017_745".to_string()),
                standard: "MDR 2017/745".to_string(),
                version: None,
                clause: Some(format!("Article {}", trim_trailing_dot(&m[1]))),
                annex: CITATION_ANNEX.captures(&context).map(|c| c[1].to_string()),
                context: cap(&context),
                line: idx + 1,
                confidence: citation_confidence(&context),
            });
        }
    }

    citations
}

fn context_window(lines: &[&str], idx: usize) -> String {
    let start = idx.saturating_sub(1);
    let end = (idx + 2).min(lines.len());
    lines[start..end].join(" ")
}

fn cap(context: &str) -> String {
    context.chars().take(CONTEXT_CAP).collect()
}

fn trim_trailing_dot(clause: &str) -> String {
    clause.trim_end_matches('.').to_string()
}

/// Confidence heuristic: a year, a clause number, and an action verb each
/// strengthen the citation.
fn citation_confidence(context: &str) -> f64 {
    let mut score: f64 = 0.6;
    if VERSION_YEAR.is_match(context) {
        score += 0.15;
    }
    if CITATION_CLAUSE.is_match(context) {
        score += 0.15;
    }
    if ACTION_VERBS.is_match(context) {
        score += 0.10;
    }
    score.min(1.0)
}

fn cfr_framework(section: &str) -> &'static str {
    if section.starts_with("820") {
        "FDA_21CFR820"
    } else if section.starts_with("11") {
        "21CFR_PART11"
    } else {
        "FDA_21CFR"
    }
}
