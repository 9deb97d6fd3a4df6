//! Section decomposition
//!
//! Turns a document's raw text into an ordered list of clause-addressable
//! section drafts. The parser never fails on content: when no header shape
//! is recognized, the whole document becomes a single section so nothing is
//! dropped.

mod patterns;
mod references;

pub use patterns::framework_for_series;
pub use references::{extract_citations, extract_cross_references};

use crate::models::{DocKind, SectionDraft};
use crate::parser::patterns::header_patterns;
use crate::text;

/// Caller-supplied context for a parse.
#[derive(Debug, Clone, Default)]
pub struct ParseHints {
    /// Used as the heading of the single-section fallback
    pub display_name: String,
    /// Page number the text starts on, when the extractor knows it
    pub first_page: Option<u32>,
}

struct OpenSection {
    clause_id: Option<String>,
    heading: String,
    depth: u32,
    lines: Vec<String>,
}

/// Decompose `raw_text` into ordered section drafts.
///
/// Header lines are matched against the layered pattern set for `doc_kind`;
/// lines between two headers become the body of the earlier section. QSP
/// documents additionally get cross-reference and citation extraction over
/// each section body.
pub fn parse(raw_text: &str, doc_kind: DocKind, hints: &ParseHints) -> Vec<SectionDraft> {
    let cleaned = text::strip_page_artifacts(raw_text);
    let patterns = header_patterns(doc_kind);

    let mut sections: Vec<SectionDraft> = Vec::new();
    let mut open: Option<OpenSection> = None;
    let mut preamble: Vec<String> = Vec::new();

    for line in cleaned.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if let Some(sec) = open.as_mut() {
                sec.lines.push(String::new());
            }
            continue;
        }

        let header = patterns.iter().find_map(|p| {
            p.regex.captures(trimmed).map(|caps| {
                let id = caps[1].to_string();
                let heading = caps[2].trim().to_string();
                let depth = if p.numeric {
                    id.split('.').count() as u32
                } else {
                    1
                };
                (id, heading, depth)
            })
        });

        match header {
            Some((clause_id, heading, depth)) => {
                if let Some(done) = open.take() {
                    sections.push(close_section(done, doc_kind));
                }
                open = Some(OpenSection {
                    clause_id: Some(clause_id),
                    heading,
                    depth,
                    lines: Vec::new(),
                });
            }
            None => match open.as_mut() {
                Some(sec) => sec.lines.push(trimmed.to_string()),
                None => preamble.push(trimmed.to_string()),
            },
        }
    }

    if let Some(done) = open.take() {
        sections.push(close_section(done, doc_kind));
    }

    if sections.is_empty() {
        let body = text::normalize(&cleaned);
        if body.is_empty() {
            return Vec::new();
        }
        return vec![fallback_section(body, doc_kind, hints)];
    }

    // Front matter before the first header survives as an unnumbered section.
    let front = text::normalize(&preamble.join("\n"));
    if !front.is_empty() {
        let mut draft = SectionDraft {
            clause_id: None,
            section_path: String::new(),
            heading: hints.display_name.clone(),
            text: front,
            page: hints.first_page,
            depth: 1,
            cross_references: Vec::new(),
            citations: Vec::new(),
        };
        attach_references(&mut draft, doc_kind);
        sections.insert(0, draft);
    }

    sections
}

fn close_section(open: OpenSection, doc_kind: DocKind) -> SectionDraft {
    let body = text::normalize(&open.lines.join("\n"));
    let mut draft = SectionDraft {
        section_path: open.clause_id.clone().unwrap_or_default(),
        clause_id: open.clause_id,
        heading: open.heading,
        text: body,
        page: None,
        depth: open.depth,
        cross_references: Vec::new(),
        citations: Vec::new(),
    };
    attach_references(&mut draft, doc_kind);
    draft
}

fn fallback_section(body: String, doc_kind: DocKind, hints: &ParseHints) -> SectionDraft {
    let mut draft = SectionDraft {
        clause_id: None,
        section_path: String::new(),
        heading: hints.display_name.clone(),
        text: body,
        page: hints.first_page,
        depth: 1,
        cross_references: Vec::new(),
        citations: Vec::new(),
    };
    attach_references(&mut draft, doc_kind);
    draft
}

fn attach_references(draft: &mut SectionDraft, doc_kind: DocKind) {
    if doc_kind == DocKind::Qsp {
        let searchable = format!("{}\n{}", draft.heading, draft.text);
        draft.cross_references = extract_cross_references(&searchable);
        draft.citations = extract_citations(&searchable);
    }
}
