//! Pattern tables for section decomposition and reference extraction
//!
//! Header patterns are layered and tested in order; the first pattern that
//! matches a line's prefix wins. Ordering goes from most to least specific,
//! so a numbered clause never falls through to a looser shape.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::DocKind;

/// One recognized section-header shape.
pub struct HeaderPattern {
    pub regex: &'static Lazy<Regex>,
    /// Capture 1 is a dotted clause number rather than a letter or numeral
    pub numeric: bool,
}

static NUMERIC_DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\s+(\S.*)$").expect("header pattern"));

static CLAUSE_PREFIXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Cc]lause\s+(\d+(?:\.\d+)*):?\s+(\S.*)$").expect("header pattern"));

static LETTER_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])\.\s+(\S.*)$").expect("header pattern"));

static LETTER_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z])\)\s+(\S.*)$").expect("header pattern"));

static ROMAN_DOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([IVX]+)\.\s+(\S.*)$").expect("header pattern"));

static BRACKET_ALPHA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(([a-z])\)\s+(\S.*)$").expect("header pattern"));

static QSP_HEADERS: &[HeaderPattern] = &[
    HeaderPattern { regex: &NUMERIC_DOTTED, numeric: true },
    HeaderPattern { regex: &ROMAN_DOT, numeric: false },
    HeaderPattern { regex: &LETTER_DOT, numeric: false },
    HeaderPattern { regex: &BRACKET_ALPHA, numeric: false },
];

static REGULATORY_HEADERS: &[HeaderPattern] = &[
    HeaderPattern { regex: &CLAUSE_PREFIXED, numeric: true },
    HeaderPattern { regex: &NUMERIC_DOTTED, numeric: true },
    HeaderPattern { regex: &ROMAN_DOT, numeric: false },
    HeaderPattern { regex: &LETTER_PAREN, numeric: false },
    HeaderPattern { regex: &BRACKET_ALPHA, numeric: false },
];

/// Header pattern set for a document kind, in match-priority order.
pub fn header_patterns(kind: DocKind) -> &'static [HeaderPattern] {
    match kind {
        DocKind::Qsp => QSP_HEADERS,
        DocKind::Regulatory => REGULATORY_HEADERS,
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Internal document references (QSPs, work instructions, forms, manuals)
// ───────────────────────────────────────────────────────────────────────────

pub struct DocRefPattern {
    pub kind: &'static str,
    pub regex: &'static Lazy<Regex>,
}

static REF_QSP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)QSP\s*\d+\.\d+-\d+(?:\s+R\d+)?").expect("ref pattern"));

static REF_WI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"WI-[A-Z]{2,3}-\d{3,4}").expect("ref pattern"));

static REF_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:F-[A-Z]+-\d+|Form\s*\d+\.\d+-\d+-[A-Z])").expect("ref pattern"));

static REF_MANUAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"QM\d+\s*R\d+").expect("ref pattern"));

pub static DOC_REF_PATTERNS: &[DocRefPattern] = &[
    DocRefPattern { kind: "QSP", regex: &REF_QSP },
    DocRefPattern { kind: "WI", regex: &REF_WI },
    DocRefPattern { kind: "FORM", regex: &REF_FORM },
    DocRefPattern { kind: "QM", regex: &REF_MANUAL },
];

// ───────────────────────────────────────────────────────────────────────────
// Regulatory citations
// ───────────────────────────────────────────────────────────────────────────

pub static ISO_STANDARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ISO\s+(\d+)(?::(\d{4}))?").expect("citation pattern"));

pub static CITATION_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:Clause|Section)\s+([\d.]+)").expect("citation pattern"));

pub static CITATION_ANNEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Annex\s+([A-Z]\d*|[IVX]+)").expect("citation pattern"));

pub static CFR_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"21\s*CFR\s*(?:Part\s*)?([\d.]+)").expect("citation pattern"));

pub static MDR_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:MDR\s+)?Art(?:icle|\.)?\s+([\d.]+)").expect("citation pattern"));

/// Verbs that signal an intentional compliance statement rather than a
/// passing mention; they raise extraction confidence.
pub static ACTION_VERBS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:per|according to|complies with|implements|in accordance with)\b")
        .expect("citation pattern")
});

/// Map an ISO series number to its framework tag, when it names one we track.
pub fn framework_for_series(series: u32) -> Option<&'static str> {
    match series {
        13485 => Some("ISO_13485"),
        14971 => Some("ISO_14971"),
        10993 => Some("ISO_10993"),
        11135 => Some("ISO_11135"),
        11607 => Some("ISO_11607"),
        _ => None,
    }
}
