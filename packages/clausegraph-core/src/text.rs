//! Text normalization (ingest side of the pipeline)
//!
//! Normalization collapses whitespace and strips control characters while
//! preserving paragraph structure. Stored section text and diff inputs are
//! always full length; `embed_truncate` is the single truncation chokepoint
//! and is called only by the embedding client.

/// Collapse whitespace runs to single spaces, preserve paragraph breaks as
/// `"\n\n"`, and strip C0/C1 control characters other than `\t` and `\n`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, paragraph) in split_paragraphs(text).enumerate() {
        let mut pending_space = false;
        let mut wrote = false;
        if i > 0 {
            out.push_str("\n\n");
        }
        for ch in paragraph.chars() {
            if is_stripped_control(ch) {
                continue;
            }
            if ch.is_whitespace() {
                pending_space = wrote;
                continue;
            }
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
            wrote = true;
        }
    }
    out
}

/// Remove page headers and footers left behind by text extraction:
/// `Page 12 ...` lines and bare `3 / 14` counters.
pub fn strip_page_artifacts(text: &str) -> String {
    let mut kept = Vec::new();
    for line in text.lines() {
        let t = line.trim();
        if is_page_header(t) || is_page_counter(t) {
            continue;
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Truncate `text` for an embedding request, respecting char boundaries.
///
/// This is the only place in the engine where text is shortened; storage and
/// diffing operate on full-length text.
pub fn embed_truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").filter(|p| !p.trim().is_empty())
}

fn is_stripped_control(ch: char) -> bool {
    let code = ch as u32;
    // C0 except tab/newline, DEL, and C1
    (code < 0x20 && ch != '\t' && ch != '\n') || code == 0x7F || (0x80..=0x9F).contains(&code)
}

fn is_page_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("page ")
        && lower[5..]
            .split_whitespace()
            .next()
            .is_some_and(|tok| tok.chars().all(|c| c.is_ascii_digit()))
}

fn is_page_counter(line: &str) -> bool {
    let mut parts = line.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => {
            let a = a.trim();
            let b = b.trim();
            !a.is_empty()
                && !b.is_empty()
                && a.chars().all(|c| c.is_ascii_digit())
                && b.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(normalize("a  b\t\tc"), "a b c");
        assert_eq!(normalize("  leading and trailing  "), "leading and trailing");
    }

    #[test]
    fn preserves_paragraph_breaks() {
        let input = "first  paragraph\nstill first\n\nsecond   paragraph";
        assert_eq!(normalize(input), "first paragraph still first\n\nsecond paragraph");
    }

    #[test]
    fn strips_control_chars() {
        assert_eq!(normalize("a\u{0000}b\u{0007}c"), "abc");
        assert_eq!(normalize("a\u{009F}b"), "ab");
    }

    #[test]
    fn empty_paragraphs_do_not_multiply() {
        assert_eq!(normalize("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = embed_truncate(s, 4);
        assert_eq!(t, "héll");
        assert_eq!(embed_truncate("short", 100), "short");
    }

    #[test]
    fn normalize_never_shortens_long_text() {
        let long: String = "word ".repeat(40_000);
        let normalized = normalize(&long);
        // 40k words survive; only the trailing space is folded away.
        assert_eq!(normalized.split(' ').count(), 40_000);
    }

    #[test]
    fn page_artifacts_are_dropped() {
        let input = "4.1 Scope\nPage 3 of 12\n2 / 12\nActual content";
        assert_eq!(strip_page_artifacts(input), "4.1 Scope\nActual content");
    }

    #[test]
    fn slash_in_prose_is_kept() {
        let input = "approved by QA / RA";
        assert_eq!(strip_page_artifacts(input), input);
    }
}
