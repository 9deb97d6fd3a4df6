//! Trigram similarity
//!
//! Word-padded trigram sets with Jaccard similarity, matching the behavior
//! of Postgres trigram indexes: each lowercased word is padded with two
//! leading and one trailing space before 3-grams are taken, so short ids
//! like "4.2.4" still produce a meaningful gram set.

use ahash::AHashSet;

/// Extract the padded trigram set of a string.
pub fn trigrams(text: &str) -> AHashSet<[char; 3]> {
    let mut grams = AHashSet::new();
    for word in words(text) {
        let padded: Vec<char> = std::iter::repeat(' ')
            .take(2)
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            grams.insert([window[0], window[1], window[2]]);
        }
    }
    grams
}

/// Jaccard similarity of two trigram sets, in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let ga = trigrams(a);
    let gb = trigrams(b);
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }
    let shared = ga.intersection(&gb).count();
    let union = ga.len() + gb.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

/// Weighted lexical score over the three searchable fields:
/// `3·sim(clause_id) + 2·sim(heading) + 1·sim(text)`, range [0, 6].
pub fn weighted_field_score(
    query: &str,
    clause_id: Option<&str>,
    heading: &str,
    text: &str,
) -> f64 {
    let clause_sim = clause_id.map_or(0.0, |c| similarity(query, c));
    3.0 * clause_sim + 2.0 * similarity(query, heading) + similarity(query, text)
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '.')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}
