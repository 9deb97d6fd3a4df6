//! Clause-level diff between two versions of a standard
//!
//! Operates on clause-to-text maps extracted by the parser. Classification:
//! a clause present only in the new version is `added`, only in the old is
//! `deleted`, and present in both with differing normalized text is
//! `modified`. Inputs are never truncated here.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{ChangeType, Delta};
use crate::text;

/// Clause id → full clause text for one version of a standard.
pub type ClauseMap = BTreeMap<String, String>;

/// Sort key for clause identifiers.
///
/// Dotted-numeric ids compare component-wise numerically, so
/// `7.3 < 7.3.1 < 7.5 < 10.1`. Non-numeric components sort after numeric
/// ones, alphabetically.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClauseComponent {
    Number(u64),
    Alpha(String),
}

impl Ord for ClauseComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ClauseComponent::Number(a), ClauseComponent::Number(b)) => a.cmp(b),
            (ClauseComponent::Alpha(a), ClauseComponent::Alpha(b)) => a.cmp(b),
            (ClauseComponent::Number(_), ClauseComponent::Alpha(_)) => Ordering::Less,
            (ClauseComponent::Alpha(_), ClauseComponent::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for ClauseComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn clause_key(clause_id: &str) -> Vec<ClauseComponent> {
    clause_id
        .split('.')
        .map(|part| match part.parse::<u64>() {
            Ok(n) => ClauseComponent::Number(n),
            Err(_) => ClauseComponent::Alpha(part.to_ascii_lowercase()),
        })
        .collect()
}

/// Total order over clause ids; ties on the component key fall back to the
/// raw string so the order is deterministic for ids like "07" vs "7".
pub fn compare_clause_ids(a: &str, b: &str) -> Ordering {
    clause_key(a).cmp(&clause_key(b)).then_with(|| a.cmp(b))
}

/// Diff two clause maps into an ordered delta list.
///
/// `modified` is emitted only when the normalized texts differ; formatting
/// and whitespace churn does not count as a change.
pub fn diff(old: &ClauseMap, new: &ClauseMap, framework: Option<&str>) -> Vec<Delta> {
    let mut deltas: Vec<Delta> = Vec::new();

    for (clause_id, new_text) in new {
        match old.get(clause_id) {
            None => deltas.push(Delta {
                clause_id: clause_id.clone(),
                change_type: ChangeType::Added,
                old_text: None,
                new_text: Some(new_text.clone()),
                framework: framework.map(str::to_string),
            }),
            Some(old_text) => {
                if text::normalize(old_text) != text::normalize(new_text) {
                    deltas.push(Delta {
                        clause_id: clause_id.clone(),
                        change_type: ChangeType::Modified,
                        old_text: Some(old_text.clone()),
                        new_text: Some(new_text.clone()),
                        framework: framework.map(str::to_string),
                    });
                }
            }
        }
    }

    for (clause_id, old_text) in old {
        if !new.contains_key(clause_id) {
            deltas.push(Delta {
                clause_id: clause_id.clone(),
                change_type: ChangeType::Deleted,
                old_text: Some(old_text.clone()),
                new_text: None,
                framework: framework.map(str::to_string),
            });
        }
    }

    deltas.sort_by(|a, b| compare_clause_ids(&a.clause_id, &b.clause_id));
    deltas
}

/// Build a clause map from parsed sections, keeping only clause-numbered
/// entries. Duplicate clause ids concatenate their text in document order.
pub fn clause_map_from_sections<'a, I>(sections: I) -> ClauseMap
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut map = ClauseMap::new();
    for (clause_id, body) in sections {
        map.entry(clause_id.to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str("\n\n");
                existing.push_str(body);
            })
            .or_insert_with(|| body.to_string());
    }
    map
}
