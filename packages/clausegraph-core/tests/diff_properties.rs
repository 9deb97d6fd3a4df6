//! Property tests for the clause diff and confidence calibration.

use std::collections::BTreeMap;

use clausegraph_core::diff::{compare_clause_ids, diff};
use clausegraph_core::models::ChangeType;
use clausegraph_core::retrieval::{calibrate, ConfidenceWeights};
use proptest::prelude::*;

fn clause_id_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(1u8..20, 1..4).prop_map(|parts| {
        parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".")
    })
}

fn clause_map_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(clause_id_strategy(), "[a-z ]{0,40}", 0..12)
}

proptest! {
    /// Forward and reverse diffs agree on the changed clause set, with
    /// added and deleted swapping roles and modified preserved.
    #[test]
    fn diff_symmetry(a in clause_map_strategy(), b in clause_map_strategy()) {
        let forward = diff(&a, &b, None);
        let reverse = diff(&b, &a, None);

        let mut forward_swapped: Vec<(String, ChangeType)> = forward
            .iter()
            .map(|d| {
                let swapped = match d.change_type {
                    ChangeType::Added => ChangeType::Deleted,
                    ChangeType::Deleted => ChangeType::Added,
                    ChangeType::Modified => ChangeType::Modified,
                };
                (d.clause_id.clone(), swapped)
            })
            .collect();
        let mut reverse_set: Vec<(String, ChangeType)> = reverse
            .iter()
            .map(|d| (d.clause_id.clone(), d.change_type))
            .collect();
        forward_swapped.sort();
        reverse_set.sort();
        prop_assert_eq!(forward_swapped, reverse_set);
    }

    /// The delta list comes out sorted under the clause-id order.
    #[test]
    fn diff_output_is_ordered(a in clause_map_strategy(), b in clause_map_strategy()) {
        let deltas = diff(&a, &b, None);
        for pair in deltas.windows(2) {
            prop_assert_ne!(
                compare_clause_ids(&pair[0].clause_id, &pair[1].clause_id),
                std::cmp::Ordering::Greater
            );
        }
    }

    /// Diffing a map against itself yields nothing.
    #[test]
    fn diff_self_is_empty(a in clause_map_strategy()) {
        prop_assert!(diff(&a, &a, None).is_empty());
    }

    /// Clause-id comparison is a total order: antisymmetric and transitive
    /// over arbitrary triples.
    #[test]
    fn clause_order_is_consistent(
        a in clause_id_strategy(),
        b in clause_id_strategy(),
        c in clause_id_strategy(),
    ) {
        use std::cmp::Ordering;
        prop_assert_eq!(compare_clause_ids(&a, &b), compare_clause_ids(&b, &a).reverse());
        if compare_clause_ids(&a, &b) != Ordering::Greater
            && compare_clause_ids(&b, &c) != Ordering::Greater
        {
            prop_assert_ne!(compare_clause_ids(&a, &c), Ordering::Greater);
        }
    }

    /// Calibrated confidence stays in [0, 1] for any signal combination.
    #[test]
    fn confidence_bounds(
        bm25 in 0.0f64..100.0,
        vector in 0.0f64..1.0,
        rerank in prop::option::of(-50.0f64..50.0),
        clause_match in any::<bool>(),
    ) {
        let c = calibrate(&ConfidenceWeights::default(), bm25, vector, rerank, clause_match);
        prop_assert!((0.0..=1.0).contains(&c));
        // Three-decimal rounding holds
        prop_assert_eq!((c * 1000.0).round() / 1000.0, c);
    }
}
