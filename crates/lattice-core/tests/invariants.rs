//! Whole-graph consistency under random mutation sequences.
//!
//! Every operation must leave the two indices agreeing with each other: each
//! Location child backed by a ContextRef, each ContextRef backed by a child,
//! no orphan Lexemes, no empty Locations, children in rank order.

use std::collections::BTreeSet;

use proptest::prelude::*;

use lattice_core::identity::same_value;
use lattice_core::{
    ApplyError, FixedClock, GraphOp, Rank, ThoughtGraph, Timestamp, UnrankedPath, apply_op,
    export_text, import_text, lexeme_key, location_key, normalize, rank_after, rank_before,
};

fn clock() -> FixedClock {
    FixedClock(Timestamp::from_millis(1))
}

fn assert_consistent(graph: &ThoughtGraph) {
    for (key, location) in graph.locations() {
        assert_eq!(
            *key,
            location_key(location.context()),
            "location keyed by its own context"
        );
        assert!(
            !location.children().is_empty() || location.is_pending(),
            "empty locations are collected"
        );
        let ranks: Vec<Rank> = location.children().iter().map(|c| c.rank).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "children rank-sorted");

        let mut seen = BTreeSet::new();
        for child in location.children() {
            let identity = normalize(&child.value).as_str().to_string();
            assert!(
                seen.insert((identity, child.rank)),
                "no duplicate (value, rank) pair in one location"
            );
            let lexeme = graph
                .lexeme_for(&child.value)
                .unwrap_or_else(|| panic!("child {:?} has a lexeme", child.value));
            assert!(
                lexeme
                    .contexts()
                    .iter()
                    .any(|r| r.context == *key && r.rank == child.rank),
                "child {:?} backed by a context ref",
                child.value
            );
        }
    }

    for (key, lexeme) in graph.lexemes() {
        assert_eq!(
            *key,
            lexeme_key(lexeme.value()),
            "lexeme keyed by its normal form"
        );
        assert!(!lexeme.contexts().is_empty(), "orphan lexemes are collected");
        for r in lexeme.contexts() {
            let location = graph
                .location(r.context)
                .unwrap_or_else(|| panic!("ref of {:?} has a location", lexeme.value()));
            assert!(
                location
                    .children()
                    .iter()
                    .any(|c| c.rank == r.rank && same_value(&c.value, lexeme.value())),
                "ref of {:?} backed by a child",
                lexeme.value()
            );
        }
    }
}

fn value_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string)
}

fn path_strategy() -> impl Strategy<Value = UnrankedPath> {
    prop::collection::vec(value_strategy(), 1..=3).prop_map(UnrankedPath::new)
}

fn context_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(value_strategy(), 0..=2)
}

// A small pool so generated ranks collide with allocated ones.
fn rank_strategy() -> impl Strategy<Value = Rank> {
    (-4i32..12).prop_map(|n| Rank::new(f64::from(n) / 2.0).unwrap())
}

fn op_strategy() -> impl Strategy<Value = GraphOp> {
    prop_oneof![
        3 => (context_strategy(), value_strategy(), prop::option::of(rank_strategy())).prop_map(
            |(context, value, rank)| GraphOp::Insert {
                context,
                value,
                rank
            }
        ),
        1 => (path_strategy(), value_strategy())
            .prop_map(|(path, value)| GraphOp::Rename { path, value }),
        2 => (path_strategy(), context_strategy(), prop::option::of(rank_strategy())).prop_map(
            |(path, to_context, rank)| GraphOp::Move {
                path,
                to_context,
                rank
            }
        ),
        1 => path_strategy().prop_map(|path| GraphOp::Delete { path }),
        1 => path_strategy().prop_map(|path| GraphOp::Archive { path }),
        1 => (path_strategy(), 0usize..4).prop_map(|(path, offset)| GraphOp::Split {
            path,
            offset
        }),
        1 => path_strategy().prop_map(|path| GraphOp::Merge { path }),
        1 => (context_strategy(), prop::collection::vec(value_strategy(), 1..=2)).prop_map(
            |(context, values)| GraphOp::Subcategorize { context, values }
        ),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_op_sequences_keep_the_indices_agreeing(
        ops in prop::collection::vec(op_strategy(), 1..24),
    ) {
        let clock = clock();
        let mut graph = ThoughtGraph::new();
        for op in &ops {
            match apply_op(&mut graph, op, &clock) {
                Ok(_) => {}
                // Splits at random offsets may fall past the end.
                Err(ApplyError::InvalidOffset(_)) => {}
                Err(err) => panic!("unexpected error for {op:?}: {err}"),
            }
            assert_consistent(&graph);
        }
    }

    #[test]
    fn bisection_lands_between_the_neighbouring_ranks(
        pool in prop::collection::btree_set(-100i32..100, 1..12),
        pick in 0usize..12,
    ) {
        let ranks: Vec<Rank> = pool
            .into_iter()
            .map(|n| Rank::new(f64::from(n)).unwrap())
            .collect();
        let index = pick % ranks.len();
        let target = ranks[index];

        let before = rank_before(&ranks, target);
        prop_assert!(before < target);
        if index > 0 {
            prop_assert!(before > ranks[index - 1]);
        }

        let after = rank_after(&ranks, target);
        prop_assert!(after > target);
        if index + 1 < ranks.len() {
            prop_assert!(after < ranks[index + 1]);
        }
    }

    #[test]
    fn text_form_is_stable_after_one_import(
        ops in prop::collection::vec(op_strategy(), 1..16),
    ) {
        let clock = clock();
        let mut graph = ThoughtGraph::new();
        for op in &ops {
            // Offset errors are the only expected failures.
            let _ = apply_op(&mut graph, op, &clock);
        }

        // A first import normalizes ranks and collapses duplicate siblings;
        // after that the text form is a fixed point.
        let mut first = ThoughtGraph::new();
        import_text(&mut first, &export_text(&graph), &clock).unwrap();
        let exported = export_text(&first);

        let mut second = ThoughtGraph::new();
        import_text(&mut second, &exported, &clock).unwrap();
        prop_assert_eq!(export_text(&second), exported);
    }
}
