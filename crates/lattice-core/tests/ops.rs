//! End-to-end mutation scenarios over the public API.

use lattice_core::{
    ApplyError, FixedClock, GraphOp, Rank, ThoughtGraph, Timestamp, UnrankedPath, apply_op,
    export_text, import_text, rank_before,
};

fn clock() -> FixedClock {
    FixedClock(Timestamp::from_millis(1_726_000_000_000))
}

fn ctx(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn run(graph: &mut ThoughtGraph, op: GraphOp) {
    apply_op(graph, &op, &clock()).unwrap();
}

fn insert(graph: &mut ThoughtGraph, context: &[&str], value: &str) {
    run(
        graph,
        GraphOp::Insert {
            context: ctx(context),
            value: value.to_string(),
            rank: None,
        },
    );
}

fn values_at(graph: &ThoughtGraph, context: &[&str]) -> Vec<String> {
    graph
        .children(context)
        .iter()
        .map(|c| c.value.clone())
        .collect()
}

#[test]
fn appended_siblings_take_ranks_zero_and_one() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "a");
    insert(&mut graph, &[], "b");

    let children = graph.children::<&str>(&[]);
    assert_eq!(children[0].value, "a");
    assert_eq!(children[0].rank, Rank::ZERO);
    assert_eq!(children[1].value, "b");
    assert_eq!(children[1].rank, Rank::new(1.0).unwrap());
}

#[test]
fn rank_before_inserts_between_siblings() {
    let mut graph = ThoughtGraph::new();
    for value in ["a", "b", "c"] {
        insert(&mut graph, &[], value);
    }
    let location = graph.location_for::<&str>(&[]).unwrap();
    let b_rank = location.child("b").unwrap().rank;
    let rank = rank_before(&location.ranks(), b_rank);

    run(
        &mut graph,
        GraphOp::Insert {
            context: ctx(&[]),
            value: "x".to_string(),
            rank: Some(rank),
        },
    );
    assert_eq!(values_at(&graph, &[]), ["a", "x", "b", "c"]);
}

#[test]
fn archiving_a_childless_thought_deletes_it() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "a");
    insert(&mut graph, &[], "b");

    run(
        &mut graph,
        GraphOp::Archive {
            path: UnrankedPath::new(["a"]),
        },
    );
    assert_eq!(values_at(&graph, &[]), ["b"]);
    assert!(graph.lexeme_for("=archive").is_none(), "no =archive created");
}

#[test]
fn archiving_nonempty_thoughts_collects_them_under_archive() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "a");
    insert(&mut graph, &["a"], "a1");
    insert(&mut graph, &[], "b");
    insert(&mut graph, &["b"], "b1");

    run(
        &mut graph,
        GraphOp::Archive {
            path: UnrankedPath::new(["a"]),
        },
    );
    assert_eq!(values_at(&graph, &[]), ["=archive", "b"]);
    assert_eq!(values_at(&graph, &["=archive"]), ["a"]);
    assert_eq!(values_at(&graph, &["=archive", "a"]), ["a1"]);

    run(
        &mut graph,
        GraphOp::Archive {
            path: UnrankedPath::new(["b"]),
        },
    );
    assert_eq!(values_at(&graph, &[]), ["=archive"]);
    assert_eq!(values_at(&graph, &["=archive"]), ["a", "b"]);
}

#[test]
fn archive_is_one_level_deep() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "a");
    insert(&mut graph, &["a"], "a1");
    insert(&mut graph, &[], "b");

    run(
        &mut graph,
        GraphOp::Archive {
            path: UnrankedPath::new(["a"]),
        },
    );
    assert_eq!(values_at(&graph, &["=archive"]), ["a"]);

    // Archiving again, inside =archive, deletes permanently.
    run(
        &mut graph,
        GraphOp::Archive {
            path: UnrankedPath::new(["=archive", "a"]),
        },
    );
    assert!(graph.lexeme_for("a").is_none());
    assert!(graph.lexeme_for("a1").is_none());
    assert_eq!(values_at(&graph, &["=archive"]), Vec::<String>::new());
}

#[test]
fn split_divides_the_text_in_place() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "apple");
    run(
        &mut graph,
        GraphOp::Split {
            path: UnrankedPath::new(["apple"]),
            offset: 2,
        },
    );
    assert_eq!(values_at(&graph, &[]), ["ap", "ple"]);
}

#[test]
fn split_leaves_children_with_the_left_half() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "apple");
    insert(&mut graph, &["apple"], "seed");

    run(
        &mut graph,
        GraphOp::Split {
            path: UnrankedPath::new(["apple"]),
            offset: 2,
        },
    );
    assert_eq!(values_at(&graph, &["ap"]), ["seed"]);
    assert_eq!(values_at(&graph, &["ple"]), Vec::<String>::new());
}

#[test]
fn merge_concatenates_and_adopts_children() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "a");
    insert(&mut graph, &[], "b");
    insert(&mut graph, &["b"], "b1");

    run(
        &mut graph,
        GraphOp::Merge {
            path: UnrankedPath::new(["b"]),
        },
    );
    assert_eq!(values_at(&graph, &[]), ["ab"]);
    assert_eq!(values_at(&graph, &["ab"]), ["b1"]);
    assert!(graph.lexeme_for("b").is_none());
}

#[test]
fn merge_then_split_restores_both_texts() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "left");
    insert(&mut graph, &["left"], "l1");
    insert(&mut graph, &[], "right");
    insert(&mut graph, &["right"], "r1");

    run(
        &mut graph,
        GraphOp::Merge {
            path: UnrankedPath::new(["right"]),
        },
    );
    assert_eq!(values_at(&graph, &[]), ["leftright"]);
    let mut adopted = values_at(&graph, &["leftright"]);
    adopted.sort();
    assert_eq!(adopted, ["l1", "r1"]);

    run(
        &mut graph,
        GraphOp::Split {
            path: UnrankedPath::new(["leftright"]),
            offset: "left".len(),
        },
    );
    assert_eq!(values_at(&graph, &[]), ["left", "right"]);
    // Children stay with the left half after a split.
    let mut kept = values_at(&graph, &["left"]);
    kept.sort();
    assert_eq!(kept, ["l1", "r1"]);
}

#[test]
fn merge_without_previous_sibling_is_a_noop() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "a");
    let outcome = apply_op(
        &mut graph,
        &GraphOp::Merge {
            path: UnrankedPath::new(["a"]),
        },
        &clock(),
    )
    .unwrap();
    assert!(outcome.is_noop());
    assert_eq!(values_at(&graph, &[]), ["a"]);
}

#[test]
fn split_offset_past_the_end_is_rejected() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "ab");
    let err = apply_op(
        &mut graph,
        &GraphOp::Split {
            path: UnrankedPath::new(["ab"]),
            offset: 10,
        },
        &clock(),
    )
    .unwrap_err();
    assert!(matches!(err, ApplyError::InvalidOffset(_)));
}

#[test]
fn import_export_round_trip_preserves_the_outline() {
    let mut graph = ThoughtGraph::new();
    insert(&mut graph, &[], "projects");
    insert(&mut graph, &["projects"], "outliner");
    insert(&mut graph, &["projects", "outliner"], "store");
    insert(&mut graph, &[], "groceries");
    insert(&mut graph, &["groceries"], "apples");

    let exported = export_text(&graph);
    let mut reimported = ThoughtGraph::new();
    import_text(&mut reimported, &exported, &clock()).unwrap();

    // Equal up to rank renumbering: same values, nesting, relative order.
    assert_eq!(export_text(&reimported), exported);
    assert_eq!(
        values_at(&reimported, &["projects", "outliner"]),
        ["store"]
    );
}
