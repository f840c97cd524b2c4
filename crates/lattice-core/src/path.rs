//! Layer 5: typed path shapes and resolution.
//!
//! Three explicit shapes instead of one polymorphic list:
//! - `UnrankedPath`: bare values as typed by the user or stored in a URL.
//! - `Path`: a ranked walk from the root to one occurrence of a thought.
//! - `ContextChain`: `SimplePath` segments stitched across context-view
//!   boundaries.
//!
//! Resolution never fails: a value with no Lexeme, or no occurrence in the
//! prefix context, degrades to rank 0 for that step and the auditor repairs
//! the structure on its next pass. Ties between candidate occurrences go to
//! the first in list order — a documented heuristic, not a guarantee.

use serde::{Deserialize, Serialize};

use super::identity::{location_key, same_value};
use super::rank::Rank;
use super::state::ThoughtGraph;

/// Bare values from root to target; no ranks, no disambiguation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnrankedPath {
    values: Vec<String>,
}

impl UnrankedPath {
    pub fn new<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_root(&self) -> bool {
        self.values.is_empty()
    }

    /// Target value and its ancestor context.
    pub fn split_target(&self) -> Option<(&str, &[String])> {
        self.values
            .split_last()
            .map(|(last, rest)| (last.as_str(), rest))
    }
}

/// One ranked step of a Path. A derived, disposable view — never identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub value: String,
    pub rank: Rank,
}

/// A concrete, ranked walk from the root to one occurrence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    pub fn values(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.value.clone()).collect()
    }

    pub fn to_unranked(&self) -> UnrankedPath {
        UnrankedPath::new(self.steps.iter().map(|s| s.value.clone()))
    }
}

/// A Path segment that does not cross a context-view boundary. The walk it
/// denotes is `context` followed by `steps`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplePath {
    pub context: Vec<String>,
    pub steps: Vec<PathStep>,
}

/// Path segments stitched across context-view boundaries; length 1 for a
/// normal Path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextChain {
    segments: Vec<SimplePath>,
}

impl ContextChain {
    pub fn segments(&self) -> &[SimplePath] {
        &self.segments
    }

    pub fn last_segment(&self) -> &SimplePath {
        self.segments.last().expect("a chain has at least one segment")
    }

    pub fn crosses_views(&self) -> bool {
        self.segments.len() > 1
    }
}

/// Resolve bare values into a ranked Path.
///
/// Walks left to right; each step takes the rank of the first occurrence of
/// the value in the context built from the resolved prefix (first match
/// wins), or rank 0 when none matches. When the prefix context has an active
/// context view, the following value selects among the contexts in which the
/// prefix value occurs, and resolution continues inside the selected one.
pub fn resolve_path<S: AsRef<str>>(graph: &ThoughtGraph, values: &[S]) -> Path {
    let mut steps = Vec::with_capacity(values.len());
    let mut prefix: Vec<String> = Vec::new();
    let mut index = 0;

    while index < values.len() {
        let value = values[index].as_ref();
        let parent_key = location_key(&prefix);
        let rank = graph
            .lexeme_for(value)
            .and_then(|l| l.context_ref(parent_key))
            .map_or(Rank::ZERO, |r| r.rank);
        steps.push(PathStep {
            value: value.to_string(),
            rank,
        });
        prefix.push(value.to_string());
        index += 1;

        // Inside a context view the next value names a sibling context, not
        // a child.
        if index < values.len() && graph.views().is_active(location_key(&prefix)) {
            let selector = values[index].as_ref();
            if let Some(chosen) = select_context(graph, value, selector) {
                let rank = chosen.1;
                steps.push(PathStep {
                    value: selector.to_string(),
                    rank,
                });
                prefix = chosen.0;
                prefix.push(value.to_string());
                index += 1;
            }
            // No matching context: fall through and resolve the selector as
            // an ordinary (probably dangling) child.
        }
    }

    Path::new(steps)
}

/// First context of `value` whose nearest ancestor matches `selector`
/// (first match wins). Returns the context's values and the occurrence rank.
fn select_context(
    graph: &ThoughtGraph,
    value: &str,
    selector: &str,
) -> Option<(Vec<String>, Rank)> {
    let lexeme = graph.lexeme_for(value)?;
    lexeme.contexts().iter().find_map(|r| {
        let location = graph.location(r.context)?;
        let last = location.context().last()?;
        if same_value(last, selector) {
            Some((location.context().to_vec(), r.rank))
        } else {
            None
        }
    })
}

/// Decompose a ranked Path at every context-view boundary.
///
/// The selector step after each boundary is folded into the next segment's
/// owning context, so `chain_to_path(split_chain(p))` re-derives `p`'s
/// target occurrence.
pub fn split_chain(graph: &ThoughtGraph, path: &Path) -> ContextChain {
    let mut segments = Vec::new();
    let mut current = SimplePath::default();
    let mut prefix: Vec<String> = Vec::new();
    let steps = path.steps();
    let mut index = 0;

    while index < steps.len() {
        let step = &steps[index];
        current.steps.push(step.clone());
        prefix.push(step.value.clone());
        index += 1;

        if index < steps.len() && graph.views().is_active(location_key(&prefix)) {
            let selector = &steps[index];
            if let Some((context, _)) = select_context(graph, &step.value, &selector.value) {
                segments.push(std::mem::take(&mut current));
                let mut owning = context;
                owning.push(step.value.clone());
                prefix = owning.clone();
                current.context = owning;
                index += 1;
            }
        }
    }

    segments.push(current);
    ContextChain { segments }
}

/// Stitch a chain back into one renderable Path: the resolved ancestry of
/// the final segment's owning context, then the segment's own steps.
pub fn chain_to_path(graph: &ThoughtGraph, chain: &ContextChain) -> Path {
    let segment = chain.last_segment();
    let mut steps = Vec::with_capacity(segment.context.len() + segment.steps.len());
    let mut prefix: Vec<String> = Vec::new();
    for value in &segment.context {
        let parent_key = location_key(&prefix);
        let rank = graph
            .lexeme_for(value)
            .and_then(|l| l.context_ref(parent_key))
            .map_or(Rank::ZERO, |r| r.rank);
        steps.push(PathStep {
            value: value.clone(),
            rank,
        });
        prefix.push(value.clone());
    }
    steps.extend(segment.steps.iter().cloned());
    Path::new(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{GraphOp, apply_op};
    use crate::timestamp::{FixedClock, Timestamp};

    fn clock() -> FixedClock {
        FixedClock(Timestamp::from_millis(1))
    }

    fn insert(graph: &mut ThoughtGraph, context: &[&str], value: &str) {
        let op = GraphOp::Insert {
            context: context.iter().map(|s| s.to_string()).collect(),
            value: value.to_string(),
            rank: None,
        };
        apply_op(graph, &op, &clock()).unwrap();
    }

    /// a -> b -> c, plus a second occurrence of b under x.
    fn fixture() -> ThoughtGraph {
        let mut graph = ThoughtGraph::new();
        insert(&mut graph, &[], "a");
        insert(&mut graph, &["a"], "b");
        insert(&mut graph, &["a", "b"], "c");
        insert(&mut graph, &[], "x");
        insert(&mut graph, &["x"], "b");
        insert(&mut graph, &["x", "b"], "d");
        graph
    }

    #[test]
    fn resolves_ranks_along_the_prefix_context() {
        let graph = fixture();
        let path = resolve_path(&graph, &["a", "b", "c"]);
        let ranks: Vec<f64> = path.steps().iter().map(|s| s.rank.get()).collect();
        assert_eq!(ranks, [0.0, 0.0, 0.0]);

        let path = resolve_path(&graph, &["x", "b"]);
        assert_eq!(path.last().unwrap().value, "b");
        // Dropping the ranks gives back the input values.
        assert_eq!(path.to_unranked(), UnrankedPath::new(["x", "b"]));
    }

    #[test]
    fn missing_values_degrade_to_rank_zero() {
        let graph = fixture();
        let path = resolve_path(&graph, &["a", "nope", "deeper"]);
        assert_eq!(path.steps().len(), 3);
        assert_eq!(path.steps()[1].rank, Rank::ZERO);
        assert_eq!(path.steps()[2].rank, Rank::ZERO);
    }

    #[test]
    fn context_view_selects_a_sibling_context() {
        let mut graph = fixture();
        graph.views_mut().toggle(location_key(&["a", "b"]));

        // Inside the view on a/b, "x" picks the occurrence of b under x;
        // "d" then resolves as a child of x/b.
        let path = resolve_path(&graph, &["a", "b", "x", "d"]);
        let values = path.values();
        assert_eq!(values, ["a", "b", "x", "d"]);
        assert_eq!(path.steps()[3].rank, Rank::ZERO);

        let chain = split_chain(&graph, &path);
        assert!(chain.crosses_views());
        assert_eq!(chain.segments().len(), 2);
        assert_eq!(chain.segments()[0].steps.len(), 2);
        assert_eq!(chain.last_segment().context, ["x", "b"]);
        assert_eq!(chain.last_segment().steps[0].value, "d");

        let stitched = chain_to_path(&graph, &chain);
        assert_eq!(stitched.values(), ["x", "b", "d"]);
    }

    #[test]
    fn chain_of_a_plain_path_has_one_segment() {
        let graph = fixture();
        let path = resolve_path(&graph, &["a", "b", "c"]);
        let chain = split_chain(&graph, &path);
        assert!(!chain.crosses_views());
        assert_eq!(chain_to_path(&graph, &chain), path);
    }
}
