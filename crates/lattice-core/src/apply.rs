//! Layer 6: the mutation engine.
//!
//! Every structural change goes through `apply_op`: a pure function from
//! (graph, op) to the mutated graph plus an `OpOutcome` of index deltas for
//! the persistence and undo boundaries. Operations are total for well-formed
//! input — a failed precondition (no such occurrence, no previous sibling)
//! is a no-op outcome, never a panic.
//!
//! Occurrence lookup uses the resolver's policy: first match in list order
//! wins, and a missing occurrence degrades instead of failing.

use std::collections::BTreeSet;

use thiserror::Error;

use super::error::InvalidOffset;
use super::identity::{
    LexemeKey, LocationKey, lexeme_key, location_key, normalize, same_value,
};
use super::lexeme::ContextRef;
use super::location::Child;
use super::path::UnrankedPath;
use super::rank::{Rank, rank_after, rank_append, rank_before};
use super::state::ThoughtGraph;
use super::timestamp::{Clock, Timestamp};

/// Meta child that soft-deletes its subtree.
pub const ARCHIVE: &str = "=archive";

/// Values with this prefix are dividers; archiving one deletes it outright.
const DIVIDER_PREFIX: &str = "=divider";

/// One user-facing mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphOp {
    /// Create an occurrence of `value` under `context`; rank allocated by
    /// appending when unspecified.
    Insert {
        context: Vec<String>,
        value: String,
        rank: Option<Rank>,
    },
    /// Change the target's text; its rank is preserved.
    Rename { path: UnrankedPath, value: String },
    /// Re-home the target under `to_context` (same context = reorder); an
    /// unspecified rank appends.
    Move {
        path: UnrankedPath,
        to_context: Vec<String>,
        rank: Option<Rank>,
    },
    /// Remove the occurrence and every descendant reachable only through it.
    Delete { path: UnrankedPath },
    /// Soft-delete under an `=archive` meta child; archiving an archived or
    /// childless thought deletes it permanently.
    Archive { path: UnrankedPath },
    /// Split the target's text at `offset`; children stay with the left half.
    Split { path: UnrankedPath, offset: usize },
    /// Merge the target into its previous sibling (delete at offset zero).
    Merge { path: UnrankedPath },
    /// Nest the named siblings one level deeper under a fresh empty thought.
    Subcategorize {
        context: Vec<String>,
        values: Vec<String>,
    },
}

/// Index delta produced by one mutation: the keys whose entries changed or
/// were destroyed. Persistence flushes exactly these; undo inverts them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpOutcome {
    pub changed_lexemes: BTreeSet<LexemeKey>,
    pub removed_lexemes: BTreeSet<LexemeKey>,
    pub changed_locations: BTreeSet<LocationKey>,
    pub removed_locations: BTreeSet<LocationKey>,
}

impl OpOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed_lexemes.is_empty()
            && self.removed_lexemes.is_empty()
            && self.changed_locations.is_empty()
            && self.removed_locations.is_empty()
    }

    fn touch_lexeme(&mut self, key: LexemeKey) {
        self.removed_lexemes.remove(&key);
        self.changed_lexemes.insert(key);
    }

    fn drop_lexeme(&mut self, key: LexemeKey) {
        self.changed_lexemes.remove(&key);
        self.removed_lexemes.insert(key);
    }

    fn touch_location(&mut self, key: LocationKey) {
        self.removed_locations.remove(&key);
        self.changed_locations.insert(key);
    }

    fn drop_location(&mut self, key: LocationKey) {
        self.changed_locations.remove(&key);
        self.removed_locations.insert(key);
    }
}

/// Malformed input (not a failed precondition).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApplyError {
    #[error("path has no target value")]
    EmptyPath,
    #[error(transparent)]
    InvalidOffset(#[from] InvalidOffset),
}

/// Apply one mutation, returning the index delta.
pub fn apply_op(
    graph: &mut ThoughtGraph,
    op: &GraphOp,
    clock: &impl Clock,
) -> Result<OpOutcome, ApplyError> {
    let now = clock.now();
    let mut outcome = OpOutcome::default();
    match op {
        GraphOp::Insert {
            context,
            value,
            rank,
        } => {
            insert_child(graph, context, value, *rank, now, &mut outcome);
        }
        GraphOp::Rename { path, value } => {
            apply_rename(graph, path, value, now, &mut outcome)?;
        }
        GraphOp::Move {
            path,
            to_context,
            rank,
        } => {
            apply_move(graph, path, to_context, *rank, now, &mut outcome)?;
        }
        GraphOp::Delete { path } => {
            apply_delete(graph, path, now, &mut outcome)?;
        }
        GraphOp::Archive { path } => {
            apply_archive(graph, path, now, &mut outcome)?;
        }
        GraphOp::Split { path, offset } => {
            apply_split(graph, path, *offset, now, &mut outcome)?;
        }
        GraphOp::Merge { path } => {
            apply_merge(graph, path, now, &mut outcome)?;
        }
        GraphOp::Subcategorize { context, values } => {
            apply_subcategorize(graph, context, values, now, &mut outcome);
        }
    }
    Ok(outcome)
}

// ---- shared plumbing ----

fn child_context(context: &[String], value: &str) -> Vec<String> {
    let mut ctx = context.to_vec();
    ctx.push(value.to_string());
    ctx
}

/// Whether `context` lies at or under the context named by `base`, by
/// normalized value.
fn within_subtree(base: &[String], context: &[String]) -> bool {
    context.len() >= base.len()
        && base.iter().zip(context).all(|(b, c)| same_value(b, c))
}

/// Rank of the target occurrence: the Location child first, the Lexeme's
/// ContextRef as a fallback when the indices have drifted.
fn find_occurrence(graph: &ThoughtGraph, context: &[String], value: &str) -> Option<Rank> {
    let key = location_key(context);
    graph
        .location(key)
        .and_then(|l| l.child(value))
        .map(|c| c.rank)
        .or_else(|| {
            graph
                .lexeme_for(value)
                .and_then(|l| l.context_ref(key))
                .map(|r| r.rank)
        })
}

/// Create one occurrence. Without an explicit rank, an existing sibling with
/// the same identity absorbs the insert (duplicate insertion is never an
/// error); otherwise the child appends.
fn insert_child(
    graph: &mut ThoughtGraph,
    context: &[String],
    value: &str,
    rank: Option<Rank>,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Rank {
    let key = location_key(context);

    if rank.is_none()
        && let Some(existing) = graph.location(key).and_then(|l| l.child(value)).cloned()
    {
        if let Some(location) = graph.location_mut(key) {
            if let Some(child) = location.child_mut(value, existing.rank) {
                child.value = value.to_string();
                child.last_updated = now;
            }
            location.touch(now);
        }
        let lexeme = graph.lexeme_entry(value, now);
        lexeme.set_value(value, now);
        lexeme.add_context(ContextRef::new(key, existing.rank), now);
        outcome.touch_lexeme(lexeme_key(value));
        outcome.touch_location(key);
        return existing.rank;
    }

    let rank = rank.unwrap_or_else(|| {
        graph
            .location(key)
            .map_or(Rank::ZERO, |l| rank_append(&l.ranks()))
    });
    let location = graph.location_entry(context, now);
    location.insert_child(Child::new(value, rank, now), now);
    location.mark_loaded();
    graph
        .lexeme_entry(value, now)
        .add_context(ContextRef::new(key, rank), now);
    outcome.touch_lexeme(lexeme_key(value));
    outcome.touch_location(key);
    rank
}

/// Remove one occurrence from both indices, garbage-collecting the Lexeme
/// and Location when they empty. Tolerates a missing Location (drift).
fn remove_occurrence(
    graph: &mut ThoughtGraph,
    context: &[String],
    value: &str,
    rank: Option<Rank>,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Option<Child> {
    let key = location_key(context);
    let removed = graph
        .location_mut(key)
        .and_then(|l| l.remove_child(value, rank, now));
    let removed_rank = removed.as_ref().map(|c| c.rank).or(rank);

    let lkey = lexeme_key(value);
    if let Some(lexeme) = graph.lexeme_mut(lkey) {
        lexeme.remove_context(key, removed_rank, now);
        if graph.drop_lexeme_if_orphan(lkey) {
            outcome.drop_lexeme(lkey);
        } else {
            outcome.touch_lexeme(lkey);
        }
    }

    if removed.is_some() {
        if graph.drop_location_if_empty(key) {
            outcome.drop_location(key);
        } else {
            outcome.touch_location(key);
        }
    }
    removed
}

/// Re-key every descendant Location from `old_base` to `new_base`, updating
/// the matching ContextRefs. When the destination already holds a child with
/// the same identity the moved occurrence dissolves into it and only its
/// subtree is carried over (the duplicate-merge rule).
fn reparent_descendants(
    graph: &mut ThoughtGraph,
    old_base: &[String],
    new_base: &[String],
    now: Timestamp,
    outcome: &mut OpOutcome,
) {
    let old_key = location_key(old_base);
    let Some(old_location) = graph.take_location(old_key) else {
        return;
    };
    outcome.drop_location(old_key);
    let new_key = location_key(new_base);

    for child in old_location.children().to_vec() {
        let child_old = child_context(old_base, &child.value);
        let child_new = child_context(new_base, &child.value);
        reparent_descendants(graph, &child_old, &child_new, now, outcome);

        let lkey = lexeme_key(&child.value);
        let duplicate = graph
            .location(new_key)
            .is_some_and(|l| l.has_child(&child.value));
        if duplicate {
            if let Some(lexeme) = graph.lexeme_mut(lkey) {
                lexeme.remove_context(old_key, Some(child.rank), now);
            }
            if graph.drop_lexeme_if_orphan(lkey) {
                outcome.drop_lexeme(lkey);
            } else {
                outcome.touch_lexeme(lkey);
            }
        } else {
            let rank = child.rank;
            let destination = graph.location_entry(new_base, now);
            destination.insert_child(child, now);
            if let Some(lexeme) = graph.lexeme_mut(lkey) {
                lexeme.retarget_context(
                    ContextRef::new(old_key, rank),
                    ContextRef::new(new_key, rank),
                    now,
                );
            }
            outcome.touch_lexeme(lkey);
        }
        outcome.touch_location(new_key);
    }
}

/// Move one occurrence between contexts, carrying its subtree.
fn move_occurrence(
    graph: &mut ThoughtGraph,
    from_context: &[String],
    value: &str,
    from_rank: Rank,
    to_context: &[String],
    rank: Option<Rank>,
    now: Timestamp,
    outcome: &mut OpOutcome,
) {
    // A destination inside the moved subtree would re-home the thought into
    // itself; refuse the precondition instead.
    if within_subtree(&child_context(from_context, value), to_context) {
        return;
    }

    let from_key = location_key(from_context);
    let to_key = location_key(to_context);

    if from_key == to_key {
        // Reorder within the same Location; descendants keep their keys. An
        // unspecified rank appends after the last sibling.
        let rank = rank.unwrap_or_else(|| {
            graph
                .location(from_key)
                .map_or(Rank::ZERO, |l| rank_append(&l.ranks()))
        });
        if let Some(location) = graph.location_mut(from_key)
            && let Some(mut child) = location.remove_child(value, Some(from_rank), now)
        {
            child.rank = rank;
            child.last_updated = now;
            location.insert_child(child, now);
        }
        if let Some(lexeme) = graph.lexeme_mut(lexeme_key(value)) {
            lexeme.retarget_context(
                ContextRef::new(from_key, from_rank),
                ContextRef::new(from_key, rank),
                now,
            );
        }
        outcome.touch_lexeme(lexeme_key(value));
        outcome.touch_location(from_key);
        return;
    }

    let moved = graph
        .location(from_key)
        .and_then(|l| l.child_at(value, from_rank))
        .cloned()
        .unwrap_or_else(|| Child::new(value, from_rank, now));
    let old_child_ctx = child_context(from_context, value);
    let new_child_ctx = child_context(to_context, value);

    let duplicate = graph.location(to_key).is_some_and(|l| l.has_child(value));
    if duplicate {
        // Duplicate-merge: the moved occurrence dissolves into the existing
        // sibling; its subtree re-parents underneath.
        reparent_descendants(graph, &old_child_ctx, &new_child_ctx, now, outcome);
        remove_occurrence(graph, from_context, value, Some(from_rank), now, outcome);
        if let Some(location) = graph.location_mut(to_key) {
            location.touch(now);
        }
        outcome.touch_location(to_key);
    } else {
        // Insert the new occurrence before removing the old one so the
        // Lexeme never empties mid-move.
        insert_child(graph, to_context, &moved.value, rank, now, outcome);
        remove_occurrence(graph, from_context, &moved.value, Some(from_rank), now, outcome);
        reparent_descendants(graph, &old_child_ctx, &new_child_ctx, now, outcome);
    }
}

/// Remove an occurrence and its entire subtree; descendants whose only
/// occurrence was under it are destroyed with it.
fn delete_subtree(
    graph: &mut ThoughtGraph,
    context: &[String],
    value: &str,
    rank: Rank,
    now: Timestamp,
    outcome: &mut OpOutcome,
) {
    let own_ctx = child_context(context, value);
    let own_key = location_key(&own_ctx);
    if let Some(location) = graph.take_location(own_key) {
        outcome.drop_location(own_key);
        for child in location.children().to_vec() {
            delete_subtree(graph, &own_ctx, &child.value, child.rank, now, outcome);
        }
    }
    remove_occurrence(graph, context, value, Some(rank), now, outcome);
}

// ---- operations ----

fn target(path: &UnrankedPath) -> Result<(&str, &[String]), ApplyError> {
    path.split_target().ok_or(ApplyError::EmptyPath)
}

fn apply_rename(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    new_value: &str,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Result<(), ApplyError> {
    let (old_value, context) = target(path)?;
    let Some(rank) = find_occurrence(graph, context, old_value) else {
        return Ok(());
    };
    let key = location_key(context);

    if same_value(old_value, new_value) {
        // Same identity: refresh the display form only.
        if let Some(location) = graph.location_mut(key) {
            if let Some(child) = location.child_mut(old_value, rank) {
                child.value = new_value.to_string();
                child.last_updated = now;
            }
            location.touch(now);
        }
        if let Some(lexeme) = graph.lexeme_mut(lexeme_key(old_value)) {
            lexeme.set_value(new_value, now);
        }
        outcome.touch_lexeme(lexeme_key(old_value));
        outcome.touch_location(key);
        return Ok(());
    }

    let old_child_ctx = child_context(context, old_value);
    let new_child_ctx = child_context(context, new_value);
    let sibling_exists = graph.location(key).is_some_and(|l| l.has_child(new_value));

    if sibling_exists {
        // Renaming onto an existing sibling merges the two occurrences.
        reparent_descendants(graph, &old_child_ctx, &new_child_ctx, now, outcome);
        remove_occurrence(graph, context, old_value, Some(rank), now, outcome);
        return Ok(());
    }

    // Text changes, rank does not.
    if let Some(location) = graph.location_mut(key)
        && let Some(mut child) = location.remove_child(old_value, Some(rank), now)
    {
        child.value = new_value.to_string();
        child.last_updated = now;
        location.insert_child(child, now);
    }
    let old_lkey = lexeme_key(old_value);
    if let Some(lexeme) = graph.lexeme_mut(old_lkey) {
        lexeme.remove_context(key, Some(rank), now);
    }
    if graph.drop_lexeme_if_orphan(old_lkey) {
        outcome.drop_lexeme(old_lkey);
    } else {
        outcome.touch_lexeme(old_lkey);
    }
    graph
        .lexeme_entry(new_value, now)
        .add_context(ContextRef::new(key, rank), now);
    outcome.touch_lexeme(lexeme_key(new_value));
    outcome.touch_location(key);
    reparent_descendants(graph, &old_child_ctx, &new_child_ctx, now, outcome);
    Ok(())
}

fn apply_move(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    to_context: &[String],
    rank: Option<Rank>,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Result<(), ApplyError> {
    let (value, from_context) = target(path)?;
    let Some(from_rank) = find_occurrence(graph, from_context, value) else {
        return Ok(());
    };
    move_occurrence(
        graph,
        from_context,
        value,
        from_rank,
        to_context,
        rank,
        now,
        outcome,
    );
    Ok(())
}

fn apply_delete(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Result<(), ApplyError> {
    let (value, context) = target(path)?;
    let Some(rank) = find_occurrence(graph, context, value) else {
        return Ok(());
    };
    delete_subtree(graph, context, value, rank, now, outcome);
    Ok(())
}

fn apply_archive(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Result<(), ApplyError> {
    let (value, context) = target(path)?;
    let Some(rank) = find_occurrence(graph, context, value) else {
        return Ok(());
    };

    let own_ctx = child_context(context, value);
    let has_descendants = graph
        .location_for(&own_ctx)
        .is_some_and(|l| !l.is_empty());
    let under_archive = context.iter().any(|v| same_value(v, ARCHIVE));
    let divider = normalize(value).as_str().starts_with(DIVIDER_PREFIX);

    // Archive is one level, not a stack: archiving again deletes for good.
    if !has_descendants || under_archive || divider {
        delete_subtree(graph, context, value, rank, now, outcome);
        return Ok(());
    }

    let key = location_key(context);
    let archived_here = graph.location(key).is_some_and(|l| l.has_child(ARCHIVE));
    if !archived_here {
        let front = graph
            .location(key)
            .and_then(|l| l.children().first().map(|c| c.rank))
            .map(|first| {
                rank_before(
                    &graph.location(key).map_or(Vec::new(), |l| l.ranks()),
                    first,
                )
            })
            .unwrap_or(Rank::ZERO);
        insert_child(graph, context, ARCHIVE, Some(front), now, outcome);
    }

    let archive_ctx = child_context(context, ARCHIVE);
    move_occurrence(graph, context, value, rank, &archive_ctx, None, now, outcome);
    Ok(())
}

fn apply_split(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    offset: usize,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Result<(), ApplyError> {
    let (value, context) = target(path)?;
    let Some(rank) = find_occurrence(graph, context, value) else {
        return Ok(());
    };
    let key = location_key(context);
    let display = graph
        .location(key)
        .and_then(|l| l.child_at(value, rank))
        .map_or_else(|| value.to_string(), |c| c.value.clone());

    if offset > display.len() || !display.is_char_boundary(offset) {
        return Err(InvalidOffset {
            offset,
            len: display.len(),
        }
        .into());
    }
    let left = display[..offset].to_string();
    let right = display[offset..].to_string();

    let sibling_rank = graph
        .location(key)
        .map_or_else(|| rank_after(&[], rank), |l| rank_after(&l.ranks(), rank));

    // Children of the original stay with the left half.
    apply_rename(
        graph,
        &UnrankedPath::new(child_context(context, value)),
        &left,
        now,
        outcome,
    )?;
    insert_child(graph, context, &right, Some(sibling_rank), now, outcome);
    Ok(())
}

fn apply_merge(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    now: Timestamp,
    outcome: &mut OpOutcome,
) -> Result<(), ApplyError> {
    let (value, context) = target(path)?;
    let Some(rank) = find_occurrence(graph, context, value) else {
        return Ok(());
    };
    let key = location_key(context);
    let Some(location) = graph.location(key) else {
        return Ok(());
    };
    let children = location.children();
    let Some(index) = children
        .iter()
        .position(|c| c.rank == rank && same_value(&c.value, value))
    else {
        return Ok(());
    };
    if index == 0 {
        // No previous sibling to merge into.
        return Ok(());
    }
    let previous = children[index - 1].clone();
    let current = children[index].clone();
    let merged = format!("{}{}", previous.value, current.value);

    apply_rename(
        graph,
        &UnrankedPath::new(child_context(context, &previous.value)),
        &merged,
        now,
        outcome,
    )?;

    // Current thought's children follow, with fresh trailing ranks.
    let current_ctx = child_context(context, &current.value);
    let merged_ctx = child_context(context, &merged);
    let moved: Vec<Child> = graph
        .location_for(&current_ctx)
        .map_or_else(Vec::new, |l| l.children().to_vec());
    for child in moved {
        move_occurrence(
            graph,
            &current_ctx,
            &child.value,
            child.rank,
            &merged_ctx,
            None,
            now,
            outcome,
        );
    }
    delete_subtree(graph, context, &current.value, current.rank, now, outcome);
    Ok(())
}

fn apply_subcategorize(
    graph: &mut ThoughtGraph,
    context: &[String],
    values: &[String],
    now: Timestamp,
    outcome: &mut OpOutcome,
) {
    let key = location_key(context);
    let mut targets: Vec<Child> = Vec::new();
    if let Some(location) = graph.location(key) {
        for child in location.children() {
            if values.iter().any(|v| same_value(v, &child.value)) {
                targets.push(child.clone());
            }
        }
    }
    let Some(first) = targets.first() else {
        return;
    };

    let front = graph
        .location(key)
        .map_or(Rank::ZERO, |l| rank_before(&l.ranks(), first.rank));
    insert_child(graph, context, "", Some(front), now, outcome);

    let parent_ctx = child_context(context, "");
    for child in targets {
        move_occurrence(
            graph,
            context,
            &child.value,
            child.rank,
            &parent_ctx,
            None,
            now,
            outcome,
        );
    }
}
