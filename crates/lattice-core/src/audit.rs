//! Layer 7: index reconciliation.
//!
//! The two indices are written separately, so an interrupted or out-of-order
//! update can leave them diverged. This pass walks one path's ancestry (not
//! the whole graph) and repairs what it finds: it heals rather than rejects,
//! and every repair is reported so the caller can re-render.
//!
//! Repairs are destructive but idempotent: running the pass twice over the
//! same ancestry yields a clean second report.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::identity::{LocationKey, lexeme_key, location_key, normalize};
use super::lexeme::{ContextRef, Lexeme};
use super::location::Child;
use super::path::UnrankedPath;
use super::rank::Rank;
use super::state::ThoughtGraph;
use super::timestamp::{Clock, Timestamp};

/// One applied repair (or, for collisions, one detected-but-untouched
/// condition).
#[derive(Clone, Debug, PartialEq)]
pub enum Repair {
    /// Two children shared the same `(value, rank)`; the later one went.
    DuplicateChildRemoved {
        context: LocationKey,
        value: String,
        rank: Rank,
    },
    /// A child had no Lexeme; one was re-created from the Location entry.
    LexemeRecreated { value: String },
    /// A Lexeme was missing the occurrence its Location structurally holds.
    ContextRefRestored { value: String, context: LocationKey },
    /// A ContextRef pointed at a context with no matching child; the child
    /// was re-created at the ref's rank.
    ChildRestored { value: String, context: LocationKey },
    /// The two indices disagreed on a rank; the Location is authoritative.
    RankRealigned {
        value: String,
        context: LocationKey,
        from: Rank,
        to: Rank,
    },
    /// A stored Lexeme's value does not hash to its own key slot. There is
    /// no defined resolution for a genuine collision; flagged, never merged.
    SuspectedCollision { value: String },
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepairReport {
    repairs: Vec<Repair>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.repairs.is_empty()
    }

    pub fn repairs(&self) -> &[Repair] {
        &self.repairs
    }

    fn record(&mut self, repair: Repair) {
        warn!(?repair, "index drift repaired");
        self.repairs.push(repair);
    }
}

/// Reconcile the indices along one path's ancestry.
pub fn audit_ancestry(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    clock: &impl Clock,
) -> RepairReport {
    let now = clock.now();
    let mut report = RepairReport::default();

    // Every context on the path, root first, with its known values.
    let mut ancestry: BTreeMap<LocationKey, Vec<String>> = BTreeMap::new();
    for depth in 0..=path.values().len() {
        let context = path.values()[..depth].to_vec();
        ancestry.insert(location_key(&context), context);
    }

    for key in ancestry.keys() {
        dedupe_children(graph, *key, &mut report, now);
        heal_lexemes(graph, *key, &mut report, now);
    }
    restore_children(graph, path, &ancestry, &mut report, now);
    report
}

/// (a) De-duplicate Location children sharing identical `(value, rank)`.
fn dedupe_children(
    graph: &mut ThoughtGraph,
    key: LocationKey,
    report: &mut RepairReport,
    now: Timestamp,
) {
    let Some(location) = graph.location(key) else {
        return;
    };
    let mut seen: BTreeSet<(String, Rank)> = BTreeSet::new();
    let mut duplicates: Vec<(String, Rank)> = Vec::new();
    for child in location.children() {
        let identity = (normalize(&child.value).as_str().to_string(), child.rank);
        if !seen.insert(identity.clone()) {
            duplicates.push((child.value.clone(), child.rank));
        }
    }
    for (value, rank) in duplicates {
        if let Some(location) = graph.location_mut(key) {
            location.remove_child(&value, Some(rank), now);
        }
        report.record(Repair::DuplicateChildRemoved {
            context: key,
            value,
            rank,
        });
    }
}

/// (b) + (c) + (e): make the Lexeme side agree with the Location's children,
/// and flag key slots whose stored value no longer hashes to them.
fn heal_lexemes(
    graph: &mut ThoughtGraph,
    key: LocationKey,
    report: &mut RepairReport,
    now: Timestamp,
) {
    let children: Vec<Child> = graph
        .location(key)
        .map_or_else(Vec::new, |l| l.children().to_vec());

    for child in children {
        let lkey = lexeme_key(&child.value);
        match graph.lexeme(lkey) {
            None => {
                let mut lexeme = Lexeme::new(child.value.clone(), now);
                lexeme.add_context(ContextRef::new(key, child.rank), now);
                graph.put_lexeme(lkey, lexeme);
                report.record(Repair::LexemeRecreated {
                    value: child.value.clone(),
                });
            }
            Some(lexeme) => {
                if lexeme_key(lexeme.value()) != lkey {
                    report.record(Repair::SuspectedCollision {
                        value: lexeme.value().to_string(),
                    });
                    continue;
                }
                match lexeme.context_ref(key).copied() {
                    None => {
                        if let Some(lexeme) = graph.lexeme_mut(lkey) {
                            lexeme.add_context(ContextRef::new(key, child.rank), now);
                        }
                        report.record(Repair::ContextRefRestored {
                            value: child.value.clone(),
                            context: key,
                        });
                    }
                    Some(existing) if existing.rank != child.rank => {
                        // Only realign when no sibling child carries the
                        // ref's rank (two occurrences of one value in the
                        // same context are legal at distinct ranks).
                        let covered = graph
                            .location(key)
                            .is_some_and(|l| l.child_at(&child.value, existing.rank).is_some());
                        if !covered {
                            if let Some(lexeme) = graph.lexeme_mut(lkey) {
                                lexeme.retarget_context(
                                    existing,
                                    ContextRef::new(key, child.rank),
                                    now,
                                );
                            }
                            report.record(Repair::RankRealigned {
                                value: child.value.clone(),
                                context: key,
                                from: existing.rank,
                                to: child.rank,
                            });
                        }
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

/// (d) Re-create Location children for ContextRefs with no matching child.
/// Bounded to contexts on the audited path, whose values are known.
fn restore_children(
    graph: &mut ThoughtGraph,
    path: &UnrankedPath,
    ancestry: &BTreeMap<LocationKey, Vec<String>>,
    report: &mut RepairReport,
    now: Timestamp,
) {
    for value in path.values() {
        let refs: Vec<ContextRef> = graph
            .lexeme_for(value)
            .map_or_else(Vec::new, |l| l.contexts().to_vec());
        for context_ref in refs {
            let Some(context) = ancestry.get(&context_ref.context) else {
                continue;
            };
            let present = graph
                .location(context_ref.context)
                .is_some_and(|l| l.child_at(value, context_ref.rank).is_some());
            if present {
                continue;
            }
            let location = graph.location_entry(context, now);
            location.insert_child(Child::new(value.clone(), context_ref.rank, now), now);
            report.record(Repair::ChildRestored {
                value: value.clone(),
                context: context_ref.context,
            });
        }
    }
}
