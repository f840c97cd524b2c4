//! Layer 3: the Location index entry.
//!
//! One Location per context (ordered list of ancestor values); it owns the
//! ordered list of children at that position in the outline.
//!
//! INVARIANT (L2): no two children share the same `(value, rank)` pair.
//! INVARIANT (L3): children are kept sorted ascending by rank; display order
//! may differ when the context carries `=sort Alphabetical`, but rank stays
//! the identity and insertion key.

use serde::{Deserialize, Serialize};

use super::identity::same_value;
use super::rank::Rank;
use super::timestamp::Timestamp;

/// Display-order policy for one Location (derived from its `=sort` meta
/// child, see `ThoughtGraph::sort_preference`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortPreference {
    #[default]
    Rank,
    Alphabetical,
}

/// One child of a Location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub value: String,
    pub rank: Rank,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub last_updated: Timestamp,
}

impl Child {
    pub fn new(value: impl Into<String>, rank: Rank, now: Timestamp) -> Self {
        Self {
            value: value.into(),
            rank,
            id: None,
            last_updated: now,
        }
    }
}

/// The children list for one specific context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    context: Vec<String>,
    children: Vec<Child>,
    last_updated: Timestamp,
    /// True when children have not been lazily loaded yet (deep contexts
    /// rehydrate on demand); such a Location is not garbage-collected.
    #[serde(default)]
    pending: bool,
}

impl Location {
    pub fn new(context: Vec<String>, now: Timestamp) -> Self {
        Self {
            context,
            children: Vec::new(),
            last_updated: now,
            pending: false,
        }
    }

    /// Placeholder for a context whose children load on demand.
    pub fn pending(context: Vec<String>, now: Timestamp) -> Self {
        Self {
            context,
            children: Vec::new(),
            last_updated: now,
            pending: true,
        }
    }

    /// Ancestor values from the root; redundant with the index key, kept for
    /// repair and debugging.
    pub fn context(&self) -> &[String] {
        &self.context
    }

    pub fn set_context(&mut self, context: Vec<String>) {
        self.context = context;
    }

    /// Children sorted ascending by rank.
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn mark_loaded(&mut self) {
        self.pending = false;
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn ranks(&self) -> Vec<Rank> {
        self.children.iter().map(|c| c.rank).collect()
    }

    /// First child with the same normalized value, in rank order.
    pub fn child(&self, value: &str) -> Option<&Child> {
        self.children.iter().find(|c| same_value(&c.value, value))
    }

    pub fn child_at(&self, value: &str, rank: Rank) -> Option<&Child> {
        self.children
            .iter()
            .find(|c| c.rank == rank && same_value(&c.value, value))
    }

    pub fn has_child(&self, value: &str) -> bool {
        self.child(value).is_some()
    }

    /// Insert keeping rank order. A child with the same `(value, rank)` is
    /// replaced in place (L2); equal ranks with different values keep
    /// insertion order.
    pub fn insert_child(&mut self, child: Child, now: Timestamp) {
        if let Some(slot) = self
            .children
            .iter_mut()
            .find(|c| c.rank == child.rank && same_value(&c.value, &child.value))
        {
            *slot = child;
        } else {
            let index = self.children.partition_point(|c| c.rank <= child.rank);
            self.children.insert(index, child);
        }
        self.last_updated = now;
    }

    /// Remove the child matching `(value, rank)`; with `rank: None`, the
    /// first child with that value goes. Returns the removed entry.
    pub fn remove_child(
        &mut self,
        value: &str,
        rank: Option<Rank>,
        now: Timestamp,
    ) -> Option<Child> {
        let position = self
            .children
            .iter()
            .position(|c| same_value(&c.value, value) && rank.is_none_or(|rank| c.rank == rank))?;
        self.last_updated = now;
        Some(self.children.remove(position))
    }

    pub fn child_mut(&mut self, value: &str, rank: Rank) -> Option<&mut Child> {
        self.children
            .iter_mut()
            .find(|c| c.rank == rank && same_value(&c.value, value))
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.last_updated = now;
    }
}
