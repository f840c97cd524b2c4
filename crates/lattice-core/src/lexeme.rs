//! Layer 3: the Lexeme index entry.
//!
//! One Lexeme per normalized value; its `contexts` list every occurrence.
//!
//! INVARIANT (L1): every `ContextRef` here has a matching `(value, rank)`
//! child in the Location it names. The mutation engine maintains this; the
//! entry itself is a plain record.

use serde::{Deserialize, Serialize};

use super::identity::LocationKey;
use super::rank::Rank;
use super::timestamp::Timestamp;

/// One occurrence of a value: the context that holds it and its rank there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    pub context: LocationKey,
    pub rank: Rank,
}

impl ContextRef {
    pub fn new(context: LocationKey, rank: Rank) -> Self {
        Self { context, rank }
    }
}

/// A value's identity entry: canonical display form plus every occurrence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexeme {
    value: String,
    contexts: Vec<ContextRef>,
    created: Timestamp,
    last_updated: Timestamp,
}

impl Lexeme {
    pub fn new(value: impl Into<String>, now: Timestamp) -> Self {
        Self {
            value: value.into(),
            contexts: Vec::new(),
            created: now,
            last_updated: now,
        }
    }

    /// Most recently written display form.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Renames keep identity only when the normal form is unchanged; the
    /// caller is responsible for that check.
    pub fn set_value(&mut self, value: impl Into<String>, now: Timestamp) {
        self.value = value.into();
        self.last_updated = now;
    }

    pub fn contexts(&self) -> &[ContextRef] {
        &self.contexts
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    /// First occurrence in the given context, in list order.
    pub fn context_ref(&self, context: LocationKey) -> Option<&ContextRef> {
        self.contexts.iter().find(|r| r.context == context)
    }

    pub fn has_context(&self, context: LocationKey) -> bool {
        self.context_ref(context).is_some()
    }

    /// Record an occurrence; duplicate `(context, rank)` pairs collapse.
    pub fn add_context(&mut self, context: ContextRef, now: Timestamp) {
        if !self.contexts.contains(&context) {
            self.contexts.push(context);
        }
        self.last_updated = now;
    }

    /// Remove the occurrence matching `(context, rank)`; with `rank: None`,
    /// the first occurrence in that context goes.
    pub fn remove_context(&mut self, context: LocationKey, rank: Option<Rank>, now: Timestamp) {
        let position = self
            .contexts
            .iter()
            .position(|r| r.context == context && rank.is_none_or(|rank| r.rank == rank));
        if let Some(position) = position {
            self.contexts.remove(position);
            self.last_updated = now;
        }
    }

    /// Point an occurrence at a new context and/or rank. When `to` is
    /// already recorded the two occurrences collapse into one, mirroring the
    /// in-place replacement on the Location side.
    pub fn retarget_context(&mut self, from: ContextRef, to: ContextRef, now: Timestamp) {
        if let Some(position) = self.contexts.iter().position(|r| *r == from) {
            if to != from && self.contexts.contains(&to) {
                self.contexts.remove(position);
            } else {
                self.contexts[position] = to;
            }
            self.last_updated = now;
        }
    }

    /// A Lexeme with no occurrences is destroyed by the store.
    pub fn is_orphan(&self) -> bool {
        self.contexts.is_empty()
    }
}
