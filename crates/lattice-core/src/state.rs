//! Layer 4: the dual-index graph.
//!
//! The single source of truth: value identities (Lexemes) and placements
//! (Locations) live in two hash-keyed maps. The maps are plain key-value
//! stores with no cross-validation; invariants L1-L3 are the mutation
//! engine's responsibility, and divergence between the maps is repaired by
//! the auditor rather than rejected here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::identity::{LexemeKey, LocationKey, is_meta, lexeme_key, location_key, normalize};
use super::lexeme::{ContextRef, Lexeme};
use super::location::{Child, Location, SortPreference};
use super::timestamp::Timestamp;

/// Per-context "context view" toggles: when active, a context renders the
/// places its value occurs instead of its children. Session state, persisted
/// alongside the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextViews {
    map: BTreeMap<LocationKey, bool>,
}

impl ContextViews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, context: LocationKey) -> bool {
        self.map.get(&context).copied().unwrap_or(false)
    }

    pub fn set(&mut self, context: LocationKey, active: bool) {
        if active {
            self.map.insert(context, true);
        } else {
            self.map.remove(&context);
        }
    }

    /// Flip and return the new state.
    pub fn toggle(&mut self, context: LocationKey) -> bool {
        let next = !self.is_active(context);
        self.set(context, next);
        next
    }

    pub fn iter(&self) -> impl Iterator<Item = LocationKey> + '_ {
        self.map
            .iter()
            .filter(|(_, active)| **active)
            .map(|(key, _)| *key)
    }
}

/// The thought graph: one value, many contexts, no duplication.
///
/// Persisted shape is exactly these three maps (keys as lowercase hex).
/// All mutation goes through the engine in `apply`; reads are unrestricted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThoughtGraph {
    lexemes: BTreeMap<LexemeKey, Lexeme>,
    locations: BTreeMap<LocationKey, Location>,
    #[serde(default)]
    views: ContextViews,
}

impl ThoughtGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Lexeme index ----

    pub fn lexeme(&self, key: LexemeKey) -> Option<&Lexeme> {
        self.lexemes.get(&key)
    }

    pub fn lexeme_for(&self, value: &str) -> Option<&Lexeme> {
        self.lexemes.get(&lexeme_key(value))
    }

    /// Every location the value currently occupies.
    pub fn contexts_of(&self, value: &str) -> &[ContextRef] {
        self.lexeme_for(value).map_or(&[], |l| l.contexts())
    }

    pub fn lexemes(&self) -> impl Iterator<Item = (&LexemeKey, &Lexeme)> {
        self.lexemes.iter()
    }

    pub(crate) fn lexeme_mut(&mut self, key: LexemeKey) -> Option<&mut Lexeme> {
        self.lexemes.get_mut(&key)
    }

    /// Lexeme for `value`, created on first insertion of its normal form.
    pub(crate) fn lexeme_entry(&mut self, value: &str, now: Timestamp) -> &mut Lexeme {
        self.lexemes
            .entry(lexeme_key(value))
            .or_insert_with(|| Lexeme::new(value, now))
    }

    pub(crate) fn put_lexeme(&mut self, key: LexemeKey, lexeme: Lexeme) {
        self.lexemes.insert(key, lexeme);
    }

    /// Destroy the Lexeme when its last occurrence is gone.
    pub(crate) fn drop_lexeme_if_orphan(&mut self, key: LexemeKey) -> bool {
        if self.lexemes.get(&key).is_some_and(Lexeme::is_orphan) {
            self.lexemes.remove(&key);
            true
        } else {
            false
        }
    }

    // ---- Location index ----

    pub fn location(&self, key: LocationKey) -> Option<&Location> {
        self.locations.get(&key)
    }

    pub fn location_for<S: AsRef<str>>(&self, context: &[S]) -> Option<&Location> {
        self.locations.get(&location_key(context))
    }

    pub fn locations(&self) -> impl Iterator<Item = (&LocationKey, &Location)> {
        self.locations.iter()
    }

    pub(crate) fn location_mut(&mut self, key: LocationKey) -> Option<&mut Location> {
        self.locations.get_mut(&key)
    }

    /// Location for `context`, created on first insertion of a child.
    pub(crate) fn location_entry(&mut self, context: &[String], now: Timestamp) -> &mut Location {
        self.locations
            .entry(location_key(context))
            .or_insert_with(|| Location::new(context.to_vec(), now))
    }

    pub(crate) fn put_location(&mut self, key: LocationKey, location: Location) {
        self.locations.insert(key, location);
    }

    pub(crate) fn take_location(&mut self, key: LocationKey) -> Option<Location> {
        self.locations.remove(&key)
    }

    /// Destroy the Location when its children list empties, unless it is a
    /// pending lazy-load placeholder.
    pub(crate) fn drop_location_if_empty(&mut self, key: LocationKey) -> bool {
        let removable = self
            .locations
            .get(&key)
            .is_some_and(|l| l.is_empty() && !l.is_pending());
        if removable {
            self.locations.remove(&key);
        }
        removable
    }

    // ---- Query API ----

    /// Children of a context in display order (L3): ascending rank, or by
    /// value when the context carries `=sort Alphabetical`. Meta attributes
    /// sort first either way.
    pub fn children<S: AsRef<str>>(&self, context: &[S]) -> Vec<&Child> {
        let Some(location) = self.location_for(context) else {
            return Vec::new();
        };
        // The engine collects empty Locations; one here means the indices
        // drifted.
        debug_assert!(
            location.is_pending() || !location.is_empty(),
            "empty location survived garbage collection"
        );
        if location.is_empty() && !location.is_pending() {
            warn!(context = ?location.context(), "empty location observed");
            return Vec::new();
        }
        let mut children: Vec<&Child> = location.children().iter().collect();
        if self.sort_preference(context) == SortPreference::Alphabetical {
            children.sort_by_cached_key(|c| {
                (!is_meta(&c.value), normalize(&c.value).as_str().to_string())
            });
        }
        children
    }

    /// Whether this exact context holds at least one occurrence.
    ///
    /// The empty context is the root and always exists.
    pub fn path_exists<S: AsRef<str>>(&self, context: &[S]) -> bool {
        let Some((last, ancestors)) = context.split_last() else {
            return true;
        };
        let parent = location_key(ancestors);
        self.lexeme_for(last.as_ref())
            .is_some_and(|l| l.has_context(parent))
    }

    /// Display-order policy, derived from the `=sort` meta child.
    pub fn sort_preference<S: AsRef<str>>(&self, context: &[S]) -> SortPreference {
        let Some(location) = self.location_for(context) else {
            return SortPreference::Rank;
        };
        if !location.has_child("=sort") {
            return SortPreference::Rank;
        }
        let mut sort_context: Vec<String> =
            context.iter().map(|s| s.as_ref().to_string()).collect();
        sort_context.push("=sort".to_string());
        let alphabetical = self
            .location_for(&sort_context)
            .and_then(|l| l.children().first())
            .is_some_and(|c| normalize(&c.value).as_str() == "alphabetical");
        if alphabetical {
            SortPreference::Alphabetical
        } else {
            SortPreference::Rank
        }
    }

    // ---- Context views ----

    pub fn views(&self) -> &ContextViews {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut ContextViews {
        &mut self.views
    }
}
