//! Core thought-graph store for a multi-context outliner.
//!
//! Module hierarchy follows type dependency order:
//! - timestamp: wall-clock primitives (Layer 0)
//! - identity: normalization + hash keys (Layer 1)
//! - rank: sibling ordering keys (Layer 2)
//! - lexeme, location: index entry types (Layer 3)
//! - state: the dual-index graph (Layer 4)
//! - path: typed path shapes + resolution (Layer 5)
//! - apply: the mutation engine (Layer 6)
//! - audit: index reconciliation (Layer 7)
//! - textio: indented-text import/export (Layer 8)

#![forbid(unsafe_code)]

pub mod apply;
pub mod audit;
pub mod error;
pub mod identity;
pub mod lexeme;
pub mod location;
pub mod path;
pub mod rank;
pub mod state;
pub mod textio;
pub mod timestamp;

pub use apply::{ApplyError, GraphOp, OpOutcome, apply_op};
pub use audit::{Repair, RepairReport, audit_ancestry};
pub use error::{CoreError, InvalidKey, InvalidOffset, InvalidRank};
pub use identity::{LexemeKey, LocationKey, NormalForm, lexeme_key, location_key, normalize};
pub use lexeme::{ContextRef, Lexeme};
pub use location::{Child, Location, SortPreference};
pub use path::{
    ContextChain, Path, PathStep, SimplePath, UnrankedPath, chain_to_path, resolve_path,
    split_chain,
};
pub use rank::{Rank, rank_after, rank_append, rank_before};
pub use state::{ContextViews, ThoughtGraph};
pub use textio::{export_text, import_text};
pub use timestamp::{Clock, FixedClock, Timestamp, WallClock};
