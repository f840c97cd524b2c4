//! Layer 2: sibling ordering keys.
//!
//! Ranks are IEEE-754 doubles; inserting between two siblings takes the
//! midpoint, so no existing child is ever renumbered. Repeated bisection
//! between the same two neighbors eventually exhausts the mantissa — a known
//! limitation of the format, kept because observable rank values are part of
//! the store's contract.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::InvalidRank;

/// Ordering key for a child within its Location.
///
/// Total order over finite doubles; NaN is rejected at construction and at
/// the serde boundary.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Rank(f64);

impl Rank {
    pub const ZERO: Rank = Rank(0.0);

    pub fn new(value: f64) -> Result<Self, InvalidRank> {
        if value.is_finite() {
            Ok(Self(value))
        } else {
            Err(InvalidRank { value })
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl fmt::Debug for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank({})", self.0)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Rank {}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl TryFrom<f64> for Rank {
    type Error = InvalidRank;
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Rank::new(value)
    }
}

impl From<Rank> for f64 {
    fn from(rank: Rank) -> f64 {
        rank.0
    }
}

/// Rank for appending after every existing child.
///
/// `ranks` must be sorted ascending (Locations keep children sorted).
pub fn rank_append(ranks: &[Rank]) -> Rank {
    match ranks.last() {
        Some(last) => Rank(last.0 + 1.0),
        None => Rank::ZERO,
    }
}

/// Rank strictly before `target`: midpoint of (predecessor, target), or
/// `target - 1` when `target` is first.
pub fn rank_before(ranks: &[Rank], target: Rank) -> Rank {
    let index = ranks.partition_point(|r| *r < target);
    if index == 0 {
        Rank(target.0 - 1.0)
    } else {
        midpoint(ranks[index - 1], target)
    }
}

/// Rank strictly after `target`: midpoint of (target, successor), or
/// `target + 1` when `target` is last.
pub fn rank_after(ranks: &[Rank], target: Rank) -> Rank {
    let index = ranks.partition_point(|r| *r <= target);
    if index == ranks.len() {
        Rank(target.0 + 1.0)
    } else {
        midpoint(target, ranks[index])
    }
}

fn midpoint(low: Rank, high: Rank) -> Rank {
    Rank(low.0 + (high.0 - low.0) / 2.0)
}
