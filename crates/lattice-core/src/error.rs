//! Core capability errors (parsing, validation, arithmetic bounds).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details. Mutations themselves are lenient and
//! prefer no-ops over errors; these types cover malformed *input data* only.

use thiserror::Error;

/// Rank value outside the representable range.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("rank {value} is not a finite number")]
pub struct InvalidRank {
    pub value: f64,
}

/// Invalid index key string (persisted hex form).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("key `{raw}` is invalid: {reason}")]
pub struct InvalidKey {
    pub raw: String,
    pub reason: &'static str,
}

/// Split offset outside the value, or not on a character boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("offset {offset} is invalid for a value of {len} bytes")]
pub struct InvalidOffset {
    pub offset: usize,
    pub len: usize,
}

/// Canonical error enum for the core crate.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidRank(#[from] InvalidRank),
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),
    #[error(transparent)]
    InvalidOffset(#[from] InvalidOffset),
}
