//! # anvil-patch
//!
//! Turns free-text edit proposals into exact file mutations.
//!
//! - [`replace`] / [`find_match`]: locate `old` in content through an ordered
//!   cascade of [`Strategy`]s, failing on no match or on an ambiguous one
//! - [`parse_patch`] / [`apply_hunks`]: the `*** Begin Patch` envelope format
//!   for multi-file add/update/move/delete
//! - [`unified_diff`]: human-readable change summaries

#![deny(unsafe_code)]

pub mod apply_patch;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod similarity;
pub mod strategies;

pub use apply_patch::{
    AffectedPaths, Hunk, UpdateChunk, apply_hunks, derive_new_contents, parse_patch, seek_sequence,
};
pub use diff::unified_diff;
pub use engine::{MatchCandidate, Replacement, find_match, replace, replace_with_report};
pub use errors::{PatchError, Result};
pub use strategies::Strategy;
