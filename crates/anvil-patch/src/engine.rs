//! The replace engine: resolve `old` to one span of `content` and rewrite it.

use std::collections::HashSet;

use tracing::debug;

use crate::errors::{PatchError, Result};
use crate::strategies::{Span, Strategy};

/// A located span, valid only for the content it was resolved against.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchCandidate {
    /// Byte offset of the match start.
    pub start: usize,
    /// Byte offset one past the match end.
    pub end: usize,
    /// The original content in `start..end`.
    pub text: String,
    /// Strategy that resolved the match.
    pub strategy: Strategy,
    /// Strategy confidence in `[0.0, 1.0]`.
    pub score: f64,
}

/// Outcome of a successful replace.
#[derive(Clone, Debug, PartialEq)]
pub struct Replacement {
    /// Rewritten content.
    pub content: String,
    /// Number of spans replaced.
    pub count: usize,
    /// Strategy that located the spans.
    pub strategy: Strategy,
}

/// Distinct spans in first-seen order.
fn distinct(spans: Vec<Span>) -> Vec<Span> {
    let mut seen = HashSet::new();
    spans
        .into_iter()
        .filter(|s| seen.insert((s.start, s.end)))
        .collect()
}

/// Resolve `old` to exactly one span of `content`.
///
/// Strategies run in [`Strategy::CASCADE`] order. The first strategy with one
/// distinct candidate wins; a strategy with several candidates fails the call
/// with [`PatchError::AmbiguousMatch`] without consulting later strategies.
pub fn find_match(content: &str, old: &str) -> Result<MatchCandidate> {
    for strategy in Strategy::CASCADE {
        let spans = distinct(strategy.candidates(content, old));
        match spans.as_slice() {
            [] => {}
            [span] => {
                debug!(
                    strategy = strategy.name(),
                    start = span.start,
                    end = span.end,
                    score = span.score,
                    "match resolved"
                );
                return Ok(MatchCandidate {
                    start: span.start,
                    end: span.end,
                    text: content[span.start..span.end].to_owned(),
                    strategy,
                    score: span.score,
                });
            }
            many => {
                debug!(strategy = strategy.name(), count = many.len(), "ambiguous match");
                return Err(PatchError::AmbiguousMatch {
                    strategy: strategy.name(),
                    count: many.len(),
                });
            }
        }
    }
    Err(PatchError::not_found(old))
}

/// Replace `old` with `new` in `content`.
///
/// With `replace_all`, every literal occurrence is replaced. An empty `old`
/// inserts `new` once at the start of `content`, even with `replace_all`.
pub fn replace(content: &str, old: &str, new: &str, replace_all: bool) -> Result<String> {
    replace_with_report(content, old, new, replace_all).map(|r| r.content)
}

/// Like [`replace`], also reporting how many spans changed and which strategy
/// located them.
pub fn replace_with_report(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<Replacement> {
    if replace_all && !old.is_empty() {
        let spans = Strategy::MultiOccurrence.candidates(content, old);
        if spans.is_empty() {
            return Err(PatchError::not_found(old));
        }
        let mut out = String::with_capacity(content.len());
        let mut cursor = 0;
        for span in &spans {
            out.push_str(&content[cursor..span.start]);
            out.push_str(new);
            cursor = span.end;
        }
        out.push_str(&content[cursor..]);
        debug!(count = spans.len(), "replaced all occurrences");
        return Ok(Replacement {
            content: out,
            count: spans.len(),
            strategy: Strategy::MultiOccurrence,
        });
    }

    let found = find_match(content, old)?;
    let mut out = String::with_capacity(content.len() + new.len());
    out.push_str(&content[..found.start]);
    out.push_str(new);
    out.push_str(&content[found.end..]);
    Ok(Replacement {
        content: out,
        count: 1,
        strategy: found.strategy,
    })
}
