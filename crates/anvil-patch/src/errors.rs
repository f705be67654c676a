//! Patch engine error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the replace engine and the apply-patch pipeline.
#[derive(Debug, Error)]
pub enum PatchError {
    /// No matching strategy located the target text.
    #[error("old_string not found in content: \"{preview}\"")]
    NotFound {
        /// Truncated copy of the searched text.
        preview: String,
    },

    /// A single-match request resolved to more than one location.
    #[error(
        "found {count} matches for old_string via {strategy} matching; \
         add more surrounding context lines to make the match unique, \
         or use replace_all to change every occurrence"
    )]
    AmbiguousMatch {
        /// Strategy that produced the candidates.
        strategy: &'static str,
        /// Number of distinct candidates.
        count: usize,
    },

    /// The patch text is not a well-formed envelope.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// The patch contained no file operations.
    #[error("no files were modified: patch contains no hunks")]
    NoHunks,

    /// An `@@` context line could not be located.
    #[error("failed to find context '{context}' in {path}")]
    ContextNotFound {
        /// The context line.
        context: String,
        /// File being updated.
        path: PathBuf,
    },

    /// A chunk's old lines could not be located.
    #[error("failed to find expected lines in {path}:\n{lines}")]
    LinesNotFound {
        /// The expected lines, newline-joined.
        lines: String,
        /// File being updated.
        path: PathBuf,
    },

    /// Filesystem failure during apply.
    #[error("{action} {path}: {source}")]
    Io {
        /// What was being done (`"reading"`, `"writing"`, ...).
        action: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    pub(crate) fn not_found(old: &str) -> Self {
        Self::NotFound {
            preview: preview(old, 80),
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Result type for patch operations.
pub type Result<T> = std::result::Result<T, PatchError>;

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
