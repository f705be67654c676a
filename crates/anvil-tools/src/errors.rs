//! Tool error types.

use anvil_patch::PatchError;
use thiserror::Error;

/// Errors from tool registration and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A tool with this id is already registered.
    #[error("tool \"{id}\" is already registered")]
    DuplicateTool {
        /// The colliding id.
        id: String,
    },

    /// Execution was requested after the turn was cancelled.
    #[error("tool \"{tool}\" execution aborted")]
    Aborted {
        /// Tool id.
        tool: String,
    },

    /// The user declined (or never answered) the consent prompt.
    #[error("user denied permission for tool \"{tool}\"")]
    ConsentDenied {
        /// Tool id.
        tool: String,
    },

    /// Input failed validation.
    #[error("validation error: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// One edit of a multi-edit failed; nothing was written.
    #[error("edit {index} failed: {source}")]
    Edit {
        /// 1-based position of the failing edit.
        index: usize,
        /// Engine failure.
        #[source]
        source: PatchError,
    },

    /// Replace engine or apply-patch failure.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Filesystem failure.
    #[error("{action} {path}: {source}")]
    Io {
        /// What was being done.
        action: &'static str,
        /// Path involved.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Tool-specific failure.
    #[error("{0}")]
    Internal(String),
}

impl ToolError {
    /// Shorthand for a [`ToolError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_display() {
        let err = ToolError::DuplicateTool { id: "edit".into() };
        assert_eq!(err.to_string(), "tool \"edit\" is already registered");
    }

    #[test]
    fn patch_error_is_transparent() {
        let err: ToolError = PatchError::NoHunks.into();
        assert_eq!(err.to_string(), PatchError::NoHunks.to_string());
    }

    #[test]
    fn edit_error_names_index() {
        let err = ToolError::Edit {
            index: 2,
            source: PatchError::NoHunks,
        };
        assert!(err.to_string().starts_with("edit 2 failed"));
    }
}
