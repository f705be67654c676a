//! Hook error types.

use thiserror::Error;

use crate::types::HookPoint;

/// Errors from hook registration and dispatch.
#[derive(Debug, Error)]
pub enum HookError {
    /// A hook with this name is already registered on the point.
    #[error("hook \"{name}\" is already registered on \"{point}\"")]
    DuplicateHook {
        /// Hook point.
        point: HookPoint,
        /// Hook name.
        name: String,
    },

    /// A handler failed during dispatch. Remaining handlers did not run.
    #[error("hook \"{hook}\" on \"{point}\" failed: {source}")]
    Handler {
        /// Failing hook name.
        hook: String,
        /// Point being dispatched.
        point: HookPoint,
        /// What the handler returned.
        #[source]
        source: Box<HookError>,
    },

    /// Failure raised by a handler body.
    #[error("{0}")]
    Failed(String),
}

impl HookError {
    /// Shorthand for a handler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
