//! Runtime error types.

use anvil_core::{LineageError, TaskId};
use anvil_hooks::HookError;
use anvil_stream::StreamError;
use anvil_tools::ToolError;

/// Errors raised by the agent loop and the task orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// No task with this id is tracked.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// A background task waited too long for a concurrency slot.
    #[error("Timed out acquiring concurrency slot for \"{key}\" after {timeout_ms}ms")]
    ConcurrencyTimeout {
        /// Concurrency key (provider or `model:<id>`).
        key: String,
        /// How long the task waited.
        timeout_ms: u64,
    },

    /// A lifecycle hook failed.
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// Tool resolution or execution failed outside the model stream.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The model client could not open a stream.
    #[error("Model error: {0}")]
    Model(#[from] StreamError),

    /// Run lineage storage failed.
    #[error("Lineage error: {0}")]
    Lineage(#[from] LineageError),

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The runtime factory refused to build a runtime.
    #[error("Runtime construction failed: {0}")]
    Factory(String),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Whether retrying the same request may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConcurrencyTimeout { .. } | Self::Cancelled | Self::Model(_) => true,
            Self::TaskNotFound(_)
            | Self::Hook(_)
            | Self::Tool(_)
            | Self::Lineage(_)
            | Self::Factory(_)
            | Self::Internal(_) => false,
        }
    }

    /// Stable category string for logs and task records.
    pub fn category(&self) -> &'static str {
        match self {
            Self::TaskNotFound(_) => "task_not_found",
            Self::ConcurrencyTimeout { .. } => "concurrency_timeout",
            Self::Hook(_) => "hook",
            Self::Tool(_) => "tool",
            Self::Model(_) => "model",
            Self::Lineage(_) => "lineage",
            Self::Cancelled => "cancelled",
            Self::Factory(_) => "factory",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_timeout_names_key() {
        let err = RuntimeError::ConcurrencyTimeout {
            key: "anthropic".into(),
            timeout_ms: 30_000,
        };
        assert_eq!(
            err.to_string(),
            "Timed out acquiring concurrency slot for \"anthropic\" after 30000ms"
        );
        assert_eq!(err.category(), "concurrency_timeout");
        assert!(err.is_recoverable());
    }

    #[test]
    fn task_not_found_is_not_recoverable() {
        let err = RuntimeError::TaskNotFound(TaskId::from("t-1"));
        assert_eq!(err.to_string(), "Task not found: t-1");
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "task_not_found");
    }

    #[test]
    fn hook_errors_convert() {
        let err: RuntimeError = HookError::failed("boom").into();
        assert_eq!(err.category(), "hook");
        assert!(err.to_string().contains("boom"));
    }
}
