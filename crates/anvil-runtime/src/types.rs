//! Loop results, task status, and task output records.

use std::fmt;

use anvil_core::{RunStatus, TaskId};
use serde::{Deserialize, Serialize};

/// Why an agent loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopResult {
    /// The model stopped without requesting tools.
    Completed,
    /// The run's cancellation token fired.
    Aborted,
    /// The step budget ran out while the model still wanted tools.
    MaxSteps,
}

impl fmt::Display for LoopResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::MaxSteps => write!(f, "max-steps"),
        }
    }
}

/// Lifecycle of an orchestrated task.
///
/// Moves forward only: `Pending → Running → {Completed | Error | Cancelled}`,
/// or straight from `Pending` to a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Allocated, waiting for a slot or for the runtime to start.
    Pending,
    /// The agent loop is running.
    Running,
    /// The loop finished normally.
    Completed,
    /// The loop failed or exhausted its step budget.
    Error,
    /// Cancelled by a caller, a parent, or the pruner.
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Error | Self::Cancelled => false,
        }
    }

    /// Lineage status for a terminal task status.
    pub fn as_run_status(self) -> RunStatus {
        match self {
            Self::Pending | Self::Running => RunStatus::Running,
            Self::Completed => RunStatus::Completed,
            Self::Error => RunStatus::Error,
            Self::Cancelled => RunStatus::Cancelled,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Snapshot of a task returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    /// Task id.
    pub task_id: TaskId,
    /// Current status.
    pub status: TaskStatus,
    /// Transcript text the loop produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Failure or cancellation message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Agent that ran the task.
    pub agent_name: String,
    /// Caller-supplied description.
    pub description: String,
    /// Milliseconds from start to end, or to now while still running.
    pub duration_ms: u64,
}
