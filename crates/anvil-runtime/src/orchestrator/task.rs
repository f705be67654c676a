//! Spawn parameters and the per-task record the orchestrator tracks.

use std::sync::Arc;

use anvil_core::{ChatId, RunContext, TaskId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::AgentRuntime;
use crate::errors::RuntimeError;
use crate::types::{TaskOutput, TaskStatus};

/// Builds the runtime for a task from its run identity and cancellation
/// token.
pub type RuntimeFactory = Arc<
    dyn Fn(RunContext, CancellationToken) -> Result<Arc<dyn AgentRuntime>, RuntimeError>
        + Send
        + Sync,
>;

/// Error recorded when a task is cancelled before its runtime starts.
pub const ABORTED_BEFORE_START: &str = "Task aborted before runtime start";
/// Error recorded when a task is cancelled.
pub const TASK_CANCELLED: &str = "Task cancelled";
/// Error recorded when the pruner cancels a task.
pub const TASK_STALE: &str = "Task marked stale by timeout";

/// What to run and how.
pub struct SpawnParams {
    /// Agent definition name.
    pub agent_name: String,
    /// Initial user prompt.
    pub prompt: String,
    /// Human-readable summary of the task.
    pub description: String,
    /// Delegating run; `None` spawns a primary run in `chat_id`.
    pub parent: Option<RunContext>,
    /// Chat for primary runs.
    pub chat_id: ChatId,
    /// Cancelling this token cancels the task.
    pub parent_cancel: Option<CancellationToken>,
    /// Provider id for concurrency accounting.
    pub provider: String,
    /// Model id for concurrency accounting.
    pub model: Option<String>,
    /// Builds the runtime once a slot is held.
    pub runtime_factory: RuntimeFactory,
    /// Return immediately instead of waiting for a terminal state.
    pub run_in_background: bool,
}

impl SpawnParams {
    /// Foreground primary run with provider `"default"`.
    pub fn new(
        agent_name: impl Into<String>,
        prompt: impl Into<String>,
        runtime_factory: RuntimeFactory,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            prompt: prompt.into(),
            description: String::new(),
            parent: None,
            chat_id: 0,
            parent_cancel: None,
            provider: "default".into(),
            model: None,
            runtime_factory,
            run_in_background: false,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Run as a sub-agent of `parent`, cancelled with `cancel`.
    #[must_use]
    pub fn with_parent(mut self, parent: RunContext, cancel: CancellationToken) -> Self {
        self.chat_id = parent.chat_id();
        self.parent = Some(parent);
        self.parent_cancel = Some(cancel);
        self
    }

    /// Chat for a primary run.
    #[must_use]
    pub fn with_chat_id(mut self, chat_id: ChatId) -> Self {
        self.chat_id = chat_id;
        self
    }

    /// Provider and model the runtime will call.
    #[must_use]
    pub fn with_model(mut self, provider: impl Into<String>, model: Option<String>) -> Self {
        self.provider = provider.into();
        self.model = model;
        self
    }

    /// Run in the background.
    #[must_use]
    pub fn in_background(mut self, background: bool) -> Self {
        self.run_in_background = background;
        self
    }

    pub(crate) fn run_context(&self) -> RunContext {
        match &self.parent {
            Some(parent) => RunContext::sub_agent(parent, self.agent_name.clone()),
            None => RunContext::primary(self.chat_id, self.agent_name.clone()),
        }
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        match &self.parent_cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        }
    }
}

impl std::fmt::Debug for SpawnParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnParams")
            .field("agent_name", &self.agent_name)
            .field("description", &self.description)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("run_in_background", &self.run_in_background)
            .finish_non_exhaustive()
    }
}

struct TaskState {
    status: TaskStatus,
    completed_at: Option<DateTime<Utc>>,
    result: Option<String>,
    error: Option<String>,
    runtime: Option<Arc<dyn AgentRuntime>>,
}

/// One tracked task.
pub(crate) struct TaskEntry {
    pub(crate) id: TaskId,
    pub(crate) agent_name: String,
    pub(crate) description: String,
    pub(crate) run: RunContext,
    pub(crate) cancel: CancellationToken,
    pub(crate) started_at: DateTime<Utc>,
    state: Mutex<TaskState>,
    done: Notify,
}

impl TaskEntry {
    pub(crate) fn new(params: &SpawnParams) -> Self {
        Self {
            id: TaskId::new(),
            agent_name: params.agent_name.clone(),
            description: params.description.clone(),
            run: params.run_context(),
            cancel: params.cancel_token(),
            started_at: Utc::now(),
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                completed_at: None,
                result: None,
                error: None,
                runtime: None,
            }),
            done: Notify::new(),
        }
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    /// `Pending → Running`. False if the task already left `Pending`.
    pub(crate) fn mark_running(&self, runtime: Arc<dyn AgentRuntime>) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Pending {
            return false;
        }
        state.status = TaskStatus::Running;
        state.runtime = Some(runtime);
        debug!(task_id = %self.id, "task running");
        true
    }

    /// Move to a terminal state.
    ///
    /// If the task is already terminal the status is kept, and `result` is
    /// only recorded when none was.
    pub(crate) fn finish(
        &self,
        status: TaskStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> bool {
        let moved = {
            let mut state = self.state.lock();
            if state.status.can_transition_to(status) && status.is_terminal() {
                state.status = status;
                state.completed_at = Some(Utc::now());
                state.result = result;
                if error.is_some() {
                    state.error = error;
                }
                state.runtime = None;
                true
            } else {
                if state.result.is_none() {
                    state.result = result;
                }
                state.runtime = None;
                false
            }
        };
        if moved {
            debug!(task_id = %self.id, %status, "task finished");
            self.done.notify_waiters();
        }
        moved
    }

    /// Request cancellation and mark the task cancelled now.
    ///
    /// No-op for terminal tasks.
    pub(crate) fn cancel(&self, reason: &str) -> bool {
        let runtime = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return false;
            }
            state.status = TaskStatus::Cancelled;
            state.completed_at = Some(Utc::now());
            if state.error.is_none() {
                state.error = Some(reason.to_owned());
            }
            if let Some(rt) = &state.runtime {
                state.result = Some(rt.accumulated_text());
            }
            state.runtime.take()
        };
        self.cancel.cancel();
        if let Some(rt) = runtime {
            rt.abort();
        }
        debug!(task_id = %self.id, reason, "task cancelled");
        self.done.notify_waiters();
        true
    }

    /// When the task ended, or when it started if it has not.
    pub(crate) fn age_anchor(&self) -> DateTime<Utc> {
        self.state.lock().completed_at.unwrap_or(self.started_at)
    }

    pub(crate) fn output(&self) -> TaskOutput {
        let state = self.state.lock();
        let end = state.completed_at.unwrap_or_else(Utc::now);
        let duration_ms = u64::try_from((end - self.started_at).num_milliseconds()).unwrap_or(0);
        let result = match (&state.result, &state.runtime) {
            (Some(text), _) => Some(text.clone()),
            (None, Some(rt)) => Some(rt.accumulated_text()),
            (None, None) => None,
        };
        TaskOutput {
            task_id: self.id.clone(),
            status: state.status,
            result,
            error: state.error.clone(),
            agent_name: self.agent_name.clone(),
            description: self.description.clone(),
            duration_ms,
        }
    }

    /// Resolve once the task is terminal.
    pub(crate) async fn wait_terminal(&self) {
        let notified = self.done.notified();
        tokio::pin!(notified);
        let _ = notified.as_mut().enable();
        if self.status().is_terminal() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LoopResult;
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl AgentRuntime for Fixed {
        async fn run(&self, _prompt: &str) -> Result<LoopResult, RuntimeError> {
            Ok(LoopResult::Completed)
        }
        fn accumulated_text(&self) -> String {
            "partial".into()
        }
        fn abort(&self) {}
    }

    fn factory() -> RuntimeFactory {
        Arc::new(|_: RunContext, _: CancellationToken| Ok(Arc::new(Fixed) as Arc<dyn AgentRuntime>))
    }

    #[test]
    fn sub_agent_params_derive_child_identity() {
        let parent = RunContext::primary(9, "build");
        let parent_cancel = CancellationToken::new();
        let params = SpawnParams::new("explore", "look", factory())
            .with_parent(parent.clone(), parent_cancel.clone());
        let entry = TaskEntry::new(&params);

        assert_eq!(entry.run.parent_run_id(), Some(parent.run_id()));
        assert_eq!(entry.run.chat_id(), 9);
        assert_eq!(entry.status(), TaskStatus::Pending);

        parent_cancel.cancel();
        assert!(entry.cancel.is_cancelled());
    }

    #[test]
    fn finish_after_cancel_keeps_cancelled() {
        let entry = TaskEntry::new(&SpawnParams::new("a", "p", factory()));
        assert!(entry.mark_running(Arc::new(Fixed)));
        assert!(entry.cancel(TASK_CANCELLED));
        assert!(entry.cancel.is_cancelled());

        assert!(!entry.finish(TaskStatus::Completed, Some("late".into()), None));
        let out = entry.output();
        assert_eq!(out.status, TaskStatus::Cancelled);
        assert_eq!(out.result.as_deref(), Some("partial"));
        assert_eq!(out.error.as_deref(), Some(TASK_CANCELLED));
    }

    #[test]
    fn terminal_tasks_ignore_cancel() {
        let entry = TaskEntry::new(&SpawnParams::new("a", "p", factory()));
        assert!(entry.finish(TaskStatus::Error, None, Some("boom".into())));
        assert!(!entry.cancel(TASK_CANCELLED));
        assert_eq!(entry.status(), TaskStatus::Error);
        assert!(!entry.cancel.is_cancelled());
    }

    #[test]
    fn running_output_reads_live_transcript() {
        let entry = TaskEntry::new(&SpawnParams::new("a", "p", factory()));
        assert!(entry.mark_running(Arc::new(Fixed)));
        assert!(!entry.mark_running(Arc::new(Fixed)));
        let out = entry.output();
        assert_eq!(out.status, TaskStatus::Running);
        assert_eq!(out.result.as_deref(), Some("partial"));
    }
}
