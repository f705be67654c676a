//! `BackgroundOrchestrator`: spawns agent runs as tracked tasks.
//!
//! Each spawn gets a [`RunContext`] (primary, or a sub-agent of the caller),
//! a cancellation token derived from the caller's, and a [`TaskId`]. The
//! runtime is built by the caller's factory once a concurrency slot is
//! held. Foreground spawns return after the task is terminal; background
//! spawns return the id immediately.

use std::sync::{Arc, Weak};
use std::time::Duration;

use anvil_core::{RunInfo, RunLineage, TaskId};
use anvil_settings::ConcurrencySettings;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::errors::RuntimeError;
use crate::orchestrator::concurrency::{ConcurrencyManager, ConcurrencyStatus, SlotPermit};
use crate::orchestrator::task::{
    ABORTED_BEFORE_START, RuntimeFactory, SpawnParams, TASK_CANCELLED, TASK_STALE, TaskEntry,
};
use crate::types::{LoopResult, TaskOutput, TaskStatus};

/// Error recorded when a run exhausts its step budget.
pub const STEP_BUDGET_EXHAUSTED: &str = "Step budget exhausted before the agent finished";

/// Counts from one pruning pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Live tasks cancelled for being stale.
    pub cancelled: usize,
    /// Finished tasks dropped from tracking.
    pub removed: usize,
}

/// Everything a task body needs, detached from the orchestrator.
struct TaskRun {
    entry: Arc<TaskEntry>,
    concurrency: ConcurrencyManager,
    lineage: Option<Arc<dyn RunLineage>>,
    key: String,
    prompt: String,
    factory: RuntimeFactory,
    background: bool,
}

impl TaskRun {
    async fn acquire(&self) -> Option<SlotPermit> {
        if !self.background {
            return Some(self.concurrency.acquire_unbounded(&self.key));
        }
        tokio::select! {
            biased;
            () = self.entry.cancel.cancelled() => {
                let _ = self.entry.finish(TaskStatus::Cancelled, None, Some(ABORTED_BEFORE_START.into()));
                None
            }
            acquired = self.concurrency.acquire(&self.key) => match acquired {
                Ok(permit) => Some(permit),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "task could not acquire a slot");
                    let status = if self.entry.cancel.is_cancelled() {
                        TaskStatus::Cancelled
                    } else {
                        TaskStatus::Error
                    };
                    let _ = self.entry.finish(status, None, Some(e.to_string()));
                    None
                }
            }
        }
    }

    async fn execute(self) {
        let Some(_permit) = self.acquire().await else {
            return;
        };
        let entry = &self.entry;

        if entry.cancel.is_cancelled() {
            let _ = entry.finish(TaskStatus::Cancelled, None, Some(ABORTED_BEFORE_START.into()));
            return;
        }

        let runtime = match (self.factory)(entry.run.clone(), entry.cancel.clone()) {
            Ok(rt) => rt,
            Err(e) => {
                error!(error = %e, "runtime factory failed");
                let _ = entry.finish(TaskStatus::Error, None, Some(e.to_string()));
                return;
            }
        };
        if !entry.mark_running(runtime.clone()) {
            return;
        }
        self.record_start().await;

        let outcome = runtime.run(&self.prompt).await;
        let text = runtime.accumulated_text();
        let (status, message) = match outcome {
            Ok(LoopResult::Completed) => (TaskStatus::Completed, None),
            Ok(LoopResult::Aborted) => (TaskStatus::Cancelled, Some(TASK_CANCELLED.to_owned())),
            Ok(LoopResult::MaxSteps) => {
                (TaskStatus::Error, Some(STEP_BUDGET_EXHAUSTED.to_owned()))
            }
            Err(e) if entry.cancel.is_cancelled() => (TaskStatus::Cancelled, Some(e.to_string())),
            Err(e) => {
                error!(error = %e, category = e.category(), "task failed");
                (TaskStatus::Error, Some(e.to_string()))
            }
        };
        let _ = entry.finish(status, Some(text), message);
        self.record_end().await;
        info!(status = %entry.status(), "task finished");
    }

    async fn record_start(&self) {
        if let Some(lineage) = &self.lineage {
            if let Err(e) = lineage.record(RunInfo::from_context(&self.entry.run)).await {
                warn!(error = %e, "failed to record run start");
            }
        }
    }

    async fn record_end(&self) {
        if let Some(lineage) = &self.lineage {
            let out = self.entry.output();
            let reason = match out.status {
                TaskStatus::Completed => None,
                _ => out.error,
            };
            let run_id = self.entry.run.run_id();
            if let Err(e) = lineage
                .update_status(run_id, out.status.as_run_status(), reason)
                .await
            {
                warn!(error = %e, "failed to record run end");
            }
        }
    }
}

/// Spawns, tracks, and cancels agent tasks.
pub struct BackgroundOrchestrator {
    tasks: DashMap<TaskId, Arc<TaskEntry>>,
    concurrency: ConcurrencyManager,
    stale_timeout: Duration,
    prune_interval: Duration,
    lineage: Option<Arc<dyn RunLineage>>,
    pruner: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl BackgroundOrchestrator {
    /// Orchestrator with limits and timeouts from `settings`.
    pub fn new(settings: &ConcurrencySettings) -> Self {
        Self {
            tasks: DashMap::new(),
            concurrency: ConcurrencyManager::new(settings),
            stale_timeout: Duration::from_millis(settings.stale_timeout_ms),
            prune_interval: Duration::from_millis(settings.prune_interval_ms),
            lineage: None,
            pruner: Mutex::new(None),
        }
    }

    /// Record every run in `lineage`.
    #[must_use]
    pub fn with_lineage(mut self, lineage: Arc<dyn RunLineage>) -> Self {
        self.lineage = Some(lineage);
        self
    }

    /// Start a task.
    ///
    /// Background spawns return as soon as the task is tracked. Foreground
    /// spawns run the task on the caller and return once it is terminal.
    /// Failures are recorded on the task, never returned.
    pub async fn spawn(&self, params: SpawnParams) -> TaskId {
        let entry = Arc::new(TaskEntry::new(&params));
        let id = entry.id.clone();
        let _ = self.tasks.insert(id.clone(), entry.clone());

        let key = self
            .concurrency
            .key_for(&params.provider, params.model.as_deref());
        let span = info_span!(
            "task",
            task_id = %id,
            run_id = %entry.run.run_id(),
            agent = %entry.agent_name,
        );
        debug!(
            task_id = %id,
            agent = %entry.agent_name,
            key = %key,
            background = params.run_in_background,
            sub_agent = entry.run.is_sub_agent(),
            "task spawned"
        );

        let run = TaskRun {
            entry: entry.clone(),
            concurrency: self.concurrency.clone(),
            lineage: self.lineage.clone(),
            key,
            prompt: params.prompt,
            factory: params.runtime_factory,
            background: params.run_in_background,
        };

        if params.run_in_background {
            let handle = tokio::spawn(run.execute().instrument(span));
            let _ = tokio::spawn(async move {
                if let Err(e) = handle.await {
                    error!(task_id = %entry.id, error = %e, "task body did not finish");
                    let _ = entry.finish(TaskStatus::Error, None, Some(format!("task aborted: {e}")));
                }
            });
        } else {
            run.execute().instrument(span).await;
        }
        id
    }

    fn entry(&self, task_id: &TaskId) -> Result<Arc<TaskEntry>, RuntimeError> {
        self.tasks
            .get(task_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RuntimeError::TaskNotFound(task_id.clone()))
    }

    /// Current status of a task.
    pub fn get_task_status(&self, task_id: &TaskId) -> Result<TaskStatus, RuntimeError> {
        self.entry(task_id).map(|e| e.status())
    }

    /// Snapshot of a task, including partial output while it runs.
    pub fn get_task_output(&self, task_id: &TaskId) -> Result<TaskOutput, RuntimeError> {
        self.entry(task_id).map(|e| e.output())
    }

    /// Snapshots of every tracked task, oldest first.
    pub fn list_tasks(&self) -> Vec<TaskOutput> {
        let mut entries: Vec<Arc<TaskEntry>> =
            self.tasks.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.started_at);
        entries.iter().map(|e| e.output()).collect()
    }

    /// Wait up to `timeout` for a task to finish, then return its snapshot.
    pub async fn wait_for_task(
        &self,
        task_id: &TaskId,
        timeout: Duration,
    ) -> Result<TaskOutput, RuntimeError> {
        let entry = self.entry(task_id)?;
        if tokio::time::timeout(timeout, entry.wait_terminal()).await.is_err() {
            debug!(task_id = %task_id, "wait for task timed out");
        }
        Ok(entry.output())
    }

    /// Cancel a task. The status is `Cancelled` on return; the runtime
    /// unwinds on its own.
    ///
    /// Returns `false` when the task was already terminal.
    pub fn cancel_task(&self, task_id: &TaskId) -> Result<bool, RuntimeError> {
        let entry = self.entry(task_id)?;
        let cancelled = entry.cancel(TASK_CANCELLED);
        if cancelled {
            info!(task_id = %task_id, "task cancelled");
        }
        Ok(cancelled)
    }

    /// Cancel every live task. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let entries: Vec<Arc<TaskEntry>> = self.tasks.iter().map(|e| e.value().clone()).collect();
        let count = entries.iter().filter(|e| e.cancel(TASK_CANCELLED)).count();
        if count > 0 {
            info!(count, "cancelled all tasks");
        }
        count
    }

    /// Prune with the configured stale timeout.
    pub fn prune_stale(&self) -> PruneReport {
        let age = chrono::Duration::from_std(self.stale_timeout).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_before(cutoff)
    }

    /// Cancel live tasks started before `cutoff` and drop finished tasks
    /// that ended before it.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> PruneReport {
        let mut report = PruneReport::default();
        let entries: Vec<Arc<TaskEntry>> = self.tasks.iter().map(|e| e.value().clone()).collect();
        for entry in entries {
            if entry.age_anchor() >= cutoff {
                continue;
            }
            if entry.status().is_terminal() {
                if self.tasks.remove(&entry.id).is_some() {
                    report.removed += 1;
                }
            } else if entry.cancel(TASK_STALE) {
                warn!(task_id = %entry.id, agent = %entry.agent_name, "stale task cancelled");
                report.cancelled += 1;
            }
        }
        if report != PruneReport::default() {
            debug!(cancelled = report.cancelled, removed = report.removed, "pruned tasks");
        }
        report
    }

    /// Prune periodically until [`shutdown`](Self::shutdown). Calling again
    /// replaces the running pruner.
    pub fn start_pruner(self: &Arc<Self>) {
        let stop = CancellationToken::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.prune_interval.max(Duration::from_millis(1));
        let token = stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(orchestrator) = weak.upgrade() else { break };
                        let _ = orchestrator.prune_stale();
                    }
                }
            }
            debug!("pruner stopped");
        });
        if let Some((old, _)) = self.pruner.lock().replace((stop, handle)) {
            old.cancel();
        }
    }

    /// Current concurrency usage.
    pub fn concurrency_status(&self) -> ConcurrencyStatus {
        self.concurrency.status()
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is tracked.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel everything, stop the pruner, and forget all tasks.
    pub async fn shutdown(&self) {
        let cancelled = self.cancel_all();
        self.concurrency.close_waiters();
        let pruner = self.pruner.lock().take();
        if let Some((stop, handle)) = pruner {
            stop.cancel();
            let _ = handle.await;
        }
        self.tasks.clear();
        info!(cancelled, "orchestrator shut down");
    }
}

impl std::fmt::Debug for BackgroundOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundOrchestrator")
            .field("tasks", &self.tasks.len())
            .field("stale_timeout", &self.stale_timeout)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
