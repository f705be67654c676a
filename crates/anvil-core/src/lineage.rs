//! Run lineage: the persistence seam for parent/child run queries.
//!
//! The runtime records a [`RunInfo`] for every run it starts and updates its
//! status when the run ends. Storage lives behind [`RunLineage`]; the
//! in-memory implementation here backs tests and single-process hosts.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ids::{ChatId, RunId};
use crate::run_context::RunContext;

/// Maximum number of ancestors walked by [`RunLineage::run_chain`].
pub const MAX_CHAIN_DEPTH: usize = 20;

/// Lifecycle status of a recorded run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is in progress.
    Running,
    /// Run finished normally.
    Completed,
    /// Run failed.
    Error,
    /// Run was aborted.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Persisted view of one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    /// Run id.
    pub run_id: RunId,
    /// Chat the run belongs to.
    pub chat_id: ChatId,
    /// Delegating run, if any.
    pub parent_run_id: Option<RunId>,
    /// Agent definition name.
    pub agent_name: String,
    /// `"primary"` or `"subagent"`.
    pub agent_kind: String,
    /// Current status.
    pub status: RunStatus,
    /// When the run was recorded.
    pub started_at: DateTime<Utc>,
    /// When the run left `Running`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the run was aborted or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl RunInfo {
    /// Build a `Running` record from a run context.
    #[must_use]
    pub fn from_context(ctx: &RunContext) -> Self {
        Self {
            run_id: ctx.run_id().clone(),
            chat_id: ctx.chat_id(),
            parent_run_id: ctx.parent_run_id().cloned(),
            agent_name: ctx.agent_name().to_owned(),
            agent_kind: if ctx.is_sub_agent() { "subagent" } else { "primary" }.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            abort_reason: None,
        }
    }
}

/// Lineage storage errors.
#[derive(Debug, Error)]
pub enum LineageError {
    /// Backend failure.
    #[error("lineage storage error: {0}")]
    Storage(String),
}

/// Storage for run lineage.
#[async_trait]
pub trait RunLineage: Send + Sync {
    /// Insert or overwrite a run record.
    async fn record(&self, info: RunInfo) -> Result<(), LineageError>;

    /// Move a run to `status`, stamping `ended_at` unless it is `Running`.
    async fn update_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        abort_reason: Option<String>,
    ) -> Result<(), LineageError>;

    /// Look up a run.
    async fn find(&self, run_id: &RunId) -> Result<Option<RunInfo>, LineageError>;

    /// Direct children of a run, newest first.
    async fn child_runs(&self, parent: &RunId) -> Result<Vec<RunInfo>, LineageError>;

    /// Most recent `Running` run in a chat.
    async fn current_run(&self, chat_id: ChatId) -> Result<Option<RunInfo>, LineageError>;

    /// `[run, parent, grandparent, ..., root]`, capped at [`MAX_CHAIN_DEPTH`].
    async fn run_chain(&self, run_id: &RunId) -> Result<Vec<RunInfo>, LineageError> {
        let mut chain = Vec::new();
        let mut current = Some(run_id.clone());
        while let Some(id) = current {
            if chain.len() >= MAX_CHAIN_DEPTH {
                break;
            }
            let Some(info) = self.find(&id).await? else {
                break;
            };
            current = info.parent_run_id.clone();
            chain.push(info);
        }
        Ok(chain)
    }
}

/// Process-local lineage store.
#[derive(Default)]
pub struct InMemoryRunLineage {
    runs: DashMap<RunId, RunInfo>,
}

impl InMemoryRunLineage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether no runs are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl RunLineage for InMemoryRunLineage {
    async fn record(&self, info: RunInfo) -> Result<(), LineageError> {
        debug!(run_id = %info.run_id, agent = %info.agent_name, "run recorded");
        let _ = self.runs.insert(info.run_id.clone(), info);
        Ok(())
    }

    async fn update_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        abort_reason: Option<String>,
    ) -> Result<(), LineageError> {
        if let Some(mut entry) = self.runs.get_mut(run_id) {
            entry.status = status;
            entry.ended_at = (status != RunStatus::Running).then(Utc::now);
            entry.abort_reason = abort_reason;
            debug!(run_id = %run_id, status = %status, "run status updated");
        }
        Ok(())
    }

    async fn find(&self, run_id: &RunId) -> Result<Option<RunInfo>, LineageError> {
        Ok(self.runs.get(run_id).map(|r| r.value().clone()))
    }

    async fn child_runs(&self, parent: &RunId) -> Result<Vec<RunInfo>, LineageError> {
        let mut children: Vec<RunInfo> = self
            .runs
            .iter()
            .filter(|r| r.parent_run_id.as_ref() == Some(parent))
            .map(|r| r.value().clone())
            .collect();
        children.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(children)
    }

    async fn current_run(&self, chat_id: ChatId) -> Result<Option<RunInfo>, LineageError> {
        Ok(self
            .runs
            .iter()
            .filter(|r| r.chat_id == chat_id && r.status == RunStatus::Running)
            .max_by(|a, b| a.started_at.cmp(&b.started_at))
            .map(|r| r.value().clone()))
    }
}
