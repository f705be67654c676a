//! Per-run view over the shared hook registry.
//!
//! Each agent run gets its own [`RunHookRegistry`] built from its
//! [`RunContext`]. The view derives the [`HookContext`] once and filters the
//! shared catalog by scope and per-hook predicates.

use std::collections::HashMap;
use std::sync::Arc;

use anvil_core::RunContext;
use serde_json::Value;
use tracing::debug;

use crate::errors::HookError;
use crate::registry::HookRegistry;
use crate::types::{HookContext, HookOutcome, HookPoint, HookScope};

/// Decides whether a hook fires for a run.
pub type ScopePredicate = Arc<dyn Fn(&RunContext) -> bool + Send + Sync>;

/// Hooks that drive a primary agent's own loop and must not fire for
/// sub-agents.
pub const PRIMARY_ONLY_HOOKS: [&str; 4] = [
    "ralph-loop",
    "todo-continuation",
    "boulder-state",
    "edit-error-recovery",
];

/// Scope filter applied when a hook has no override. Every scope currently
/// admits every run.
fn scope_admits(scope: HookScope, _run: &RunContext) -> bool {
    match scope {
        HookScope::Run | HookScope::Session | HookScope::Global => true,
    }
}

/// The shared registry seen through one run.
pub struct RunHookRegistry {
    catalog: Arc<HookRegistry>,
    run: RunContext,
    hook_ctx: HookContext,
    overrides: HashMap<String, ScopePredicate>,
}

impl RunHookRegistry {
    /// View without overrides.
    pub fn new(catalog: Arc<HookRegistry>, run: RunContext) -> Self {
        let hook_ctx = HookContext {
            session_id: run.root_chat_id().to_string(),
            chat_id: run.chat_id(),
            agent: run.agent_name().to_owned(),
            directory: String::new(),
            run_id: Some(run.run_id().clone()),
        };
        Self {
            catalog,
            run,
            hook_ctx,
            overrides: HashMap::new(),
        }
    }

    /// View with [`PRIMARY_ONLY_HOOKS`] excluded for sub-agents.
    pub fn for_run(catalog: Arc<HookRegistry>, run: RunContext) -> Self {
        let mut view = Self::new(catalog, run);
        for name in PRIMARY_ONLY_HOOKS {
            view.add_override(name, Arc::new(|run: &RunContext| !run.is_sub_agent()));
        }
        view
    }

    /// Replace the scope decision for one hook name.
    pub fn add_override(&mut self, hook_name: impl Into<String>, predicate: ScopePredicate) {
        let _ = self.overrides.insert(hook_name.into(), predicate);
    }

    /// Context handed to handlers, without a directory.
    pub fn hook_context(&self) -> &HookContext {
        &self.hook_ctx
    }

    /// The run this view belongs to.
    pub fn run_context(&self) -> &RunContext {
        &self.run
    }

    /// The shared registry.
    pub fn catalog(&self) -> &Arc<HookRegistry> {
        &self.catalog
    }

    /// Whether a hook with `name` and `scope` fires for this run.
    pub fn admits(&self, name: &str, scope: HookScope) -> bool {
        match self.overrides.get(name) {
            Some(predicate) => predicate(&self.run),
            None => scope_admits(scope, &self.run),
        }
    }

    /// Dispatch `point` to the hooks this run admits.
    ///
    /// `directory`, if given, fills the context's working directory. The
    /// run id always comes from this run.
    pub async fn execute(
        &self,
        point: HookPoint,
        input: &Value,
        output: &mut Value,
        directory: Option<&str>,
    ) -> Result<HookOutcome, HookError> {
        let mut ctx = self.hook_ctx.clone();
        if let Some(dir) = directory {
            dir.clone_into(&mut ctx.directory);
        }
        let outcome = self
            .catalog
            .dispatch(point, input, output, &ctx, |entry| {
                self.admits(&entry.name, entry.scope)
            })
            .await?;
        if outcome.is_abort() {
            debug!(point = %point, run_id = %self.run.run_id(), "run hook dispatch aborted");
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for RunHookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHookRegistry")
            .field("run_id", self.run.run_id())
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}
