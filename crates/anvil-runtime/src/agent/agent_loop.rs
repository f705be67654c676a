//! `AgentLoop`: the multi-step model loop behind every task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anvil_hooks::{HookPoint, RunHookRegistry};
use anvil_stream::{StreamBridge, StreamCallbacks, StreamError, Transcript, Usage};
use anvil_tools::{ToolContext, ToolRegistry, ToolSet};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::agent::AgentRuntime;
use crate::errors::RuntimeError;
use crate::model::{ModelClient, StepRequest};
use crate::types::LoopResult;

/// Step budget used when the configured budget is zero.
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// Appended to the conversation on the final step, when tools are withheld.
pub const MAX_STEPS_NOTICE: &str = "The step limit for this task has been reached and tools are \
     no longer available. Reply with a summary of what was done and what is left.";

/// Resets the running flag on drop.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Forwards to the caller's callbacks and keeps the step's usage.
struct UsageTally {
    inner: Arc<dyn StreamCallbacks>,
    steps: Mutex<Usage>,
    total: Mutex<Option<Usage>>,
}

impl UsageTally {
    fn new(inner: Arc<dyn StreamCallbacks>) -> Self {
        Self {
            inner,
            steps: Mutex::new(Usage::default()),
            total: Mutex::new(None),
        }
    }

    /// The `finish` total if one arrived, otherwise the sum of step usages.
    fn usage(&self) -> Usage {
        let total = *self.total.lock();
        total.unwrap_or_else(|| *self.steps.lock())
    }
}

impl StreamCallbacks for UsageTally {
    fn on_text_delta(&self, text: &str) {
        self.inner.on_text_delta(text);
    }
    fn on_reasoning_delta(&self, text: &str) {
        self.inner.on_reasoning_delta(text);
    }
    fn on_tool_call(&self, tool_name: &str, tool_call_id: &str, input: &Value) {
        self.inner.on_tool_call(tool_name, tool_call_id, input);
    }
    fn on_tool_result(&self, tool_name: &str, tool_call_id: &str, output: &str) {
        self.inner.on_tool_result(tool_name, tool_call_id, output);
    }
    fn on_tool_error(&self, tool_name: &str, tool_call_id: &str, error: &str) {
        self.inner.on_tool_error(tool_name, tool_call_id, error);
    }
    fn on_step_finish(&self, usage: Usage) {
        *self.steps.lock() += usage;
        self.inner.on_step_finish(usage);
    }
    fn on_finish(&self, usage: Usage) {
        *self.total.lock() = Some(usage);
        self.inner.on_finish(usage);
    }
    fn on_error(&self, error: &StreamError) {
        self.inner.on_error(error);
    }
}

/// Options for building an [`AgentLoop`].
pub struct AgentLoopOpts {
    /// Model client.
    pub model: Arc<dyn ModelClient>,
    /// Shared tool registry.
    pub tools: Arc<ToolRegistry>,
    /// Per-run tool context. Its cancellation token is the run's token.
    pub tool_context: ToolContext,
    /// Tool ids the agent may use; empty means every registered tool.
    pub tool_ids: Vec<String>,
    /// Per-run hook view, if hooks are enabled.
    pub hooks: Option<RunHookRegistry>,
    /// Stream observer.
    pub callbacks: Arc<dyn StreamCallbacks>,
    /// System prompt.
    pub system_prompt: String,
    /// Step budget; zero means [`DEFAULT_MAX_STEPS`].
    pub max_steps: u32,
}

/// Drives the model step by step until it stops asking for tools, the step
/// budget runs out, or the run is cancelled.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    tool_context: ToolContext,
    tool_ids: Vec<String>,
    hooks: Option<RunHookRegistry>,
    callbacks: Arc<dyn StreamCallbacks>,
    system_prompt: String,
    max_steps: u32,
    cancel: CancellationToken,
    transcript: Transcript,
    usage: Mutex<Usage>,
    step: AtomicU32,
    is_running: AtomicBool,
}

impl AgentLoop {
    /// Build a loop. Cancellation follows `opts.tool_context.cancellation`.
    pub fn new(opts: AgentLoopOpts) -> Self {
        let cancel = opts.tool_context.cancellation.clone();
        let max_steps = if opts.max_steps > 0 {
            opts.max_steps
        } else {
            DEFAULT_MAX_STEPS
        };
        Self {
            model: opts.model,
            tools: opts.tools,
            tool_context: opts.tool_context,
            tool_ids: opts.tool_ids,
            hooks: opts.hooks,
            callbacks: opts.callbacks,
            system_prompt: opts.system_prompt,
            max_steps,
            cancel,
            transcript: Transcript::new(),
            usage: Mutex::new(Usage::default()),
            step: AtomicU32::new(0),
            is_running: AtomicBool::new(false),
        }
    }

    /// Steps started so far.
    pub fn current_step(&self) -> u32 {
        self.step.load(Ordering::Relaxed)
    }

    /// Step budget in effect.
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Token usage summed over finished steps.
    pub fn cumulative_usage(&self) -> Usage {
        *self.usage.lock()
    }

    async fn fire(
        &self,
        point: HookPoint,
        input: &Value,
        output: &mut Value,
    ) -> Result<(), RuntimeError> {
        if let Some(hooks) = &self.hooks {
            let dir = self.tool_context.app_path.to_string_lossy();
            let _ = hooks.execute(point, input, output, Some(dir.as_ref())).await?;
        }
        Ok(())
    }

    fn resolve_tools(&self, is_last_step: bool) -> ToolSet {
        if is_last_step {
            ToolSet::empty()
        } else {
            self.tools.resolve_tools(&self.tool_ids, &self.tool_context)
        }
    }

    #[instrument(skip(self, messages), fields(chat_id = self.tool_context.chat_id))]
    async fn run_step(&self, step: u32, messages: &mut Vec<Value>) -> Result<StepOutcome, RuntimeError> {
        let is_last_step = step >= self.max_steps;
        debug!(step, max_steps = self.max_steps, is_last_step, "agent step");

        let mut before = json!({ "messages": std::mem::take(messages) });
        self.fire(
            HookPoint::AgentStepBefore,
            &json!({ "step": step, "maxSteps": self.max_steps, "isLastStep": is_last_step }),
            &mut before,
        )
        .await?;
        *messages = take_messages(before);

        let tools = self.resolve_tools(is_last_step);

        let mut outgoing = messages.clone();
        if is_last_step {
            outgoing.push(json!({ "role": "assistant", "content": MAX_STEPS_NOTICE }));
        }
        let mut transform = json!({ "messages": outgoing });
        self.fire(HookPoint::MessagesTransform, &json!({}), &mut transform).await?;

        let request = StepRequest {
            step,
            max_steps: self.max_steps,
            is_last_step,
            system_prompt: self.system_prompt.clone(),
            messages: Value::Array(take_messages(transform)),
            tools,
            cancel: self.cancel.clone(),
        };
        let stream = self.model.stream_step(request).await?;

        let tally = Arc::new(UsageTally::new(self.callbacks.clone()));
        let mut bridge = StreamBridge::new(tally.clone(), self.tools.native_tool_ids())
            .with_transcript(self.transcript.clone());
        let result = bridge.process_stream(stream, &self.cancel).await;

        let step_usage = tally.usage();
        let tokens = {
            let mut usage = self.usage.lock();
            *usage += step_usage;
            *usage
        };
        messages.push(json!({ "role": "assistant", "content": result.full_response_text }));

        let finish_reason = if result.has_tool_calls { "tool-calls" } else { "stop" };
        let mut after = json!({ "responseText": result.full_response_text });
        self.fire(
            HookPoint::AgentStepAfter,
            &json!({ "step": step, "finishReason": finish_reason, "tokens": tokens }),
            &mut after,
        )
        .await?;

        if self.cancel.is_cancelled() {
            return Ok(StepOutcome::Exit(LoopResult::Aborted));
        }
        if is_last_step {
            return Ok(StepOutcome::Exit(LoopResult::MaxSteps));
        }
        if !result.has_tool_calls {
            return Ok(StepOutcome::Exit(LoopResult::Completed));
        }
        Ok(StepOutcome::Continue)
    }
}

enum StepOutcome {
    Continue,
    Exit(LoopResult),
}

fn take_messages(mut holder: Value) -> Vec<Value> {
    match holder.get_mut("messages").map(Value::take) {
        Some(Value::Array(list)) => list,
        _ => Vec::new(),
    }
}

#[async_trait]
impl AgentRuntime for AgentLoop {
    async fn run(&self, prompt: &str) -> Result<LoopResult, RuntimeError> {
        let Some(_guard) = RunGuard::new(&self.is_running) else {
            return Err(RuntimeError::Internal("agent loop is already running".into()));
        };

        let mut messages = vec![json!({ "role": "user", "content": prompt })];
        loop {
            let step = self.step.fetch_add(1, Ordering::Relaxed) + 1;
            match self.run_step(step, &mut messages).await? {
                StepOutcome::Continue => debug!(step, "tool calls, continuing"),
                StepOutcome::Exit(result) => {
                    info!(step, %result, "agent loop finished");
                    return Ok(result);
                }
            }
        }
    }

    fn accumulated_text(&self) -> String {
        self.transcript.snapshot()
    }

    fn abort(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for AgentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLoop")
            .field("step", &self.current_step())
            .field("max_steps", &self.max_steps)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
