//! The model-invocation seam.
//!
//! The runtime does not speak any provider's wire protocol. A
//! [`ModelClient`] turns one [`StepRequest`] into a stream of
//! [`StreamPart`](anvil_stream::StreamPart)s; when the model calls a tool,
//! the client executes it through the request's [`ToolSet`] and emits the
//! matching result or error part.

use async_trait::async_trait;
use anvil_stream::{PartStream, StreamError};
use anvil_tools::ToolSet;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Everything the model needs for one step.
#[derive(Clone)]
pub struct StepRequest {
    /// 1-based step number.
    pub step: u32,
    /// Step budget for the run.
    pub max_steps: u32,
    /// Whether this is the final step; no tools are offered.
    pub is_last_step: bool,
    /// System prompt.
    pub system_prompt: String,
    /// Conversation so far, after `messages.transform` hooks.
    pub messages: Value,
    /// Tools the model may call this step.
    pub tools: ToolSet,
    /// Run cancellation.
    pub cancel: CancellationToken,
}

/// Produces a model output stream for a step.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider id, used for concurrency accounting.
    fn provider(&self) -> &str;

    /// Model id.
    fn model_id(&self) -> &str;

    /// Open the output stream for `request`.
    async fn stream_step(&self, request: StepRequest) -> Result<PartStream, StreamError>;
}

impl std::fmt::Debug for StepRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRequest")
            .field("step", &self.step)
            .field("max_steps", &self.max_steps)
            .field("is_last_step", &self.is_last_step)
            .field("tools", &self.tools.ids())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for dyn ModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider())
            .field("model", &self.model_id())
            .finish()
    }
}
