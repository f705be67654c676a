//! Agent runtimes: the handle the orchestrator drives, and the step loop
//! that implements it.

pub mod agent_loop;

use async_trait::async_trait;

use crate::errors::RuntimeError;
use crate::types::LoopResult;

pub use agent_loop::{AgentLoop, AgentLoopOpts, DEFAULT_MAX_STEPS, MAX_STEPS_NOTICE};

/// A runnable agent, as returned by a runtime factory.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run to completion on `prompt`.
    async fn run(&self, prompt: &str) -> Result<LoopResult, RuntimeError>;

    /// Transcript so far, including the step in flight.
    fn accumulated_text(&self) -> String;

    /// Request cancellation.
    fn abort(&self);
}
