//! Observer interface the bridge forwards stream events to.

use serde_json::Value;

use crate::errors::StreamError;
use crate::types::Usage;

/// Receives stream events in arrival order.
///
/// Every method defaults to a no-op so observers implement only what they
/// need.
pub trait StreamCallbacks: Send + Sync {
    /// Visible text arrived.
    fn on_text_delta(&self, _text: &str) {}

    /// Reasoning text arrived.
    fn on_reasoning_delta(&self, _text: &str) {}

    /// The model called a tool.
    fn on_tool_call(&self, _tool_name: &str, _tool_call_id: &str, _input: &Value) {}

    /// A tool returned; `output` is already rendered to text.
    fn on_tool_result(&self, _tool_name: &str, _tool_call_id: &str, _output: &str) {}

    /// A tool failed.
    fn on_tool_error(&self, _tool_name: &str, _tool_call_id: &str, _error: &str) {}

    /// A model step finished.
    fn on_step_finish(&self, _usage: Usage) {}

    /// The turn finished.
    fn on_finish(&self, _usage: Usage) {}

    /// The stream reported an error. Iteration continues.
    fn on_error(&self, _error: &StreamError) {}
}

/// Callbacks that ignore everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCallbacks;

impl StreamCallbacks for NoopCallbacks {}
