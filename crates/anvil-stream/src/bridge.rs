//! Stream bridge: forwards parts to callbacks and writes the transcript.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::callbacks::StreamCallbacks;
use crate::errors::StreamError;
use crate::transcript::Transcript;
use crate::types::StreamPart;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Outcome of one [`StreamBridge::process_stream`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeResult {
    /// Transcript text written by this call.
    pub full_response_text: String,
    /// Whether any tool call was seen.
    pub has_tool_calls: bool,
}

/// Turns a model part stream into callback invocations and a well-formed
/// transcript.
///
/// Tool calls whose name is in the native id set are written with
/// `agent-tool*` tags; all others with `mcp-tool-*` tags.
pub struct StreamBridge {
    callbacks: Arc<dyn StreamCallbacks>,
    native_tool_ids: HashSet<String>,
    transcript: Transcript,
    in_think: bool,
    tool_calls: usize,
}

impl StreamBridge {
    /// Bridge writing to a fresh transcript.
    pub fn new(callbacks: Arc<dyn StreamCallbacks>, native_tool_ids: HashSet<String>) -> Self {
        Self {
            callbacks,
            native_tool_ids,
            transcript: Transcript::new(),
            in_think: false,
            tool_calls: 0,
        }
    }

    /// Append to `transcript` instead of a fresh buffer.
    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    /// Handle to the transcript being written.
    pub fn transcript(&self) -> Transcript {
        self.transcript.clone()
    }

    /// Transcript text so far.
    pub fn current_text(&self) -> String {
        self.transcript.snapshot()
    }

    /// Consume `stream` until it ends or `cancel` fires.
    ///
    /// Cancellation is checked before every part and while waiting for the
    /// next one; it stops iteration and returns what has accumulated. An
    /// `Err` item is reported through `on_error` and iteration continues.
    /// An open think block is closed before returning.
    pub async fn process_stream<S>(&mut self, stream: S, cancel: &CancellationToken) -> BridgeResult
    where
        S: Stream<Item = Result<StreamPart, StreamError>> + Send,
    {
        let start = self.transcript.len();
        let calls_before = self.tool_calls;
        let mut stream = std::pin::pin!(stream);

        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("stream cancelled");
                    break;
                }
                item = stream.next() => item,
            };
            let Some(item) = item else { break };
            if cancel.is_cancelled() {
                debug!("stream cancelled");
                break;
            }
            match item {
                Ok(part) => self.handle_part(part),
                Err(e) => {
                    debug!(error = %e, "stream item failed");
                    self.callbacks.on_error(&e);
                }
            }
        }

        self.close_think();
        BridgeResult {
            full_response_text: self.transcript.snapshot_from(start),
            has_tool_calls: self.tool_calls > calls_before,
        }
    }

    fn handle_part(&mut self, part: StreamPart) {
        match part {
            StreamPart::TextDelta { text } => {
                self.close_think();
                self.callbacks.on_text_delta(&text);
                self.transcript.push_str(&text);
            }
            StreamPart::ReasoningDelta { text } => {
                if !self.in_think {
                    self.transcript.push_str(THINK_OPEN);
                    self.in_think = true;
                }
                self.callbacks.on_reasoning_delta(&text);
                self.transcript.push_str(&text);
            }
            StreamPart::ToolCall {
                tool_name,
                tool_call_id,
                input,
            } => {
                self.close_think();
                self.tool_calls += 1;
                self.callbacks.on_tool_call(&tool_name, &tool_call_id, &input);
                let body = input.to_string();
                let block = if self.is_native(&tool_name) {
                    format!("<agent-tool name=\"{tool_name}\" id=\"{tool_call_id}\">\n{body}\n</agent-tool>\n")
                } else {
                    format!("<mcp-tool-call tool=\"{tool_name}\">\n{body}\n</mcp-tool-call>\n")
                };
                self.transcript.push_str(&block);
            }
            StreamPart::ToolResult {
                tool_name,
                tool_call_id,
                output,
            } => {
                self.close_think();
                let output = render_output(output);
                self.callbacks.on_tool_result(&tool_name, &tool_call_id, &output);
                let block = if self.is_native(&tool_name) {
                    format!(
                        "<agent-tool-result name=\"{tool_name}\" id=\"{tool_call_id}\">\n{output}\n</agent-tool-result>\n"
                    )
                } else {
                    format!("<mcp-tool-result tool=\"{tool_name}\">\n{output}\n</mcp-tool-result>\n")
                };
                self.transcript.push_str(&block);
            }
            StreamPart::ToolError {
                tool_name,
                tool_call_id,
                error,
            } => {
                self.close_think();
                self.callbacks.on_tool_error(&tool_name, &tool_call_id, &error);
                let block = if self.is_native(&tool_name) {
                    format!(
                        "<agent-tool-error name=\"{tool_name}\" id=\"{tool_call_id}\">\n{error}\n</agent-tool-error>\n"
                    )
                } else {
                    format!("<mcp-tool-error tool=\"{tool_name}\">\n{error}\n</mcp-tool-error>\n")
                };
                self.transcript.push_str(&block);
            }
            StreamPart::FinishStep { usage } => self.callbacks.on_step_finish(usage),
            StreamPart::Finish { total_usage } => self.callbacks.on_finish(total_usage),
            StreamPart::Error { error } => self.callbacks.on_error(&StreamError::Part(error)),
        }
    }

    fn is_native(&self, tool_name: &str) -> bool {
        self.native_tool_ids.contains(tool_name)
    }

    fn close_think(&mut self) {
        if self.in_think {
            self.transcript.push_str(THINK_CLOSE);
            self.in_think = false;
        }
    }
}

fn render_output(output: Value) -> String {
    match output {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
