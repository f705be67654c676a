//! Stream part records produced by the model layer.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::StreamError;

/// Token counts for one step or a whole turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl Usage {
    /// Sum of input and output tokens.
    pub fn total(self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// One tagged record of a model's output stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamPart {
    /// Visible answer text.
    TextDelta {
        /// Appended text.
        text: String,
    },
    /// Model reasoning text.
    ReasoningDelta {
        /// Appended text.
        text: String,
    },
    /// The model invoked a tool.
    ToolCall {
        /// Tool id.
        tool_name: String,
        /// Call id, unique within the turn.
        tool_call_id: String,
        /// Tool input.
        input: Value,
    },
    /// A tool returned.
    ToolResult {
        /// Tool id.
        tool_name: String,
        /// Call id.
        tool_call_id: String,
        /// Tool output; non-strings are rendered as compact JSON.
        output: Value,
    },
    /// A tool failed.
    ToolError {
        /// Tool id.
        tool_name: String,
        /// Call id.
        tool_call_id: String,
        /// Failure message.
        error: String,
    },
    /// One model step finished.
    FinishStep {
        /// Usage for the step.
        #[serde(default)]
        usage: Usage,
    },
    /// The whole turn finished.
    Finish {
        /// Cumulative usage.
        #[serde(default)]
        total_usage: Usage,
    },
    /// The model layer reported an error.
    Error {
        /// Error message.
        error: String,
    },
}

/// Boxed stream of parts as produced by a model client.
pub type PartStream = Pin<Box<dyn Stream<Item = Result<StreamPart, StreamError>> + Send>>;
