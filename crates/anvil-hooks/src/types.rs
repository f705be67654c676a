//! Hook points, invocation context, and outcomes.

use std::fmt;
use std::str::FromStr;

use anvil_core::{ChatId, RunId};
use serde::{Deserialize, Serialize};

use crate::errors::HookError;

/// Named lifecycle points handlers attach to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookPoint {
    /// A user message arrived.
    #[serde(rename = "chat.message")]
    ChatMessage,
    /// Messages are about to be sent to the model.
    #[serde(rename = "messages.transform")]
    MessagesTransform,
    /// A generic runtime event.
    #[serde(rename = "event")]
    Event,
    /// A tool is about to run.
    #[serde(rename = "tool.execute.before")]
    ToolExecuteBefore,
    /// A tool finished.
    #[serde(rename = "tool.execute.after")]
    ToolExecuteAfter,
    /// An agent step is about to start.
    #[serde(rename = "agent.step.before")]
    AgentStepBefore,
    /// An agent step finished.
    #[serde(rename = "agent.step.after")]
    AgentStepAfter,
}

impl HookPoint {
    /// Every point, in lifecycle order.
    pub const ALL: [HookPoint; 7] = [
        Self::ChatMessage,
        Self::MessagesTransform,
        Self::Event,
        Self::ToolExecuteBefore,
        Self::ToolExecuteAfter,
        Self::AgentStepBefore,
        Self::AgentStepAfter,
    ];

    /// Dotted name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatMessage => "chat.message",
            Self::MessagesTransform => "messages.transform",
            Self::Event => "event",
            Self::ToolExecuteBefore => "tool.execute.before",
            Self::ToolExecuteAfter => "tool.execute.after",
            Self::AgentStepBefore => "agent.step.before",
            Self::AgentStepAfter => "agent.step.after",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| HookError::failed(format!("unknown hook point: {s}")))
    }
}

/// Which runs a hook belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookScope {
    /// Tied to a single run.
    Run,
    /// Every run in a root chat session.
    Session,
    /// Every run.
    #[default]
    Global,
}

/// Context handed to every handler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookContext {
    /// Root chat of the run tree, as a string.
    pub session_id: String,
    /// Chat of the invoking agent.
    pub chat_id: ChatId,
    /// Agent name.
    pub agent: String,
    /// Working directory, if the caller supplied one.
    #[serde(default)]
    pub directory: String,
    /// Run being executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

impl HookContext {
    /// Context without a directory or run id.
    pub fn new(session_id: impl Into<String>, chat_id: ChatId, agent: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            chat_id,
            agent: agent.into(),
            directory: String::new(),
            run_id: None,
        }
    }
}

/// What a handler asks the dispatcher to do next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HookOutcome {
    /// Run the next handler.
    #[default]
    Continue,
    /// Skip the remaining handlers for this dispatch.
    Abort,
}

impl HookOutcome {
    /// Whether dispatch stopped early.
    pub fn is_abort(self) -> bool {
        self == Self::Abort
    }
}
