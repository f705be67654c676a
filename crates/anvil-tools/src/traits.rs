//! Core tool traits and the per-turn execution context.
//!
//! Every tool implements [`AgentTool`]. Tools that need a user (consent
//! prompts, structured questions) reach one through the
//! [`InteractionHandler`] carried by [`ToolContext`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anvil_core::ChatId;
use anvil_settings::{ConsentPolicy, ToolSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::ToolError;

// ─────────────────────────────────────────────────────────────────────────────
// Risk
// ─────────────────────────────────────────────────────────────────────────────

/// A tool's declared potential for harmful side effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Read-only or otherwise harmless.
    Safe,
    /// Side effects that are easy to undo.
    Moderate,
    /// Writes files, runs commands, or reaches external systems.
    Dangerous,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Moderate => write!(f, "moderate"),
            Self::Dangerous => write!(f, "dangerous"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User interaction
// ─────────────────────────────────────────────────────────────────────────────

/// What the user is shown before a gated tool runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    /// Tool id.
    pub tool_name: String,
    /// Tool description.
    pub tool_description: String,
    /// Declared risk.
    pub risk_level: RiskLevel,
    /// Leading slice of the compact JSON input.
    pub input_preview: String,
}

/// The user's answer to a [`ConsentRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentDecision {
    /// Run this invocation.
    AcceptOnce,
    /// Run this invocation; the handler may remember the choice for the tool.
    AcceptAlways,
    /// Do not run.
    Decline,
}

impl ConsentDecision {
    /// Whether the tool may run.
    pub fn is_approved(self) -> bool {
        !matches!(self, Self::Decline)
    }
}

/// One option of a [`Question`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    /// Short label shown on the choice.
    pub label: String,
    /// Longer explanation.
    #[serde(default)]
    pub description: String,
}

/// A multiple-choice question posed to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The full question.
    pub question: String,
    /// Short header chip.
    #[serde(default)]
    pub header: String,
    /// Choices.
    pub options: Vec<QuestionOption>,
    /// Whether several options may be selected.
    #[serde(default)]
    pub multiple: bool,
}

/// The user's answer to one [`Question`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    /// The question text this answers.
    pub question: String,
    /// Labels of the chosen options.
    pub selected_options: Vec<String>,
}

/// The UI collaborator that answers consent prompts and questions.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    /// Ask whether a gated tool may run.
    async fn ask_consent(&self, request: ConsentRequest) -> ConsentDecision;

    /// Ask one or more multiple-choice questions.
    async fn ask_question(&self, questions: Vec<Question>) -> Result<Vec<QuestionAnswer>, ToolError>;
}

/// Handler for contexts with no user attached: declines consent and
/// refuses questions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInteraction;

#[async_trait]
impl InteractionHandler for NoInteraction {
    async fn ask_consent(&self, _request: ConsentRequest) -> ConsentDecision {
        ConsentDecision::Decline
    }

    async fn ask_question(&self, _questions: Vec<Question>) -> Result<Vec<QuestionAnswer>, ToolError> {
        Err(ToolError::Internal("no user is attached to answer questions".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ToolContext
// ─────────────────────────────────────────────────────────────────────────────

/// Context passed to every tool execution.
#[derive(Clone)]
pub struct ToolContext {
    /// Root chat of the run tree.
    pub session_id: ChatId,
    /// Chat the invoking agent belongs to.
    pub chat_id: ChatId,
    /// Directory relative paths resolve against.
    pub app_path: PathBuf,
    /// Turn cancellation.
    pub cancellation: CancellationToken,
    /// Consent and question collaborator.
    pub interaction: Arc<dyn InteractionHandler>,
    /// Name of the event that triggered the turn, if any.
    pub caller_event: Option<String>,
    /// Which risk levels prompt for consent.
    pub consent_policy: ConsentPolicy,
    /// Upper bound on an unanswered consent prompt.
    pub consent_timeout: Duration,
}

impl ToolContext {
    /// Context with an interactive policy and a 60 second consent timeout.
    pub fn new(
        chat_id: ChatId,
        app_path: impl Into<PathBuf>,
        cancellation: CancellationToken,
        interaction: Arc<dyn InteractionHandler>,
    ) -> Self {
        Self {
            session_id: chat_id,
            chat_id,
            app_path: app_path.into(),
            cancellation,
            interaction,
            caller_event: None,
            consent_policy: ConsentPolicy::Interactive,
            consent_timeout: Duration::from_secs(60),
        }
    }

    /// Set the root chat id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: ChatId) -> Self {
        self.session_id = session_id;
        self
    }

    /// Set the triggering event name.
    #[must_use]
    pub fn with_caller_event(mut self, event: impl Into<String>) -> Self {
        self.caller_event = Some(event.into());
        self
    }

    /// Set the consent policy.
    #[must_use]
    pub fn with_consent_policy(mut self, policy: ConsentPolicy) -> Self {
        self.consent_policy = policy;
        self
    }

    /// Apply the policy and timeout from settings.
    #[must_use]
    pub fn with_settings(mut self, settings: &ToolSettings) -> Self {
        self.consent_policy = settings.consent_policy;
        self.consent_timeout = Duration::from_millis(settings.consent_timeout_ms);
        self
    }

    /// Whether the turn has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("chat_id", &self.chat_id)
            .field("app_path", &self.app_path)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("caller_event", &self.caller_event)
            .field("consent_policy", &self.consent_policy)
            .field("consent_timeout", &self.consent_timeout)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentTool
// ─────────────────────────────────────────────────────────────────────────────

/// A tool the model can invoke by id.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Tool id, the exact string the model uses.
    fn id(&self) -> &str;

    /// Description sent to the model and shown in consent prompts.
    fn description(&self) -> &str;

    /// JSON Schema of the input object.
    fn input_schema(&self) -> Value;

    /// Declared risk.
    fn risk_level(&self) -> RiskLevel;

    /// Run the tool body.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_serde() {
        assert_eq!(serde_json::to_value(RiskLevel::Dangerous).unwrap(), "dangerous");
        let r: RiskLevel = serde_json::from_value(Value::from("safe")).unwrap();
        assert_eq!(r, RiskLevel::Safe);
        assert_eq!(RiskLevel::Moderate.to_string(), "moderate");
    }

    #[test]
    fn consent_request_is_camel_case() {
        let req = ConsentRequest {
            tool_name: "edit".into(),
            tool_description: "Edit a file".into(),
            risk_level: RiskLevel::Dangerous,
            input_preview: "{}".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["toolName"], "edit");
        assert_eq!(json["riskLevel"], "dangerous");
        assert_eq!(json["inputPreview"], "{}");
    }

    #[test]
    fn decision_approval() {
        assert!(ConsentDecision::AcceptOnce.is_approved());
        assert!(ConsentDecision::AcceptAlways.is_approved());
        assert!(!ConsentDecision::Decline.is_approved());
    }

    #[test]
    fn question_defaults() {
        let q: Question = serde_json::from_value(serde_json::json!({
            "question": "Which?",
            "options": [{"label": "A"}]
        }))
        .unwrap();
        assert!(!q.multiple);
        assert!(q.header.is_empty());
        assert_eq!(q.options[0].label, "A");
    }

    #[test]
    fn context_builders() {
        let settings = ToolSettings {
            consent_policy: ConsentPolicy::Automated,
            consent_timeout_ms: 1500,
        };
        let ctx = ToolContext::new(7, "/app", CancellationToken::new(), Arc::new(NoInteraction))
            .with_session_id(1)
            .with_caller_event("chat.message")
            .with_settings(&settings);
        assert_eq!(ctx.session_id, 1);
        assert_eq!(ctx.chat_id, 7);
        assert_eq!(ctx.caller_event.as_deref(), Some("chat.message"));
        assert_eq!(ctx.consent_policy, ConsentPolicy::Automated);
        assert_eq!(ctx.consent_timeout, Duration::from_millis(1500));
        assert!(!ctx.is_cancelled());
        assert!(format!("{ctx:?}").contains("ToolContext"));
    }

    #[tokio::test]
    async fn no_interaction_declines() {
        let handler = NoInteraction;
        let req = ConsentRequest {
            tool_name: "x".into(),
            tool_description: String::new(),
            risk_level: RiskLevel::Dangerous,
            input_preview: String::new(),
        };
        assert_eq!(handler.ask_consent(req).await, ConsentDecision::Decline);
        assert!(handler.ask_question(vec![]).await.is_err());
    }
}
