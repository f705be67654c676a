//! Consent gating for risky tool invocations.

use anvil_settings::ConsentPolicy;
use serde_json::Value;
use tracing::{debug, warn};

use crate::traits::{AgentTool, ConsentDecision, ConsentRequest, RiskLevel, ToolContext};

/// Characters of compact JSON input shown in a consent prompt.
pub const INPUT_PREVIEW_CHARS: usize = 500;

/// Whether a tool of `risk` must be approved before it runs.
///
/// Interactive contexts prompt for dangerous tools only. Automated contexts
/// (no user present) pre-authorize every level.
pub fn needs_consent(policy: ConsentPolicy, risk: RiskLevel) -> bool {
    match policy {
        ConsentPolicy::Interactive => risk == RiskLevel::Dangerous,
        ConsentPolicy::Automated => false,
    }
}

/// Build the prompt shown before `tool` runs with `input`.
pub fn consent_request(tool: &dyn AgentTool, input: &Value) -> ConsentRequest {
    let json = input.to_string();
    ConsentRequest {
        tool_name: tool.id().to_owned(),
        tool_description: tool.description().to_owned(),
        risk_level: tool.risk_level(),
        input_preview: json.chars().take(INPUT_PREVIEW_CHARS).collect(),
    }
}

/// Ask the context's interaction handler, bounded by its consent timeout.
///
/// An unanswered prompt is a decline.
pub async fn request_consent(ctx: &ToolContext, request: ConsentRequest) -> ConsentDecision {
    let tool = request.tool_name.clone();
    match tokio::time::timeout(ctx.consent_timeout, ctx.interaction.ask_consent(request)).await {
        Ok(decision) => {
            debug!(tool_name = %tool, ?decision, "consent answered");
            decision
        }
        Err(_) => {
            warn!(
                tool_name = %tool,
                timeout_ms = u64::try_from(ctx.consent_timeout.as_millis()).unwrap_or(u64::MAX),
                "consent prompt timed out"
            );
            ConsentDecision::Decline
        }
    }
}
