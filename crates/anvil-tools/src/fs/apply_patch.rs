//! `apply_patch` tool: the `*** Begin Patch` envelope over the app directory.

use std::path::Path;

use anvil_patch::{AffectedPaths, apply_hunks, parse_patch};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{display_path, parse_input};
use crate::errors::ToolError;
use crate::traits::{AgentTool, RiskLevel, ToolContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyPatchInput {
    patch_text: String,
}

/// Adds, updates, moves, and deletes files from one patch envelope.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApplyPatchTool;

fn summarize(affected: &AffectedPaths, app_path: &Path) -> String {
    let mut out = format!(
        "Applied patch: {} added, {} modified, {} deleted",
        affected.added.len(),
        affected.modified.len(),
        affected.deleted.len()
    );
    let groups = [("A", &affected.added), ("M", &affected.modified), ("D", &affected.deleted)];
    for (tag, paths) in groups {
        for p in paths {
            out.push('\n');
            out.push_str(tag);
            out.push(' ');
            out.push_str(&display_path(p, app_path));
        }
    }
    out
}

#[async_trait]
impl AgentTool for ApplyPatchTool {
    fn id(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a patch in the *** Begin Patch / *** End Patch format. Supports Add File, \
         Delete File and Update File (with optional Move to) sections."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patchText": {"type": "string", "description": "The full patch envelope"}
            },
            "required": ["patchText"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Dangerous
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let input: ApplyPatchInput = parse_input(input)?;
        let hunks = parse_patch(&input.patch_text)?;
        let affected = apply_hunks(&hunks, &ctx.app_path).await?;
        debug!(
            added = affected.added.len(),
            modified = affected.modified.len(),
            deleted = affected.deleted.len(),
            "patch applied"
        );
        Ok(Value::String(summarize(&affected, &ctx.app_path)))
    }
}
