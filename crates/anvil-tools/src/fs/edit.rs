//! `edit` tool: one replace-engine rewrite of a file, with diff output.

use std::sync::Arc;

use anvil_patch::{replace_with_report, unified_diff};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{FileSystemOps, display_path, parse_input, read_existing, resolve_path, write_file};
use crate::errors::ToolError;
use crate::traits::{AgentTool, RiskLevel, ToolContext};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditInput {
    file_path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

/// Replaces `oldString` with `newString` in one file.
///
/// The match tolerates indentation and whitespace drift. An empty
/// `oldString` on a missing file creates it.
pub struct EditTool {
    fs: Arc<dyn FileSystemOps>,
}

impl EditTool {
    /// Create the tool over `fs`.
    pub fn new(fs: Arc<dyn FileSystemOps>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl AgentTool for EditTool {
    fn id(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing oldString with newString. Include enough surrounding \
         lines in oldString to identify a single location, or set replaceAll."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filePath": {"type": "string", "description": "Path to the file, relative to the app directory"},
                "oldString": {"type": "string", "description": "Text to replace"},
                "newString": {"type": "string", "description": "Replacement text"},
                "replaceAll": {"type": "boolean", "description": "Replace every occurrence (default false)"}
            },
            "required": ["filePath", "oldString", "newString"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Dangerous
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let input: EditInput = parse_input(input)?;
        if input.file_path.trim().is_empty() {
            return Err(ToolError::validation("filePath must not be empty"));
        }
        if input.old_string == input.new_string {
            return Err(ToolError::validation(
                "oldString and newString are identical; no changes would be made",
            ));
        }

        let path = resolve_path(&input.file_path, &ctx.app_path);
        let shown = display_path(&path, &ctx.app_path);
        let original = read_existing(self.fs.as_ref(), &path, input.old_string.is_empty()).await?;

        let report =
            replace_with_report(&original, &input.old_string, &input.new_string, input.replace_all)?;
        write_file(self.fs.as_ref(), &path, &report.content).await?;
        debug!(path = %shown, strategy = report.strategy.name(), count = report.count, "file edited");

        let noun = if report.count == 1 { "replacement" } else { "replacements" };
        let diff = unified_diff(&shown, &original, &report.content);
        Ok(Value::String(format!(
            "Edited {shown}: {} {noun} ({} match)\n{diff}",
            report.count, report.strategy
        )))
    }
}
