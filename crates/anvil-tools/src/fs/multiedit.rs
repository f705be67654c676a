//! `multiedit` tool: several sequential edits of one file, written once.

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
struct EditOp {
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiEditInput {
    file_path: String,
    edits: Vec<EditOp>,
}

/// Applies edits in order, each against the result of the previous one.
///
/// If any edit fails the file is left untouched.
pub struct MultiEditTool {
    fs: Arc<dyn FileSystemOps>,
}

impl MultiEditTool {
    /// Create the tool over `fs`.
    pub fn new(fs: Arc<dyn FileSystemOps>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl AgentTool for MultiEditTool {
    fn id(&self) -> &str {
        "multiedit"
    }

    fn description(&self) -> &str {
        "Apply several edits to one file in order. Each edit sees the result of the \
         previous one; if any edit fails, none are applied."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filePath": {"type": "string", "description": "Path to the file, relative to the app directory"},
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "oldString": {"type": "string"},
                            "newString": {"type": "string"},
                            "replaceAll": {"type": "boolean"}
                        },
                        "required": ["oldString", "newString"]
                    }
                }
            },
            "required": ["filePath", "edits"]
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Dangerous
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let input: MultiEditInput = parse_input(input)?;
        if input.edits.is_empty() {
            return Err(ToolError::validation("edits must contain at least one edit"));
        }

        let path = resolve_path(&input.file_path, &ctx.app_path);
        let shown = display_path(&path, &ctx.app_path);
        let creates = input.edits[0].old_string.is_empty();
        let original = read_existing(self.fs.as_ref(), &path, creates).await?;

        let mut content = original.clone();
        let mut total = 0;
        for (i, op) in input.edits.iter().enumerate() {
            let report = replace_with_report(&content, &op.old_string, &op.new_string, op.replace_all)
                .map_err(|source| ToolError::Edit { index: i + 1, source })?;
            total += report.count;
            content = report.content;
        }

        write_file(self.fs.as_ref(), &path, &content).await?;
        debug!(path = %shown, edits = input.edits.len(), replacements = total, "file multi-edited");

        let diff = unified_diff(&shown, &original, &content);
        Ok(Value::String(format!(
            "Applied {} edits to {shown} ({total} replacements)\n{diff}",
            input.edits.len()
        )))
    }
}
