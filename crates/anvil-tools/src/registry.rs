//! Tool registry: id → tool map, resolved per turn into a gated [`ToolSet`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::consent::{consent_request, needs_consent, request_consent};
use crate::errors::ToolError;
use crate::traits::{AgentTool, RiskLevel, ToolContext};

/// Registered tools, iterated in registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Fails if the id is taken.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) -> Result<(), ToolError> {
        let id = tool.id().to_owned();
        if self.tools.contains_key(&id) {
            return Err(ToolError::DuplicateTool { id });
        }
        debug!(tool_name = %id, risk = %tool.risk_level(), "tool registered");
        self.order.push(id.clone());
        let _ = self.tools.insert(id, tool);
        Ok(())
    }

    /// Register several tools, stopping at the first collision.
    pub fn register_all(
        &mut self,
        tools: impl IntoIterator<Item = Arc<dyn AgentTool>>,
    ) -> Result<(), ToolError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Look up a tool by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(id).cloned()
    }

    /// Whether a tool with the given id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// All tools in registration order.
    pub fn list(&self) -> Vec<Arc<dyn AgentTool>> {
        self.order
            .iter()
            .filter_map(|id| self.tools.get(id).cloned())
            .collect()
    }

    /// All ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// The id set the stream bridge treats as native (as opposed to
    /// externally provided) tools.
    pub fn native_tool_ids(&self) -> HashSet<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Bind tools to `ctx` for one turn.
    ///
    /// An empty `ids` binds every registered tool. Unknown ids are skipped.
    pub fn resolve_tools(&self, ids: &[String], ctx: &ToolContext) -> ToolSet {
        let ctx = Arc::new(ctx.clone());
        let wanted: Vec<&str> = if ids.is_empty() {
            self.order.iter().map(String::as_str).collect()
        } else {
            ids.iter().map(String::as_str).collect()
        };

        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(wanted.len());
        for id in wanted {
            let Some(tool) = self.tools.get(id) else {
                debug!(tool_name = id, "unknown tool id skipped");
                continue;
            };
            if seen.insert(id) {
                tools.push(BoundTool {
                    tool: Arc::clone(tool),
                    ctx: Arc::clone(&ctx),
                });
            }
        }
        ToolSet { tools }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool bound to one turn's context.
#[derive(Clone)]
pub struct BoundTool {
    tool: Arc<dyn AgentTool>,
    ctx: Arc<ToolContext>,
}

impl BoundTool {
    /// Tool id.
    pub fn id(&self) -> &str {
        self.tool.id()
    }

    /// Tool description.
    pub fn description(&self) -> &str {
        self.tool.description()
    }

    /// Input schema.
    pub fn input_schema(&self) -> Value {
        self.tool.input_schema()
    }

    /// Declared risk.
    pub fn risk_level(&self) -> RiskLevel {
        self.tool.risk_level()
    }

    /// Run the tool through the turn's gates.
    ///
    /// A cancelled turn fails with [`ToolError::Aborted`] before anything
    /// else happens. A tool that needs consent under the context's policy is
    /// run only after the user approves. The body's result is returned as is.
    pub async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let id = self.tool.id();
        if self.ctx.is_cancelled() {
            debug!(tool_name = id, "tool execution aborted before start");
            return Err(ToolError::Aborted { tool: id.to_owned() });
        }

        if needs_consent(self.ctx.consent_policy, self.tool.risk_level()) {
            let request = consent_request(self.tool.as_ref(), &input);
            let decision = request_consent(&self.ctx, request).await;
            if !decision.is_approved() {
                return Err(ToolError::ConsentDenied { tool: id.to_owned() });
            }
        }

        self.tool.execute(input, &self.ctx).await
    }
}

/// The closed set of tools available to one turn.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<BoundTool>,
}

impl ToolSet {
    /// An empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a bound tool by id.
    pub fn get(&self, id: &str) -> Option<&BoundTool> {
        self.tools.iter().find(|t| t.id() == id)
    }

    /// Bound ids in resolution order.
    pub fn ids(&self) -> Vec<&str> {
        self.tools.iter().map(BoundTool::id).collect()
    }

    /// Iterate the bound tools.
    pub fn iter(&self) -> impl Iterator<Item = &BoundTool> {
        self.tools.iter()
    }

    /// Number of bound tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is bound.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
