//! Run identity.
//!
//! A [`RunContext`] is created once per agent invocation and never mutated
//! afterwards. Sub-agent contexts point back at their parent through
//! `parent_run_id`, a lookup key only; nothing here owns the parent.

use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, RunId};

/// Immutable identity of one agent invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    run_id: RunId,
    parent_run_id: Option<RunId>,
    root_chat_id: ChatId,
    chat_id: ChatId,
    agent_name: String,
    is_sub_agent: bool,
}

impl RunContext {
    /// Identity for a top-level agent run in `chat_id`.
    #[must_use]
    pub fn primary(chat_id: ChatId, agent_name: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            parent_run_id: None,
            root_chat_id: chat_id,
            chat_id,
            agent_name: agent_name.into(),
            is_sub_agent: false,
        }
    }

    /// Identity for a sub-agent delegated by `parent`.
    ///
    /// The child shares the parent's chat and root chat.
    #[must_use]
    pub fn sub_agent(parent: &RunContext, agent_name: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            parent_run_id: Some(parent.run_id.clone()),
            root_chat_id: parent.root_chat_id,
            chat_id: parent.chat_id,
            agent_name: agent_name.into(),
            is_sub_agent: true,
        }
    }

    /// Unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Id of the delegating run, if this is a sub-agent.
    #[must_use]
    pub fn parent_run_id(&self) -> Option<&RunId> {
        self.parent_run_id.as_ref()
    }

    /// Chat that started the whole delegation tree.
    #[must_use]
    pub fn root_chat_id(&self) -> ChatId {
        self.root_chat_id
    }

    /// Chat this run writes into.
    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Name of the agent definition being run.
    #[must_use]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Whether this run was delegated by another run.
    #[must_use]
    pub fn is_sub_agent(&self) -> bool {
        self.is_sub_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_has_no_parent() {
        let ctx = RunContext::primary(7, "build");
        assert!(ctx.parent_run_id().is_none());
        assert!(!ctx.is_sub_agent());
        assert_eq!(ctx.chat_id(), 7);
        assert_eq!(ctx.root_chat_id(), 7);
        assert_eq!(ctx.agent_name(), "build");
    }

    #[test]
    fn sub_agent_links_to_parent() {
        let parent = RunContext::primary(7, "build");
        let child = RunContext::sub_agent(&parent, "explore");
        assert_eq!(child.parent_run_id(), Some(parent.run_id()));
        assert!(child.is_sub_agent());
        assert_eq!(child.root_chat_id(), 7);
        assert_eq!(child.chat_id(), 7);
        assert_ne!(child.run_id(), parent.run_id());
    }

    #[test]
    fn grandchild_keeps_root_chat() {
        let root = RunContext::primary(3, "build");
        let child = RunContext::sub_agent(&root, "oracle");
        let grandchild = RunContext::sub_agent(&child, "librarian");
        assert_eq!(grandchild.parent_run_id(), Some(child.run_id()));
        assert_eq!(grandchild.root_chat_id(), 3);
    }

    #[test]
    fn serializes_camel_case() {
        let ctx = RunContext::primary(1, "build");
        let json = serde_json::to_value(&ctx).unwrap();
        assert!(json.get("runId").is_some());
        assert!(json.get("parentRunId").unwrap().is_null());
        assert_eq!(json["isSubAgent"], false);
    }
}
