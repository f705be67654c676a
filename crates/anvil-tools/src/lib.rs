//! # anvil-tools
//!
//! Tools the model can call, and the registry that gates them.
//!
//! - [`AgentTool`]: the trait every tool implements
//! - [`ToolRegistry`]: id → tool map; [`ToolRegistry::resolve_tools`] binds a
//!   turn's [`ToolContext`] into a [`ToolSet`] whose tools check cancellation
//!   and consent before running
//! - [`fs`]: native `edit`, `multiedit` and `apply_patch` tools over the
//!   replace engine

#![deny(unsafe_code)]

pub mod consent;
pub mod errors;
pub mod fs;
pub mod registry;
pub mod traits;

pub use consent::needs_consent;
pub use errors::ToolError;
pub use fs::{FileSystemOps, RealFs, native_tools};
pub use registry::{BoundTool, ToolRegistry, ToolSet};
pub use traits::{
    AgentTool, ConsentDecision, ConsentRequest, InteractionHandler, NoInteraction, Question,
    QuestionAnswer, QuestionOption, RiskLevel, ToolContext,
};
