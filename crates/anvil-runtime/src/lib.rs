//! # anvil-runtime
//!
//! The top of the agent runtime.
//!
//! - [`AgentLoop`](agent::AgentLoop) drives a [`ModelClient`] step by step:
//!   lifecycle hooks around each step, tools resolved per step and withheld
//!   on the last one, and every step streamed through a fresh
//!   [`StreamBridge`](anvil_stream::StreamBridge) into one shared transcript.
//! - [`BackgroundOrchestrator`](orchestrator::BackgroundOrchestrator) runs
//!   agents as tracked tasks with run identity, parent-derived cancellation,
//!   provider/model concurrency slots, and stale-task pruning.

#![deny(unsafe_code)]

pub mod agent;
pub mod errors;
pub mod model;
pub mod orchestrator;
pub mod types;

pub use agent::{AgentLoop, AgentLoopOpts, AgentRuntime};
pub use errors::RuntimeError;
pub use model::{ModelClient, StepRequest};
pub use orchestrator::{
    BackgroundOrchestrator, ConcurrencyManager, ConcurrencyStatus, PruneReport, RuntimeFactory,
    SpawnParams,
};
pub use types::{LoopResult, TaskOutput, TaskStatus};
