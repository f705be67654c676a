//! # anvil-hooks
//!
//! Lifecycle hooks for the agent runtime.
//!
//! Policies attach to named [`HookPoint`]s through the shared
//! [`HookRegistry`]. Handlers run sequentially in registration order and
//! share a mutable output value, so a later hook sees what an earlier one
//! changed. A failing handler stops dispatch; wrap it with [`isolated`] to
//! log and continue instead.
//!
//! Each run dispatches through a [`RunHookRegistry`], which supplies the
//! [`HookContext`] and filters hooks that should not fire for sub-agents.

#![deny(unsafe_code)]

pub mod errors;
pub mod handler;
pub mod registry;
pub mod run_registry;
pub mod types;

pub use errors::HookError;
pub use handler::{HookHandler, from_fn, isolated};
pub use registry::HookRegistry;
pub use run_registry::{PRIMARY_ONLY_HOOKS, RunHookRegistry, ScopePredicate};
pub use types::{HookContext, HookOutcome, HookPoint, HookScope};
