//! # anvil-core
//!
//! Foundation types shared by every Anvil runtime crate.
//!
//! - **Branded IDs**: [`RunId`](ids::RunId) and [`TaskId`](ids::TaskId) as
//!   newtypes so a task id can never be passed where a run id is expected
//! - **Run identity**: [`RunContext`](run_context::RunContext), the immutable
//!   identity record created once per agent invocation
//! - **Lineage**: [`RunLineage`](lineage::RunLineage), the persistence seam for
//!   parent/child run queries, plus an in-memory implementation
//! - **Logging**: [`init_subscriber`](logging::init_subscriber) for the
//!   `tracing` stderr subscriber

#![deny(unsafe_code)]

pub mod ids;
pub mod lineage;
pub mod logging;
pub mod run_context;

pub use ids::{ChatId, RunId, TaskId};
pub use lineage::{InMemoryRunLineage, LineageError, RunInfo, RunLineage, RunStatus};
pub use run_context::RunContext;
