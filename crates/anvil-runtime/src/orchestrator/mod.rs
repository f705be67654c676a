//! Task orchestration: concurrency slots, task records, and the
//! background orchestrator.

pub mod background;
pub mod concurrency;
pub mod task;

pub use background::{BackgroundOrchestrator, PruneReport, STEP_BUDGET_EXHAUSTED};
pub use concurrency::{ConcurrencyManager, ConcurrencyStatus, SlotPermit};
pub use task::{
    ABORTED_BEFORE_START, RuntimeFactory, SpawnParams, TASK_CANCELLED, TASK_STALE,
};
