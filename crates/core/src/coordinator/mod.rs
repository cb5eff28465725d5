//! Run coordinator: the pipeline state machine.
//!
//! - **Discovery**: one listing fetch per run
//! - **Download**: sequential, one target at a time
//! - **Extraction**: sequential, each file on the blocking pool
//!
//! Runs are single-flight. A trigger arriving while a run is active is
//! rejected, never queued.

mod runner;
mod types;

pub use runner::RunCoordinator;
pub use types::{
    CleanupSummary, CoordinatorError, CoordinatorStatus, RunRequest, RunState, TriggerError,
};
