//! Per-run summaries written by the run coordinator.

mod sqlite;
mod store;
mod types;

pub use sqlite::*;
pub use store::*;
pub use types::*;
