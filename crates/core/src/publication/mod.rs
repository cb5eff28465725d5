//! Publications, their acquired files and the records parsed out of them.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqlitePublicationStore;
pub use store::*;
pub use types::*;
