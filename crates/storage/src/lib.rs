//! Storage seams for Wayfarer's aggregates and a concurrent in-memory
//! implementation.
//!
//! Each aggregate gets a narrow async trait; [`Storage`] bundles them for
//! `Arc<dyn Storage>` app state. The in-memory backend mirrors the
//! relational layout (unique keys, cascades, a radius predicate on POIs)
//! so a SQL-backed implementation can slot in without touching callers.

mod memory;
mod traits;

pub use memory::MemoryStorage;
pub use traits::{
    ChatStore, NewMessage, PoiStore, PromptStore, Storage, TaskStore, TripStore,
};
