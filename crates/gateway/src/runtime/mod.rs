//! Runtime services: the persisted task engine, per-turn cancellation,
//! the WebSocket connection registry, and the assistant pipeline.

pub mod assistant;
pub mod cancel;
pub mod connections;
pub mod tasks;
