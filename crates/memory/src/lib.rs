//! Semantic memory: a narrow engine trait, a local in-process
//! implementation, and the [`MemoryService`] facade that encodes
//! namespaces and degrades gracefully when the engine misbehaves.

mod local;
mod service;

pub use local::LocalMemoryEngine;
pub use service::{MemoryCounters, MemoryService};

use serde_json::Value;

use wf_domain::memory::MemoryItem;
use wf_domain::Result;

/// Abstraction over the memory backend (vector store, remote service, or
/// the local engine). Namespaces are opaque strings to the engine.
#[async_trait::async_trait]
pub trait MemoryEngine: Send + Sync {
    /// Store one short text item; returns its record id.
    async fn add(&self, namespace: &str, text: &str, metadata: Value) -> Result<String>;

    /// Search a namespace; results are scored descending.
    async fn search(&self, namespace: &str, query: &str, k: usize) -> Result<Vec<MemoryItem>>;
}
