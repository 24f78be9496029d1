//! High-level memory operations with graceful degradation.
//!
//! Engine failures never propagate: `write` falls back to a synthetic id,
//! `search` to an empty list, and the error counter is bumped so metrics
//! can surface the degradation. Callers always keep producing an answer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use wf_domain::memory::{MemoryItem, MemoryLevel};

use crate::MemoryEngine;

/// Counters exported into the `ai` metrics family.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryCounters {
    pub calls: u64,
    pub errors: u64,
}

pub struct MemoryService {
    engine: Option<Arc<dyn MemoryEngine>>,
    calls: AtomicU64,
    errors: AtomicU64,
}

impl MemoryService {
    pub fn new(engine: Arc<dyn MemoryEngine>) -> Self {
        Self {
            engine: Some(engine),
            calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// A service with no engine: writes return `"disabled"`, searches
    /// return nothing.
    pub fn disabled() -> Self {
        Self {
            engine: None,
            calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn counters(&self) -> MemoryCounters {
        MemoryCounters {
            calls: self.calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Write one memory item. Metadata always carries the level and an
    /// origin tag on top of whatever the caller provides.
    pub async fn write(
        &self,
        user_id: i64,
        level: MemoryLevel,
        text: &str,
        trip_id: Option<i64>,
        session_id: Option<&str>,
        metadata: Value,
    ) -> String {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let Some(engine) = &self.engine else {
            return "disabled".into();
        };
        let namespace = match level.namespace(user_id, trip_id, session_id) {
            Ok(ns) => ns,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "memory namespace rejected");
                return "disabled".into();
            }
        };
        let merged = merge_metadata(metadata, level, &namespace);
        match engine.add(&namespace, text, merged).await {
            Ok(id) => id,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(namespace = %namespace, error = %e, "memory write failed");
                "disabled".into()
            }
        }
    }

    /// Search one level. Any failure comes back as an empty list.
    pub async fn search(
        &self,
        user_id: i64,
        level: MemoryLevel,
        query: &str,
        trip_id: Option<i64>,
        session_id: Option<&str>,
        k: usize,
    ) -> Vec<MemoryItem> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let Some(engine) = &self.engine else {
            return Vec::new();
        };
        let namespace = match level.namespace(user_id, trip_id, session_id) {
            Ok(ns) => ns,
            Err(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                return Vec::new();
            }
        };
        match engine.search(&namespace, query, k).await {
            Ok(items) => items,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(namespace = %namespace, error = %e, "memory search failed");
                Vec::new()
            }
        }
    }
}

fn merge_metadata(metadata: Value, level: MemoryLevel, namespace: &str) -> Value {
    let mut merged = match metadata {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    merged.insert("level".into(), Value::String(level.as_str().into()));
    merged.insert("namespace".into(), Value::String(namespace.into()));
    merged
        .entry("origin")
        .or_insert_with(|| Value::String("wayfarer".into()));
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalMemoryEngine;
    use wf_domain::{Error, Result};

    struct FailingEngine;

    #[async_trait::async_trait]
    impl MemoryEngine for FailingEngine {
        async fn add(&self, _: &str, _: &str, _: Value) -> Result<String> {
            Err(Error::MemoryProvider("down".into()))
        }

        async fn search(&self, _: &str, _: &str, _: usize) -> Result<Vec<MemoryItem>> {
            Err(Error::MemoryProvider("down".into()))
        }
    }

    #[tokio::test]
    async fn write_and_search_roundtrip() {
        let service = MemoryService::new(Arc::new(LocalMemoryEngine::new()));
        let id = service
            .write(
                1,
                MemoryLevel::User,
                "prefers walking tours",
                None,
                None,
                serde_json::json!({"kind": "preference"}),
            )
            .await;
        assert!(id.starts_with("local-"));

        let hits = service
            .search(1, MemoryLevel::User, "walking", None, None, 5)
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata["level"], "user");
        assert_eq!(hits[0].metadata["kind"], "preference");
        assert_eq!(hits[0].metadata["origin"], "wayfarer");
    }

    #[tokio::test]
    async fn engine_failure_degrades_without_error() {
        let service = MemoryService::new(Arc::new(FailingEngine));
        let id = service
            .write(1, MemoryLevel::User, "x", None, None, Value::Null)
            .await;
        assert_eq!(id, "disabled");

        let hits = service.search(1, MemoryLevel::User, "x", None, None, 5).await;
        assert!(hits.is_empty());

        let counters = service.counters();
        assert_eq!(counters.calls, 2);
        assert_eq!(counters.errors, 2);
    }

    #[tokio::test]
    async fn missing_scope_id_degrades() {
        let service = MemoryService::new(Arc::new(LocalMemoryEngine::new()));
        // Session level without a session id cannot build a namespace.
        let id = service
            .write(1, MemoryLevel::Session, "x", None, None, Value::Null)
            .await;
        assert_eq!(id, "disabled");
        assert_eq!(service.counters().errors, 1);
    }

    #[tokio::test]
    async fn disabled_service_short_circuits() {
        let service = MemoryService::disabled();
        assert_eq!(
            service
                .write(1, MemoryLevel::User, "x", None, None, Value::Null)
                .await,
            "disabled"
        );
        assert!(service
            .search(1, MemoryLevel::User, "x", None, None, 3)
            .await
            .is_empty());
        assert_eq!(service.counters().errors, 0);
    }
}
