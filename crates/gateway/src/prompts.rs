//! Prompt registry: code-baked defaults, storage overrides, and an
//! in-process TTL cache with single-writer invalidation.
//!
//! Every prompt the planner or assistant consumes goes through `get` —
//! call sites never embed literal prompt content.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;

use wf_domain::prompt::{PromptRecord, PromptSummary};
use wf_domain::{Error, Result};
use wf_storage::{PromptStore, Storage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Code-baked defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PromptDefault {
    pub key: &'static str,
    pub title: &'static str,
    pub role: &'static str,
    pub content: &'static str,
}

/// Defaults compiled into the binary. Storage rows override these per key.
pub const DEFAULT_PROMPTS: &[PromptDefault] = &[
    PromptDefault {
        key: "assistant.system.main",
        title: "Assistant system prompt",
        role: "system",
        content: "You are Wayfarer, a travel assistant. Interpret the user's \
                  question, use the provided trip data, memories and tool \
                  results, and answer concisely with actionable suggestions. \
                  Name your sources when you rely on trip data or memories; \
                  if information is missing, say so plainly.",
    },
    PromptDefault {
        key: "assistant.response.formatter",
        title: "Answer formatting rules",
        role: "system",
        content: "Compose the final reply from the context blocks. Rules: \
                  1) describe itinerary items in chronological order; \
                  2) cite recalled memories when they shaped the answer; \
                  3) keep a friendly tone and prefer concrete suggestions; \
                  4) when tool results are missing or degraded, acknowledge \
                  the gap instead of guessing.",
    },
    PromptDefault {
        key: "assistant.fallback",
        title: "Fallback answer",
        role: "system",
        content: "Answer the user's question directly and briefly. If key \
                  information is missing, state what you would need to know.",
    },
    PromptDefault {
        key: "planner.deep.day",
        title: "Deep planner per-day generation",
        role: "system",
        content: "You are an itinerary writer. Produce exactly one JSON \
                  object describing the requested day: {\"day_index\": int, \
                  \"date\": \"YYYY-MM-DD\", \"note\": string|null, \
                  \"sub_trips\": [{\"order_index\": int, \"activity\": string, \
                  \"loc_name\": string, \"start_time\": \"HH:MM:SS\", \
                  \"end_time\": \"HH:MM:SS\", \"ext\": {\"poi\": {\"provider\": \
                  string, \"provider_id\": string}}}]}. Use only candidate \
                  POIs, never a POI from the used set, keep order_index dense \
                  from 0, and output JSON with no surrounding prose.",
    },
];

fn find_default(key: &str) -> Option<&'static PromptDefault> {
    DEFAULT_PROMPTS.iter().find(|p| p.key == key)
}

fn default_record(def: &PromptDefault) -> PromptRecord {
    PromptRecord {
        key: def.key.into(),
        title: def.title.into(),
        role: def.role.into(),
        content: def.content.into(),
        version: 1,
        tags: Vec::new(),
        is_active: true,
        updated_at: Utc::now(),
        updated_by: None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PromptRegistry {
    store: Arc<dyn Storage>,
    cache: RwLock<HashMap<String, (Instant, PromptRecord)>>,
    ttl: Duration,
}

impl PromptRegistry {
    pub fn new(store: Arc<dyn Storage>, ttl_seconds: u64) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds.max(1)),
        }
    }

    /// Resolve the active prompt: cache → storage override → default.
    pub async fn get(&self, key: &str) -> Result<PromptRecord> {
        if let Some((expires, record)) = self.cache.read().get(key) {
            if *expires > Instant::now() {
                return Ok(record.clone());
            }
        }

        let record = match self.store.get_prompt(key).await? {
            Some(record) => record,
            None => default_record(
                find_default(key)
                    .ok_or_else(|| Error::NotFound(format!("prompt key {key}")))?,
            ),
        };
        self.cache
            .write()
            .insert(key.to_owned(), (Instant::now() + self.ttl, record.clone()));
        Ok(record)
    }

    /// Write an override, bumping the version, and invalidate the cache.
    pub async fn update(
        &self,
        key: &str,
        content: String,
        tags: Vec<String>,
        updated_by: Option<String>,
    ) -> Result<PromptRecord> {
        let current = match self.store.get_prompt(key).await? {
            Some(record) => record,
            None => default_record(
                find_default(key)
                    .ok_or_else(|| Error::NotFound(format!("prompt key {key}")))?,
            ),
        };
        let record = PromptRecord {
            content,
            tags,
            version: current.version + 1,
            updated_at: Utc::now(),
            updated_by,
            ..current
        };
        self.store.put_prompt(record.clone()).await?;
        self.invalidate(key);
        Ok(record)
    }

    /// Delete the override, restoring the code-baked default.
    pub async fn reset(&self, key: &str) -> Result<PromptRecord> {
        find_default(key).ok_or_else(|| Error::NotFound(format!("prompt key {key}")))?;
        self.store.delete_prompt(key).await?;
        self.invalidate(key);
        self.get(key).await
    }

    /// Metadata only; content is elided.
    pub async fn list(&self) -> Result<Vec<PromptSummary>> {
        let mut out: HashMap<String, PromptSummary> = DEFAULT_PROMPTS
            .iter()
            .map(|def| (def.key.to_owned(), default_record(def).summary(false)))
            .collect();
        for record in self.store.list_prompts().await? {
            out.insert(record.key.clone(), record.summary(true));
        }
        let mut rows: Vec<PromptSummary> = out.into_values().collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    fn invalidate(&self, key: &str) {
        self.cache.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_storage::MemoryStorage;

    fn registry() -> PromptRegistry {
        PromptRegistry::new(Arc::new(MemoryStorage::new()), 60)
    }

    #[tokio::test]
    async fn get_returns_default_when_no_override() {
        let reg = registry();
        let prompt = reg.get("assistant.system.main").await.unwrap();
        assert_eq!(prompt.version, 1);
        assert!(prompt.content.contains("Wayfarer"));
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let reg = registry();
        let err = reg.get("nope").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn update_bumps_version_and_takes_effect() {
        let reg = registry();
        let updated = reg
            .update(
                "assistant.fallback",
                "short answers only".into(),
                vec!["test".into()],
                Some("ops".into()),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let fetched = reg.get("assistant.fallback").await.unwrap();
        assert_eq!(fetched.content, "short answers only");
        assert_eq!(fetched.updated_by.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn reset_restores_default() {
        let reg = registry();
        reg.update("assistant.fallback", "override".into(), vec![], None)
            .await
            .unwrap();
        let restored = reg.reset("assistant.fallback").await.unwrap();
        assert_eq!(restored.version, 1);
        assert!(restored.content.contains("directly and briefly"));
    }

    #[tokio::test]
    async fn list_marks_overridden_keys() {
        let reg = registry();
        reg.update("planner.deep.day", "x".into(), vec![], None)
            .await
            .unwrap();
        let rows = reg.list().await.unwrap();
        let deep = rows.iter().find(|r| r.key == "planner.deep.day").unwrap();
        assert!(deep.overridden);
        let main = rows.iter().find(|r| r.key == "assistant.system.main").unwrap();
        assert!(!main.overridden);
    }

    #[tokio::test]
    async fn cache_serves_until_invalidation() {
        let reg = registry();
        // Prime the cache.
        reg.get("assistant.fallback").await.unwrap();
        // Write an override directly into storage, bypassing the registry.
        let mut record = reg.get("assistant.fallback").await.unwrap();
        record.content = "stale-bypass".into();
        reg.store.put_prompt(record).await.unwrap();
        // Cache still serves the old content within TTL.
        assert!(!reg
            .get("assistant.fallback")
            .await
            .unwrap()
            .content
            .contains("stale-bypass"));
        // Invalidation exposes the new row.
        reg.invalidate("assistant.fallback");
        assert!(reg
            .get("assistant.fallback")
            .await
            .unwrap()
            .content
            .contains("stale-bypass"));
    }
}
