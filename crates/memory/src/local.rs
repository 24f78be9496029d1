//! In-process memory engine. Scoring is deliberately simple: exact
//! substring containment scores 1.0, otherwise a character-bigram overlap
//! ratio is used so near-matches still rank above noise.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde_json::Value;

use wf_domain::memory::MemoryItem;
use wf_domain::Result;

use crate::MemoryEngine;

struct Entry {
    id: String,
    text: String,
    metadata: Value,
}

#[derive(Default)]
pub struct LocalMemoryEngine {
    store: RwLock<HashMap<String, Vec<Entry>>>,
}

impl LocalMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn score(text: &str, query: &str) -> f64 {
        if text.is_empty() || query.is_empty() {
            return 0.0;
        }
        if text.to_lowercase().contains(&query.to_lowercase()) {
            return 1.0;
        }
        let a = bigrams(&text.to_lowercase());
        let b = bigrams(&query.to_lowercase());
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let overlap = a.intersection(&b).count() as f64;
        overlap / (a.len().max(b.len()) as f64)
    }
}

fn bigrams(s: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

#[async_trait::async_trait]
impl MemoryEngine for LocalMemoryEngine {
    async fn add(&self, namespace: &str, text: &str, metadata: Value) -> Result<String> {
        let id = format!("local-{}", uuid::Uuid::new_v4().simple());
        self.store
            .write()
            .entry(namespace.to_owned())
            .or_default()
            .push(Entry {
                id: id.clone(),
                text: text.to_owned(),
                metadata,
            });
        Ok(id)
    }

    async fn search(&self, namespace: &str, query: &str, k: usize) -> Result<Vec<MemoryItem>> {
        let store = self.store.read();
        let Some(entries) = store.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<(f64, &Entry)> = entries
            .iter()
            .map(|e| (Self::score(&e.text, query), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| MemoryItem {
                id: e.id.clone(),
                text: e.text.clone(),
                score: (score * 10_000.0).round() / 10_000.0,
                metadata: e.metadata.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_search_finds_item() {
        let engine = LocalMemoryEngine::new();
        engine
            .add("user:1", "prefers quiet museums", serde_json::json!({}))
            .await
            .unwrap();
        engine
            .add("user:1", "allergic to peanuts", serde_json::json!({}))
            .await
            .unwrap();

        let hits = engine.search("user:1", "museums", 5).await.unwrap();
        assert_eq!(hits[0].text, "prefers quiet museums");
        assert_eq!(hits[0].score, 1.0);
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let engine = LocalMemoryEngine::new();
        engine
            .add("user:1", "loves food streets", serde_json::json!({}))
            .await
            .unwrap();
        let hits = engine.search("user:2", "food", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn k_bounds_results() {
        let engine = LocalMemoryEngine::new();
        for i in 0..10 {
            engine
                .add("user:1", &format!("note {i}"), serde_json::json!({}))
                .await
                .unwrap();
        }
        let hits = engine.search("user:1", "note", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn bigram_scoring_orders_near_matches() {
        let close = LocalMemoryEngine::score("seafood restaurants", "seafood places");
        let far = LocalMemoryEngine::score("hiking trails", "seafood places");
        assert!(close > far);
    }
}
