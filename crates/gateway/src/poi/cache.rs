//! POI cache seam. Semantics are identical across backends; the
//! in-memory implementation is a TTL map with LRU eviction for
//! single-process deployments, and a keyed shared store can implement the
//! same trait for multi-process ones.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[async_trait::async_trait]
pub trait PoiCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory TTL + LRU
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Entry {
    expires_at: Instant,
    value: String,
    last_used: u64,
}

pub struct InMemoryPoiCache {
    capacity: usize,
    state: Mutex<(HashMap<String, Entry>, u64)>,
}

impl InMemoryPoiCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new((HashMap::new(), 0)),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl PoiCache for InMemoryPoiCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        let (entries, clock) = &mut *state;
        *clock += 1;
        let tick = *clock;
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.last_used = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut state = self.state.lock();
        let (entries, clock) = &mut *state;
        *clock += 1;
        let tick = *clock;
        entries.insert(
            key.to_owned(),
            Entry {
                expires_at: Instant::now() + ttl,
                value,
                last_used: tick,
            },
        );
        // LRU eviction by capacity.
        while entries.len() > self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}
