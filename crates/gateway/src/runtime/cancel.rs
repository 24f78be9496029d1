//! Per-turn cancellation tokens.
//!
//! Each in-flight assistant turn registers a token keyed by its turn id;
//! a WS `cancel` event or a connection drop flips it, and the pipeline
//! checks it at every suspension point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation flag shared between the canceller and the runtime loop.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Active cancellation tokens keyed by turn id.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a token for a turn.
    pub fn register(&self, key: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(key.to_owned(), token.clone());
        token
    }

    /// Cancel a turn. Returns true if a token was registered.
    pub fn cancel(&self, key: &str) -> bool {
        match self.tokens.lock().get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered turn whose key starts with `prefix`
    /// (connection drop: all turns of that connection).
    pub fn cancel_prefix(&self, prefix: &str) -> usize {
        let tokens = self.tokens.lock();
        let mut n = 0;
        for (key, token) in tokens.iter() {
            if key.starts_with(prefix) {
                token.cancel();
                n += 1;
            }
        }
        n
    }

    /// Remove the token once the turn completes.
    pub fn remove(&self, key: &str) {
        self.tokens.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifecycle() {
        let map = CancelMap::new();
        let token = map.register("conn-1:turn-1");
        assert!(!token.is_cancelled());
        assert!(map.cancel("conn-1:turn-1"));
        assert!(token.is_cancelled());
        map.remove("conn-1:turn-1");
        assert!(!map.cancel("conn-1:turn-1"));
    }

    #[test]
    fn prefix_cancel_hits_all_turns_of_a_connection() {
        let map = CancelMap::new();
        let a = map.register("conn-1:turn-1");
        let b = map.register("conn-1:turn-2");
        let other = map.register("conn-2:turn-1");

        assert_eq!(map.cancel_prefix("conn-1:"), 2);
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(!other.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
