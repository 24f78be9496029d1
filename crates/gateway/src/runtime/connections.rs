//! WebSocket connection registry and per-user rate limiting.
//!
//! Single-process registry keyed by session id; writes happen on
//! accept/close, reads on admin snapshots. A shared keyed store could
//! mirror this for multi-process observability.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ConnectionRegistry {
    per_user: Mutex<HashMap<i64, usize>>,
    sessions: Mutex<HashMap<String, String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new connection for `user_id`. False when the user is at
    /// the cap; the caller must reject the upgrade.
    pub fn try_acquire(&self, user_id: i64, max_per_user: usize) -> bool {
        let mut per_user = self.per_user.lock();
        let count = per_user.entry(user_id).or_insert(0);
        if *count >= max_per_user {
            return false;
        }
        *count += 1;
        true
    }

    pub fn release(&self, user_id: i64) {
        let mut per_user = self.per_user.lock();
        if let Some(count) = per_user.get_mut(&user_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                per_user.remove(&user_id);
            }
        }
    }

    pub fn register_session(&self, session_id: &str, connection_id: &str) {
        self.sessions
            .lock()
            .insert(session_id.to_owned(), connection_id.to_owned());
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }

    pub fn connection_count(&self, user_id: i64) -> usize {
        self.per_user.lock().get(&user_id).copied().unwrap_or(0)
    }

    /// Admin snapshot: session id → connection id.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.sessions.lock().clone()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sliding-window rate limiter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-connection sliding window over user messages.
pub struct RateWindow {
    limit: usize,
    window: Duration,
    events: Mutex<VecDeque<Instant>>,
}

impl RateWindow {
    pub fn per_minute(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            window: Duration::from_secs(60),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Record an event; false when the window is already full.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut events = self.events.lock();
        while events.front().is_some_and(|&t| now - t > self.window) {
            events.pop_front();
        }
        if events.len() >= self.limit {
            return false;
        }
        events.push_back(now);
        true
    }
}
