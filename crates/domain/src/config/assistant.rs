use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assistant configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// History window: this many user/assistant rounds are loaded per turn.
    #[serde(default = "d_history_max_rounds")]
    pub history_max_rounds: usize,
    /// Deadline for one full turn (tools + LLM + persistence).
    #[serde(default = "d_turn_timeout_s")]
    pub turn_timeout_s: u64,
    /// Maximum tool invocations per turn.
    #[serde(default = "d_max_tools")]
    pub max_tools: usize,
    /// Memory items retrieved per scope when the caller gives no `top_k`.
    #[serde(default = "d_memory_top_k")]
    pub memory_top_k: usize,
    /// Size of answer chunks emitted on the streaming paths.
    #[serde(default = "d_stream_chunk_chars")]
    pub stream_chunk_chars: usize,
    #[serde(default)]
    pub ws: WsConfig,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            history_max_rounds: d_history_max_rounds(),
            turn_timeout_s: d_turn_timeout_s(),
            max_tools: d_max_tools(),
            memory_top_k: d_memory_top_k(),
            stream_chunk_chars: d_stream_chunk_chars(),
            ws: WsConfig::default(),
        }
    }
}

fn d_history_max_rounds() -> usize {
    5
}

fn d_turn_timeout_s() -> u64 {
    30
}

fn d_max_tools() -> usize {
    3
}

fn d_memory_top_k() -> usize {
    5
}

fn d_stream_chunk_chars() -> usize {
    40
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WebSocket channel configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What to do when a client's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SendOverflowPolicy {
    /// Drop the oldest queued chunk events, then error if still full.
    #[default]
    DropOldest,
    /// Close the connection with `error_type=rate_limited`.
    Close,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_max_connections_per_user")]
    pub max_connections_per_user: usize,
    /// Connections without traffic or pings beyond this are closed.
    #[serde(default = "d_idle_timeout_s")]
    pub idle_timeout_s: u64,
    #[serde(default = "d_send_queue_maxsize")]
    pub send_queue_maxsize: usize,
    #[serde(default)]
    pub send_overflow: SendOverflowPolicy,
    #[serde(default = "d_max_message_chars")]
    pub max_message_chars: usize,
    /// Sliding-window user message limit per minute.
    #[serde(default = "d_rate_limit_per_min")]
    pub rate_limit_per_min: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_connections_per_user: d_max_connections_per_user(),
            idle_timeout_s: d_idle_timeout_s(),
            send_queue_maxsize: d_send_queue_maxsize(),
            send_overflow: SendOverflowPolicy::DropOldest,
            max_message_chars: d_max_message_chars(),
            rate_limit_per_min: d_rate_limit_per_min(),
        }
    }
}

fn d_true() -> bool {
    true
}

fn d_max_connections_per_user() -> usize {
    3
}

fn d_idle_timeout_s() -> u64 {
    300
}

fn d_send_queue_maxsize() -> usize {
    64
}

fn d_max_message_chars() -> usize {
    4000
}

fn d_rate_limit_per_min() -> usize {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_policy_snake_case() {
        assert_eq!(
            serde_json::to_string(&SendOverflowPolicy::DropOldest).unwrap(),
            "\"drop_oldest\""
        );
    }

    #[test]
    fn ws_defaults() {
        let cfg = WsConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.max_connections_per_user, 3);
        assert_eq!(cfg.send_overflow, SendOverflowPolicy::DropOldest);
    }
}
