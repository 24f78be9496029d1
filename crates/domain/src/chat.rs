//! Dialogue entities and the assistant wire protocol shared by the REST
//! (SSE) and WebSocket transports — the two differ only in framing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::MemoryItem;
use crate::trace::ToolTrace;
use crate::trip::GeoPoint;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persisted entities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A dialogue session, strictly owned by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<i64>,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: Value,
}

/// One persisted message. Stream chunks are never persisted; each turn
/// appends exactly one user and one assistant row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat request / result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub query: String,
    #[serde(default = "d_true")]
    pub use_memory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k_memory: Option<usize>,
    #[serde(default)]
    pub return_memory: bool,
    #[serde(default)]
    pub return_tool_traces: bool,
    #[serde(default)]
    pub return_messages: bool,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_radius: Option<u32>,
}

fn d_true() -> bool {
    true
}

/// Summary of the single LLM call (if any) made during a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiMeta {
    pub provider: String,
    pub model: String,
    pub latency_ms: f64,
    pub tokens_total: u64,
    pub trace_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub session_id: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_memory: Vec<MemoryItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_traces: Vec<ToolTrace>,
    pub ai_meta: AiMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<StoredMessage>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming protocol
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Server → client events. Within a turn, `chunk.index` is strictly
/// increasing from 0 and exactly one `result` or `error` terminates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    Ready {
        session_id: String,
        server_time: DateTime<Utc>,
        caps: Vec<String>,
    },
    Chunk {
        trace_id: String,
        index: u64,
        delta: String,
        done: bool,
    },
    Result {
        payload: ChatResult,
    },
    Error {
        error_type: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace_id: Option<String>,
    },
    Done,
}

/// Client → server events on the WebSocket channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    UserMessage {
        id: String,
        payload: TurnPayload,
    },
    Ping {
        ts: i64,
    },
    Cancel {
        id: String,
    },
}

/// Per-turn payload carried by a WS `user_message`; connection-level
/// identity (user/session/trip) comes from the open parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPayload {
    pub query: String,
    #[serde(default = "d_true")]
    pub use_memory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k_memory: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_radius: Option<u32>,
}
