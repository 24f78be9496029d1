use serde::{Deserialize, Serialize};

use wf_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Model override. `None` uses the provider's configured default.
    pub model: Option<String>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// When true, instruct the model to emit a single JSON value only.
    pub json_mode: bool,
    /// Per-call deadline; `None` uses the provider's configured timeout.
    pub timeout_s: Option<u64>,
}

/// A provider-agnostic chat completion response with token accounting.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
    pub latency_ms: f64,
    pub trace_id: String,
}

impl ChatResponse {
    pub fn tokens_total(&self) -> u64 {
        self.tokens_prompt + self.tokens_completion
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter implements. Failures surface as
/// `Error::Llm { kind, .. }` with kind in
/// `{timeout, rate_limit, provider_error, invalid_output}`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
