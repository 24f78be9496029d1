//! Deterministic in-process LLM used by tests and keyless deployments.
//!
//! Three modes, checked in order:
//! 1. scripted responses queued with `push_response`/`push_error`;
//! 2. a custom handler closure installed with `with_handler`;
//! 3. a canned fallback that acknowledges the last user message.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use wf_domain::{Error, LlmErrorKind, Result};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

type Handler = dyn Fn(&ChatRequest) -> Result<String> + Send + Sync;

enum Scripted {
    Content(String),
    Error(LlmErrorKind, String),
}

pub struct MockLlmProvider {
    handler: Option<Arc<Handler>>,
    scripted: Mutex<VecDeque<Scripted>>,
    calls: AtomicU64,
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            handler: None,
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Answer every call through `handler` (unless scripted responses are
    /// queued, which take precedence).
    pub fn with_handler(
        handler: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Some(Arc::new(handler)),
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Queue one successful response.
    pub fn push_response(&self, content: impl Into<String>) {
        self.scripted.lock().push_back(Scripted::Content(content.into()));
    }

    /// Queue one failure.
    pub fn push_error(&self, kind: LlmErrorKind, message: impl Into<String>) {
        self.scripted
            .lock()
            .push_back(Scripted::Error(kind, message.into()));
    }

    /// Number of chat calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn fallback_content(req: &ChatRequest) -> String {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if req.json_mode {
            // A minimal valid JSON object so json-mode callers can parse.
            serde_json::json!({ "answer": last_user }).to_string()
        } else {
            format!("[mock] {last_user}")
        }
    }

    /// Rough token estimate, stable across runs.
    fn estimate_tokens(text: &str) -> u64 {
        (text.chars().count() as u64 / 4).max(1)
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockLlmProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let scripted = self.scripted.lock().pop_front();
        let content = match scripted {
            Some(Scripted::Content(content)) => content,
            Some(Scripted::Error(kind, message)) => {
                return Err(Error::Llm { kind, message });
            }
            None => match &self.handler {
                Some(handler) => handler(&req)?,
                None => Self::fallback_content(&req),
            },
        };

        let prompt_chars: usize = req.messages.iter().map(|m| m.content.chars().count()).sum();
        Ok(ChatResponse {
            tokens_prompt: (prompt_chars as u64 / 4).max(1),
            tokens_completion: Self::estimate_tokens(&content),
            content,
            model: req.model.unwrap_or_else(|| "mock".into()),
            latency_ms: 0.0,
            trace_id: wf_domain::trace::new_trace_id("ai"),
        })
    }

    fn provider_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChatMessage;

    fn req(content: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user(content)],
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn fallback_echoes_last_user_message() {
        let provider = MockLlmProvider::new();
        let resp = provider.chat(req("hello")).await.unwrap();
        assert_eq!(resp.content, "[mock] hello");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn json_mode_fallback_is_valid_json() {
        let provider = MockLlmProvider::new();
        let mut request = req("hi");
        request.json_mode = true;
        let resp = provider.chat(request).await.unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&resp.content).is_ok());
    }

    #[tokio::test]
    async fn scripted_responses_drain_in_order() {
        let provider = MockLlmProvider::new();
        provider.push_response("first");
        provider.push_error(LlmErrorKind::Timeout, "slow");
        provider.push_response("third");

        assert_eq!(provider.chat(req("a")).await.unwrap().content, "first");
        let err = provider.chat(req("b")).await.unwrap_err();
        assert_eq!(err.kind(), "llm_timeout");
        assert_eq!(provider.chat(req("c")).await.unwrap().content, "third");
    }

    #[tokio::test]
    async fn handler_drives_content() {
        let provider =
            MockLlmProvider::with_handler(|req| Ok(format!("{} messages", req.messages.len())));
        let resp = provider.chat(req("x")).await.unwrap();
        assert_eq!(resp.content, "1 messages");
    }

    #[tokio::test]
    async fn token_accounting_is_populated() {
        let provider = MockLlmProvider::new();
        let resp = provider.chat(req("some reasonably long user input")).await.unwrap();
        assert!(resp.tokens_prompt >= 1);
        assert!(resp.tokens_completion >= 1);
        assert_eq!(resp.tokens_total(), resp.tokens_prompt + resp.tokens_completion);
    }
}
