//! OpenAI-compatible adapter.
//!
//! Works with any endpoint that follows the OpenAI chat completions
//! contract (OpenAI, Azure-style proxies, vLLM, Ollama, Together, …).

use std::time::{Duration, Instant};

use serde_json::Value;

use wf_domain::config::LlmConfig;
use wf_domain::{Error, LlmErrorKind, Result};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    default_max_tokens: u32,
    default_timeout_s: u64,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: LlmConfig, api_key: String) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            default_model: config.model,
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
            default_timeout_s: config.timeout_s,
            client: reqwest::Client::new(),
        }
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "temperature": req.temperature.unwrap_or(self.default_temperature),
            "max_tokens": req.max_tokens.unwrap_or(self.default_max_tokens),
        });
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let timeout = Duration::from_secs(req.timeout_s.unwrap_or(self.default_timeout_s));
        let body = self.build_body(&req);
        let t0 = Instant::now();

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    LlmErrorKind::Timeout
                } else {
                    LlmErrorKind::ProviderError
                };
                Error::Llm {
                    kind,
                    message: e.to_string(),
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(Error::Llm {
                kind: LlmErrorKind::RateLimit,
                message: "provider returned 429".into(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Llm {
                kind: LlmErrorKind::ProviderError,
                message: format!("HTTP {status}: {}", truncate(&text, 200)),
            });
        }

        let payload: Value = resp.json().await.map_err(|e| Error::Llm {
            kind: LlmErrorKind::InvalidOutput,
            message: e.to_string(),
        })?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Llm {
                kind: LlmErrorKind::InvalidOutput,
                message: "response missing choices[0].message.content".into(),
            })?
            .to_owned();

        Ok(ChatResponse {
            content,
            model: payload["model"]
                .as_str()
                .unwrap_or(&self.default_model)
                .to_owned(),
            tokens_prompt: payload["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            tokens_completion: payload["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            latency_ms: t0.elapsed().as_secs_f64() * 1000.0,
            trace_id: wf_domain::trace::new_trace_id("ai"),
        })
    }

    fn provider_id(&self) -> &str {
        "openai_compat"
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChatMessage;

    fn provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new(LlmConfig::default(), "sk-test".into())
    }

    #[test]
    fn body_includes_json_mode_when_requested() {
        let req = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            json_mode: true,
            ..ChatRequest::default()
        };
        let body = provider().build_body(&req);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn body_prefers_request_overrides() {
        let req = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            model: Some("deep-model".into()),
            temperature: Some(0.1),
            max_tokens: Some(64),
            ..ChatRequest::default()
        };
        let body = provider().build_body(&req);
        assert_eq!(body["model"], "deep-model");
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
