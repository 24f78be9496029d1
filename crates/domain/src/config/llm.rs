use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    /// Deterministic in-process mock, used in tests and keyless setups.
    #[default]
    Mock,
    /// Any OpenAI-compatible chat completion endpoint.
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderKind,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. An empty/unset var
    /// degrades the provider to mock.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_timeout_s")]
    pub timeout_s: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Mock,
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            model: d_model(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            timeout_s: d_timeout_s(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn d_api_key_env() -> String {
    "WF_LLM_API_KEY".into()
}

fn d_model() -> String {
    "gpt-4o-mini".into()
}

fn d_temperature() -> f32 {
    0.7
}

fn d_max_tokens() -> u32 {
    1024
}

fn d_timeout_s() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_provider_is_mock() {
        assert_eq!(LlmConfig::default().provider, LlmProviderKind::Mock);
    }

    #[test]
    fn provider_kind_snake_case() {
        let parsed: LlmProviderKind = serde_json::from_str("\"openai_compat\"").unwrap();
        assert_eq!(parsed, LlmProviderKind::OpenaiCompat);
    }
}
