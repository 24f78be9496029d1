//! LLM provider abstraction: a provider-agnostic chat contract, an
//! OpenAI-compatible HTTP adapter, and a deterministic scriptable mock
//! for tests and keyless deployments.

mod mock;
mod openai_compat;
mod traits;

pub use mock::MockLlmProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use traits::{ChatMessage, ChatRequest, ChatResponse, LlmProvider};

use std::sync::Arc;

use wf_domain::config::{LlmConfig, LlmProviderKind};

/// Build a provider from config. `openai_compat` without a usable API key
/// degrades to the mock so the system keeps answering.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    match config.provider {
        LlmProviderKind::OpenaiCompat => {
            match std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()) {
                Some(api_key) => Arc::new(OpenAiCompatProvider::new(config.clone(), api_key)),
                None => {
                    tracing::warn!(
                        env = %config.api_key_env,
                        "LLM API key not set, degrading to mock provider"
                    );
                    Arc::new(MockLlmProvider::new())
                }
            }
        }
        LlmProviderKind::Mock => Arc::new(MockLlmProvider::new()),
    }
}
