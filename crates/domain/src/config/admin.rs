use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin API configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Environment variable holding the admin bearer token.
    /// When the env var is unset and no IP allowlist is configured,
    /// admin endpoints are open (dev mode).
    #[serde(default = "d_token_env")]
    pub token_env: String,
    /// Client IPs allowed to call admin endpoints without a token.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token_env: d_token_env(),
            allowed_ips: Vec::new(),
        }
    }
}

fn d_token_env() -> String {
    "WF_ADMIN_TOKEN".into()
}
