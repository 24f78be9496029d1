//! Prompt records: keyed templates with code-baked defaults and storage
//! overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRecord {
    pub key: String,
    pub title: String,
    /// Message role the prompt is injected as (usually `system`).
    pub role: String,
    pub content: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default = "d_true")]
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

fn d_true() -> bool {
    true
}

/// Metadata-only view for listings (content elided).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSummary {
    pub key: String,
    pub title: String,
    pub role: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub is_active: bool,
    /// True when a storage override shadows the code-baked default.
    pub overridden: bool,
    pub updated_at: DateTime<Utc>,
}

impl PromptRecord {
    pub fn summary(&self, overridden: bool) -> PromptSummary {
        PromptSummary {
            key: self.key.clone(),
            title: self.title.clone(),
            role: self.role.clone(),
            version: self.version,
            tags: self.tags.clone(),
            is_active: self.is_active,
            overridden,
            updated_at: self.updated_at,
        }
    }
}
