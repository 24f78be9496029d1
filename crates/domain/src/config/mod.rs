mod admin;
mod assistant;
mod llm;
mod planner;
mod poi;
mod server;
mod tasks;

pub use admin::*;
pub use assistant::*;
pub use llm::*;
pub use planner::*;
pub use poi::*;
pub use server::*;
pub use tasks::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub deep: DeepPlannerConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub poi: PoiConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory / prompts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// When false the memory engine is never called; writes return a
    /// synthetic id and searches come back empty.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Default `k` for memory searches when the caller does not specify one.
    #[serde(default = "d_memory_default_k")]
    pub default_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_k: d_memory_default_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// TTL of the in-process prompt cache.
    #[serde(default = "d_prompt_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: d_prompt_cache_ttl(),
        }
    }
}

fn d_true() -> bool {
    true
}

fn d_memory_default_k() -> usize {
    5
}

fn d_prompt_cache_ttl() -> u64 {
    60
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    /// An empty vec means the config is usable as-is.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.planner.max_days == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "planner.max_days".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.planner.parse_day_window().is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "planner.day_start/day_end".into(),
                message: "expected HH:MM with day_start < day_end".into(),
            });
        }
        if self.poi.default_radius_m > self.poi.max_radius_m {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "poi.default_radius_m".into(),
                message: format!(
                    "exceeds poi.max_radius_m ({} > {})",
                    self.poi.default_radius_m, self.poi.max_radius_m
                ),
            });
        }
        if self.deep.retries > 2 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "deep.retries".into(),
                message: "values above 2 multiply LLM spend per day".into(),
            });
        }
        if self.tasks.queue_maxsize == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "tasks.queue_maxsize".into(),
                message: "must be at least 1".into(),
            });
        }

        issues
    }
}
