//! Shared error type used across all Wayfarer crates.
//!
//! Every variant carries a stable machine-readable kind (used in API
//! payloads and tool traces) and maps to a numeric code in the external
//! contract: `1xxx` business, `2xxx` auth, `3xxx` external dependency,
//! `140xx` planner/task specific.

use crate::validator::ValidationIssue;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("bad mode: {0}")]
    BadMode(String),

    #[error("range exceeded: {0}")]
    RangeExceeded(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("admin token required")]
    AdminRequired,

    #[error("request_id conflict with different payload (task {task_id})")]
    IdempotencyConflict { task_id: String },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("task queue is full")]
    QueueFull,

    #[error("llm {kind}: {message}")]
    Llm { kind: LlmErrorKind, message: String },

    #[error("poi provider: {0}")]
    PoiProvider(String),

    #[error("memory provider: {0}")]
    MemoryProvider(String),

    #[error("plan validation failed")]
    Validation(Vec<ValidationIssue>),

    #[error("planning failed: {0}")]
    PlanFailed(String),

    #[error("deep planning is disabled")]
    DeepUnsupported,

    #[error("deep planning failed: {0}")]
    DeepPlanFailed(String),

    #[error("storage conflict: {0}")]
    DbConflict(String),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("worker restarted before task finished")]
    WorkerRestart,

    #[error("{0}")]
    Internal(String),
}

/// Sub-kind for LLM failures, mirrored into metrics and tool traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    Timeout,
    RateLimit,
    ProviderError,
    InvalidOutput,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::ProviderError => "provider_error",
            Self::InvalidOutput => "invalid_output",
        })
    }
}

impl Error {
    /// Stable machine-readable kind, used in API payloads and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::InvalidParams(_) => "invalid_params",
            Self::BadMode(_) => "bad_mode",
            Self::RangeExceeded(_) => "range_exceeded",
            Self::NotFound(_) => "not_found",
            Self::NotAuthorized(_) => "not_authorized",
            Self::AdminRequired => "admin_required",
            Self::IdempotencyConflict { .. } => "idempotency_conflict",
            Self::RateLimited(_) => "rate_limited",
            Self::QueueFull => "queue_full",
            Self::Llm { kind, .. } => match kind {
                LlmErrorKind::Timeout => "llm_timeout",
                LlmErrorKind::RateLimit => "llm_rate_limit",
                LlmErrorKind::ProviderError => "llm_provider_error",
                LlmErrorKind::InvalidOutput => "llm_invalid_output",
            },
            Self::PoiProvider(_) => "poi_provider_error",
            Self::MemoryProvider(_) => "memory_provider_error",
            Self::Validation(_) => "plan_validation_failed",
            Self::PlanFailed(_) => "plan_failed",
            Self::DeepUnsupported => "deep_unsupported",
            Self::DeepPlanFailed(_) => "deep_plan_failed",
            Self::DbConflict(_) => "db_conflict",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::Cancelled => "cancelled",
            Self::WorkerRestart => "worker_restart",
            Self::Internal(_) => "internal",
        }
    }

    /// Numeric code per the external contract. `0` is reserved for success
    /// and never returned here.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) | Self::RangeExceeded(_) => 14070,
            Self::NotFound(_) => 14072,
            Self::Validation(_) | Self::PlanFailed(_) => 14079,
            Self::BadMode(_) => 14080,
            Self::DeepUnsupported => 14081,
            Self::NotAuthorized(_) => 14084,
            Self::IdempotencyConflict { .. } => 14086,
            Self::RateLimited(_) | Self::QueueFull => 14087,
            Self::DbConflict(_) | Self::PersistenceFailed(_) => 14088,
            Self::DeepPlanFailed(_) => 14089,
            Self::AdminRequired => 2001,
            Self::Llm { .. } => 3001,
            Self::PoiProvider(_) => 3002,
            Self::MemoryProvider(_) => 3003,
            Self::Cancelled | Self::WorkerRestart => 1010,
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => 1000,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
