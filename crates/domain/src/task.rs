//! Persisted async task records. The canonical status vocabulary is
//! `queued/running/succeeded/failed/canceled`; the legacy `pending/done`
//! pair is accepted on read and normalized, never emitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Map a stored status string (canonical or legacy) to the canonical
    /// enum. Unknown strings map to `Failed`.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "queued" | "pending" => Self::Queued,
            "running" => Self::Running,
            "succeeded" | "done" => Self::Succeeded,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Failed,
        }
    }

    /// Legal transitions are monotone except `queued → canceled`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Canceled)
                | (Self::Queued, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        })
    }
}

/// A durable task row. `payload` holds the request's safe subset
/// (including `request_id`, `trace_id`, `seed_mode`); `result` and
/// `error` never contain prompts or secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: i64,
    pub kind: String,
    pub status: TaskStatus,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: String, user_id: i64, kind: String, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            kind,
            status: TaskStatus::Queued,
            payload,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.payload.get("trace_id").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
    }

    #[test]
    fn legacy_statuses_normalize() {
        assert_eq!(TaskStatus::normalize("pending"), TaskStatus::Queued);
        assert_eq!(TaskStatus::normalize("done"), TaskStatus::Succeeded);
        assert_eq!(TaskStatus::normalize("cancelled"), TaskStatus::Canceled);
        assert_eq!(TaskStatus::normalize("garbage"), TaskStatus::Failed);
    }

    #[test]
    fn transitions_are_monotone() {
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Canceled));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Succeeded));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));

        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Canceled));
        assert!(!TaskStatus::Succeeded.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Queued));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
    }
}
