//! Tool traces and trace-id helpers. A trace id correlates logs, metrics,
//! tool traces and API responses for one logical operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One node/tool invocation within a turn or planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolTrace {
    pub node: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl ToolTrace {
    pub fn ok(node: &str, latency_ms: Option<f64>, detail: Value) -> Self {
        Self {
            node: node.to_owned(),
            status: "ok".into(),
            latency_ms,
            detail,
        }
    }

    pub fn failed(node: &str, latency_ms: Option<f64>, error: &str) -> Self {
        Self {
            node: node.to_owned(),
            status: "failed".into(),
            latency_ms,
            detail: serde_json::json!({ "error": error }),
        }
    }

    pub fn skipped(node: &str, reason: &str) -> Self {
        Self {
            node: node.to_owned(),
            status: "skipped".into(),
            latency_ms: None,
            detail: serde_json::json!({ "reason": reason }),
        }
    }
}

/// Mint a new trace id like `plan-3f9c1a2b4d5e`.
pub fn new_trace_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_constructors() {
        let t = ToolTrace::ok("poi_around", Some(12.5), serde_json::json!({"count": 3}));
        assert_eq!(t.status, "ok");
        let t = ToolTrace::skipped("poi_around", "missing_location");
        assert_eq!(t.detail["reason"], "missing_location");
        let t = ToolTrace::failed("weather_area", None, "timeout");
        assert_eq!(t.status, "failed");
    }

    #[test]
    fn trace_id_shape() {
        let id = new_trace_id("plan");
        assert!(id.starts_with("plan-"));
        assert_eq!(id.len(), "plan-".len() + 12);
    }
}
