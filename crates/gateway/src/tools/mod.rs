//! Tool registry: named tools with JSON-schema argument validation,
//! per-tool timeout/retry, and uniform failure capture.
//!
//! `invoke` never propagates an error — failures become a
//! `{status: "failed", error}` outcome plus a trace record, so a broken
//! tool degrades a turn instead of aborting it.

mod navigate;
mod poi_around;
mod trip_query;
mod weather;

pub use navigate::PathNavigateTool;
pub use poi_around::PoiAroundTool;
pub use trip_query::TripQueryTool;
pub use weather::WeatherAreaTool;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use wf_domain::trace::ToolTrace;
use wf_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static description of a tool: its name, a one-line description, and a
/// JSON-schema value for its arguments.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Per-invocation context threaded into every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: i64,
    pub trip_id: Option<i64>,
    pub trace_id: String,
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute with already-validated arguments, returning a normalized
    /// result object.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value>;

    /// Extra attempts after the first failure.
    fn retries(&self) -> u32 {
        0
    }
}

/// Outcome of one registry invocation.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub ok: bool,
    /// Normalized result on success, `{status: "failed", error}` otherwise.
    pub outcome: Value,
    pub trace: ToolTrace,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name;
        if self.tools.insert(name, tool).is_some() {
            tracing::warn!(tool = name, "duplicate tool registration replaced");
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor()).collect();
        out.sort_by_key(|d| d.name);
        out
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Validate, execute with timeout and per-tool retries, and fold any
    /// failure into the outcome.
    pub async fn invoke(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolInvocation {
        let t0 = Instant::now();
        let Some(tool) = self.get(name) else {
            return failed_invocation(name, t0, "tool_not_registered");
        };

        let descriptor = tool.descriptor();
        if let Err(reason) = validate_args(&descriptor.parameters, &args) {
            return failed_invocation(name, t0, &format!("invalid_args: {reason}"));
        }

        let attempts = tool.retries() + 1;
        let mut last_error = String::new();
        for attempt in 0..attempts {
            let run = tool.execute(args.clone(), ctx);
            match tokio::time::timeout(self.timeout, run).await {
                Ok(Ok(result)) => {
                    let latency_ms = elapsed_ms(t0);
                    return ToolInvocation {
                        name: name.to_owned(),
                        ok: true,
                        outcome: result,
                        trace: ToolTrace::ok(
                            name,
                            Some(latency_ms),
                            serde_json::json!({ "attempt": attempt + 1 }),
                        ),
                    };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timeout after {:?}", self.timeout),
            }
        }
        failed_invocation(name, t0, &last_error)
    }
}

fn elapsed_ms(t0: Instant) -> f64 {
    (t0.elapsed().as_secs_f64() * 100_000.0).round() / 100.0
}

fn failed_invocation(name: &str, t0: Instant, error: &str) -> ToolInvocation {
    ToolInvocation {
        name: name.to_owned(),
        ok: false,
        outcome: serde_json::json!({ "status": "failed", "error": error }),
        trace: ToolTrace::failed(name, Some(elapsed_ms(t0)), error),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate `args` against a parsed JSON-schema value. Covers the subset
/// the tool schemas use: object shape, required keys, primitive types,
/// enums, array item types, and numeric min/max.
pub fn validate_args(schema: &Value, args: &Value) -> std::result::Result<(), String> {
    validate_value(schema, args, "$")
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> std::result::Result<(), String> {
    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value not in enum"));
        }
        return Ok(());
    }

    match schema.get("type").and_then(Value::as_str) {
        Some("object") => {
            let Some(obj) = value.as_object() else {
                return Err(format!("{path}: expected object"));
            };
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for key in required.iter().filter_map(Value::as_str) {
                    if !obj.contains_key(key) {
                        return Err(format!("{path}.{key}: required"));
                    }
                }
            }
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (key, sub_schema) in props {
                    if let Some(sub_value) = obj.get(key) {
                        if sub_value.is_null() {
                            continue;
                        }
                        validate_value(sub_schema, sub_value, &format!("{path}.{key}"))?;
                    }
                }
            }
            Ok(())
        }
        Some("array") => {
            let Some(items) = value.as_array() else {
                return Err(format!("{path}: expected array"));
            };
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                if (items.len() as u64) < min {
                    return Err(format!("{path}: fewer than {min} items"));
                }
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
                if (items.len() as u64) > max {
                    return Err(format!("{path}: more than {max} items"));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_value(item_schema, item, &format!("{path}[{i}]"))?;
                }
            }
            Ok(())
        }
        Some("string") => value
            .is_string()
            .then_some(())
            .ok_or_else(|| format!("{path}: expected string")),
        Some("boolean") => value
            .is_boolean()
            .then_some(())
            .ok_or_else(|| format!("{path}: expected boolean")),
        Some("number") => {
            if !value.is_number() {
                return Err(format!("{path}: expected number"));
            }
            check_bounds(schema, value, path)
        }
        Some("integer") => {
            if value.as_i64().is_none() && value.as_u64().is_none() {
                return Err(format!("{path}: expected integer"));
            }
            check_bounds(schema, value, path)
        }
        _ => Ok(()),
    }
}

fn check_bounds(schema: &Value, value: &Value, path: &str) -> std::result::Result<(), String> {
    let v = value.as_f64().unwrap_or_default();
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if v < min {
            return Err(format!("{path}: below minimum {min}"));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if v > max {
            return Err(format!("{path}: above maximum {max}"));
        }
    }
    Ok(())
}
