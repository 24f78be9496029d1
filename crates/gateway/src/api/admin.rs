//! Admin endpoints: metrics snapshots, task summaries, prompt
//! management. Guarded by a bearer-style token (constant-time compare
//! against a boot-time hash) with an optional IP allowlist fallback.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use wf_domain::Error;

use crate::api::{err, ok};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Admin check, in priority order: configured token (header
/// `X-Admin-Token` or `token` query param, hashed compare), then the IP
/// allowlist against `X-Real-IP`. With neither configured the endpoints
/// are open (dev mode).
pub fn is_admin_request(state: &AppState, headers: &HeaderMap, query_token: Option<&str>) -> bool {
    let allowed_ips = &state.config.admin.allowed_ips;

    if let Some(expected_hash) = &state.admin_token_hash {
        let provided = headers
            .get("x-admin-token")
            .and_then(|v| v.to_str().ok())
            .or(query_token)
            .unwrap_or("");
        let provided_hash = Sha256::digest(provided.as_bytes());
        if bool::from(provided_hash.as_slice().ct_eq(expected_hash.as_slice())) {
            return true;
        }
    }

    if !allowed_ips.is_empty() {
        if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            return allowed_ips.iter().any(|allowed| allowed == ip);
        }
        return false;
    }

    // Open only when no auth mechanism is configured at all.
    state.admin_token_hash.is_none()
}

fn require_admin(state: &AppState, headers: &HeaderMap, query_token: Option<&str>) -> Option<Response> {
    if is_admin_request(state, headers, query_token) {
        None
    } else {
        Some(err(&Error::AdminRequired, None))
    }
}

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    pub token: Option<String>,
    /// Optional window (seconds) for metric snapshots.
    pub window_s: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /admin/plan/summary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn plan_summary(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = require_admin(&state, &headers, query.token.as_deref()) {
        return denied;
    }
    let counters = state.memory.counters();
    let snapshot = match query.window_s {
        Some(seconds) => state
            .metrics
            .snapshot_window(seconds, counters.calls, counters.errors),
        None => state.metrics.snapshot(counters.calls, counters.errors),
    };
    ok(snapshot)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /admin/ai/tasks/summary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn tasks_summary(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = require_admin(&state, &headers, query.token.as_deref()) {
        return denied;
    }
    match state.tasks.summary(20).await {
        Ok(summary) => ok(summary),
        Err(e) => err(&e, None),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt management
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_prompts(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = require_admin(&state, &headers, query.token.as_deref()) {
        return denied;
    }
    match state.prompts.list().await {
        Ok(rows) => ok(json!({ "prompts": rows })),
        Err(e) => err(&e, None),
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptUpdateBody {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub updated_by: Option<String>,
}

pub async fn update_prompt(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<PromptUpdateBody>,
) -> Response {
    if let Some(denied) = require_admin(&state, &headers, query.token.as_deref()) {
        return denied;
    }
    match state
        .prompts
        .update(&key, body.content, body.tags, body.updated_by)
        .await
    {
        Ok(record) => ok(record),
        Err(e) => err(&e, None),
    }
}

pub async fn reset_prompt(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<AdminQuery>,
    headers: HeaderMap,
) -> Response {
    if let Some(denied) = require_admin(&state, &headers, query.token.as_deref()) {
        return denied;
    }
    match state.prompts.reset(&key).await {
        Ok(record) => ok(record),
        Err(e) => err(&e, None),
    }
}
