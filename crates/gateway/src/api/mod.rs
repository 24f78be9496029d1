//! HTTP surface: unified `{code, msg, data}` response wrapper, router
//! assembly, per-route metrics, and the admin guard.

pub mod admin;
pub mod chat;
pub mod plan;
pub mod poi;
pub mod ws;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Serialize;
use serde_json::json;

use wf_domain::Error;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unified response wrapper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every endpoint answers `{code, msg, data}`; `code = 0` is success.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    Json(ApiResponse {
        code: 0,
        msg: "ok".into(),
        data: Some(data),
    })
    .into_response()
}

/// Map a domain error to the wrapper. HTTP status stays 200 — clients
/// dispatch on `code`, never on transport status.
pub fn err(error: &Error, trace_id: Option<&str>) -> Response {
    let mut data = json!({ "kind": error.kind() });
    if let Some(trace_id) = trace_id {
        data["trace_id"] = json!(trace_id);
    }
    if let Error::IdempotencyConflict { task_id } = error {
        data["task_id"] = json!(task_id);
    }
    Json(ApiResponse {
        code: error.code(),
        msg: error.to_string(),
        data: Some(data),
    })
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ai/plan", post(plan::create_plan))
        .route("/api/ai/plan/tasks/:task_id", get(plan::get_task))
        .route("/api/ai/chat", post(chat::chat))
        .route("/api/poi/around", get(poi::around))
        .route("/ws/assistant", get(ws::assistant_ws))
        .route("/admin/plan/summary", get(admin::plan_summary))
        .route("/admin/ai/tasks/summary", get(admin::tasks_summary))
        .route("/admin/ai/prompts", get(admin::list_prompts))
        .route("/admin/ai/prompts/:key", put(admin::update_prompt))
        .route("/admin/ai/prompts/:key/reset", post(admin::reset_prompt))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            record_api_metrics,
        ))
        .with_state(state)
}

/// Per-route counters: `api.<method>.<path>` with latency.
async fn record_api_metrics(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());
    let t0 = std::time::Instant::now();
    let response = next.run(request).await;
    state
        .metrics
        .record_api(&method, &path, t0.elapsed().as_secs_f64() * 1000.0);
    response
}
