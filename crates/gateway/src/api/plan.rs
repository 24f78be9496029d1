//! Planner endpoints.
//!
//! - `POST /api/ai/plan`              — fast/deep planning, sync or async
//! - `GET  /api/ai/plan/tasks/:id`    — poll a deep-plan task

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use wf_domain::plan::{PlanMode, PlanRequest, PlanResponseData};

use crate::api::{admin, err, ok};
use crate::planner::TASK_KIND_DEEP_PLAN;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/ai/plan
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn create_plan(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Response {
    // Fast mode is always synchronous.
    let is_async = request.mode == PlanMode::Deep && request.async_;

    if !is_async {
        return match state.planner.plan(&request, None).await {
            Ok(data) => ok(data),
            Err(e) => err(&e, None),
        };
    }

    // Deep async: basic validation up front, then hand off to the engine.
    if !state.config.deep.enabled {
        return err(&wf_domain::Error::DeepUnsupported, None);
    }
    let max_days = state.config.deep.max_days.min(state.config.planner.max_days);
    if let Err(e) = request.validate(max_days) {
        return err(&e, None);
    }

    let payload = request.safe_payload(TASK_KIND_DEEP_PLAN);
    match state
        .tasks
        .submit(
            request.user_id,
            TASK_KIND_DEEP_PLAN,
            payload,
            request.request_id.as_deref(),
        )
        .await
    {
        Ok(outcome) => ok(PlanResponseData {
            mode: PlanMode::Deep,
            async_: true,
            request_id: request.request_id.clone(),
            seed_mode: request.seed_mode,
            task_id: Some(outcome.task_id),
            plan: None,
            metrics: json!({ "queued": true, "idempotent": outcome.idempotent }),
            tool_traces: vec![wf_domain::trace::ToolTrace::ok(
                "plan_task_enqueue",
                None,
                serde_json::Value::Null,
            )],
            trace_id: outcome.trace_id,
        }),
        Err(e) => err(&e, None),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/ai/plan/tasks/:task_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub user_id: Option<i64>,
    /// Admin token may also arrive as a query param.
    pub token: Option<String>,
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<TaskQuery>,
    headers: HeaderMap,
) -> Response {
    let is_admin = admin::is_admin_request(&state, &headers, query.token.as_deref());
    match state.tasks.get(&task_id, query.user_id, is_admin).await {
        Ok(task) => ok(json!({
            "task_id": task.id,
            "status": task.status,
            "result": task.result,
            "error": task.error,
            "created_at": task.created_at,
            "started_at": task.started_at,
            "finished_at": task.finished_at,
            "updated_at": task.updated_at,
            "trace_id": task.trace_id(),
        })),
        Err(e) => err(&e, None),
    }
}
