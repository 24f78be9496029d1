//! Persisted async task engine.
//!
//! Durable rows live in the task store (source of truth); an in-process
//! bounded queue feeds N worker coroutines. Submission is idempotent per
//! `(user_id, request_id)` via a deterministic task id, capped per user,
//! and survives restarts: `running` rows are failed with
//! `worker_restart`, `queued` rows are re-enqueued.
//!
//! The queue hides behind `submit`/worker internals so a distributed
//! backend can replace it without touching callers.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use wf_domain::config::TaskConfig;
use wf_domain::task::{TaskRecord, TaskStatus};
use wf_domain::trace::new_trace_id;
use wf_domain::{Error, Result};
use wf_storage::{Storage, TaskStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kind-specific task execution. Handlers must not hold a storage
/// transaction across their (potentially long) work.
#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn execute(&self, payload: &Value) -> Result<Value>;
}

/// Result of a submit call.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub task_id: String,
    pub trace_id: Option<String>,
    /// True when an existing row was returned instead of a new one.
    pub idempotent: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct TaskEngine {
    config: TaskConfig,
    storage: Arc<dyn Storage>,
    handlers: HashMap<&'static str, Arc<dyn TaskHandler>>,
    queue_tx: mpsc::Sender<String>,
    queue_rx: Mutex<Option<mpsc::Receiver<String>>>,
    workers: parking_lot::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl TaskEngine {
    pub fn new(config: TaskConfig, storage: Arc<dyn Storage>) -> Self {
        let config = config.clamped();
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_maxsize);
        Self {
            config,
            storage,
            handlers: HashMap::new(),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Recover interrupted tasks, then spawn the worker pool.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.recover().await?;

        let rx = self
            .queue_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::Internal("task engine already started".into()))?;
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = self.workers.lock();
        for worker_index in 0..self.config.worker_concurrency {
            let engine = Arc::clone(self);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(async move {
                loop {
                    let task_id = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match task_id {
                        Some(task_id) => engine.execute_task(&task_id, worker_index).await,
                        None => break,
                    }
                }
            }));
        }
        tracing::info!(
            concurrency = self.config.worker_concurrency,
            queue_maxsize = self.config.queue_maxsize,
            "task engine started"
        );
        Ok(())
    }

    pub fn stop(&self) {
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
        tracing::info!("task engine stopped");
    }

    // ── submit ──────────────────────────────────────────────────────

    /// Create (or idempotently return) a task for `kind`.
    ///
    /// Order of checks: known kind → idempotency by `(user_id,
    /// request_id)` → per-user concurrency cap → insert + enqueue.
    pub async fn submit(
        &self,
        user_id: i64,
        kind: &str,
        payload: Value,
        request_id: Option<&str>,
    ) -> Result<SubmitOutcome> {
        if !self.handlers.contains_key(kind) {
            return Err(Error::InvalidParams(format!("unknown task kind: {kind}")));
        }

        let task_id = build_task_id(kind, user_id, request_id);

        // Idempotency first: an existing row with a structurally equal
        // payload wins; a different payload is a conflict.
        if request_id.is_some() {
            if let Some(existing) = self.storage.get_task(&task_id).await? {
                return self.idempotent_outcome(existing, &payload);
            }
        }

        let active = self.storage.count_active_tasks(user_id, kind).await?;
        if active >= self.config.max_running_per_user {
            return Err(Error::RateLimited(format!(
                "{active} tasks already queued or running for user {user_id}"
            )));
        }

        let trace_id = new_trace_id("plan");
        let mut stored_payload = payload.clone();
        if let Some(map) = stored_payload.as_object_mut() {
            map.insert("trace_id".into(), json!(trace_id));
        }
        let record = TaskRecord::new(task_id.clone(), user_id, kind.to_owned(), stored_payload);

        match self.storage.insert_task(record).await {
            Ok(()) => {}
            Err(Error::DbConflict(_)) => {
                // Lost a race against a concurrent identical submit.
                let existing = self
                    .storage
                    .get_task(&task_id)
                    .await?
                    .ok_or_else(|| Error::PersistenceFailed("task row vanished".into()))?;
                return self.idempotent_outcome(existing, &payload);
            }
            Err(e) => return Err(e),
        }

        if let Err(e) = self.queue_tx.try_send(task_id.clone()) {
            // The row exists but can never run; fail it so pollers see a
            // terminal state instead of an eternal `queued`.
            self.storage
                .finish_task(
                    &task_id,
                    TaskStatus::Failed,
                    None,
                    Some(json!({ "type": "queue_error", "message": e.to_string() })),
                )
                .await?;
            return Err(Error::QueueFull);
        }

        tracing::info!(task_id = %task_id, user_id, kind, "task enqueued");
        Ok(SubmitOutcome {
            task_id,
            trace_id: Some(trace_id),
            idempotent: false,
        })
    }

    fn idempotent_outcome(&self, existing: TaskRecord, payload: &Value) -> Result<SubmitOutcome> {
        if !payloads_match(&existing.payload, payload) {
            return Err(Error::IdempotencyConflict {
                task_id: existing.id,
            });
        }
        Ok(SubmitOutcome {
            trace_id: existing.trace_id().map(str::to_owned),
            task_id: existing.id,
            idempotent: true,
        })
    }

    // ── polling ─────────────────────────────────────────────────────

    /// Fetch a task for a requester. Non-admin callers must own it.
    pub async fn get(
        &self,
        task_id: &str,
        requester_user_id: Option<i64>,
        is_admin: bool,
    ) -> Result<TaskRecord> {
        let task = self
            .storage
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if !is_admin {
            match requester_user_id {
                Some(user_id) if user_id == task.user_id => {}
                _ => {
                    return Err(Error::NotAuthorized(format!(
                        "task {task_id} is not owned by the requester"
                    )))
                }
            }
        }
        Ok(task)
    }

    /// Admin view: status distribution, completion latency p95, failure
    /// reasons, and the most recent rows.
    pub async fn summary(&self, last_n: usize) -> Result<Value> {
        let recent = self.storage.recent_tasks(200).await?;

        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut latencies: Vec<f64> = Vec::new();
        let mut failure_reasons: HashMap<String, u64> = HashMap::new();
        for task in &recent {
            *by_status.entry(task.status.to_string()).or_default() += 1;
            if let Some(finished) = task.finished_at {
                let ms = (finished - task.created_at).num_milliseconds() as f64;
                latencies.push(ms.max(0.0));
            }
            if task.status == TaskStatus::Failed {
                let reason = task
                    .error
                    .as_ref()
                    .and_then(|e| e.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_owned();
                *failure_reasons.entry(reason).or_default() += 1;
            }
        }
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let p95 = if latencies.is_empty() {
            0.0
        } else {
            let idx = ((latencies.len() as f64) * 0.95).ceil() as usize - 1;
            latencies[idx.min(latencies.len() - 1)]
        };

        Ok(json!({
            "status_counts": by_status,
            "latency_p95_ms": p95,
            "failure_reasons": failure_reasons,
            "recent": recent.iter().take(last_n).collect::<Vec<_>>(),
        }))
    }

    // ── worker internals ────────────────────────────────────────────

    async fn execute_task(&self, task_id: &str, worker_index: usize) {
        // Short claim transition; skip when another worker won or the
        // task was canceled while queued.
        let task = match self.storage.claim_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(task_id, error = %e, "task claim failed");
                return;
            }
        };
        let trace_id = task.trace_id().map(str::to_owned);

        let Some(handler) = self.handlers.get(task.kind.as_str()) else {
            let _ = self
                .storage
                .finish_task(
                    task_id,
                    TaskStatus::Failed,
                    None,
                    Some(json!({ "type": "unknown_kind", "message": task.kind })),
                )
                .await;
            return;
        };

        // The handler runs outside any storage transaction.
        match handler.execute(&task.payload).await {
            Ok(mut result) => {
                if let Some(map) = result.as_object_mut() {
                    map.insert("task_id".into(), json!(task_id));
                }
                if let Err(e) = self
                    .storage
                    .finish_task(task_id, TaskStatus::Succeeded, Some(result), None)
                    .await
                {
                    tracing::warn!(task_id, error = %e, "failed to record task success");
                }
                tracing::info!(task_id, worker = worker_index, trace_id = ?trace_id, "task succeeded");
            }
            Err(e) => {
                let error = json!({
                    "type": e.kind(),
                    "message": truncate(&e.to_string(), 500),
                    "code": e.code(),
                    "trace_id": trace_id,
                });
                if let Err(store_err) = self
                    .storage
                    .finish_task(task_id, TaskStatus::Failed, None, Some(error))
                    .await
                {
                    tracing::warn!(task_id, error = %store_err, "failed to record task failure");
                }
                tracing::warn!(task_id, worker = worker_index, error = %e, "task failed");
            }
        }
    }

    /// Restart recovery: fail interrupted `running` rows, re-enqueue
    /// `queued` rows, oldest first.
    async fn recover(&self) -> Result<()> {
        for kind in self.handlers.keys() {
            let unfinished = self.storage.list_unfinished_tasks(kind).await?;
            let mut requeued = 0usize;
            let mut failed = 0usize;
            for task in unfinished {
                match task.status {
                    TaskStatus::Running => {
                        self.storage
                            .finish_task(
                                &task.id,
                                TaskStatus::Failed,
                                None,
                                Some(json!({
                                    "type": Error::WorkerRestart.kind(),
                                    "message": "worker restarted before task finished",
                                })),
                            )
                            .await?;
                        failed += 1;
                    }
                    TaskStatus::Queued => {
                        if self.queue_tx.try_send(task.id.clone()).is_err() {
                            tracing::warn!(task_id = %task.id, "recovery queue full");
                            break;
                        }
                        requeued += 1;
                    }
                    _ => {}
                }
            }
            if requeued + failed > 0 {
                tracing::info!(kind, requeued, failed, "task recovery complete");
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deterministic task id: uuid5 over `(kind, user_id, request_id)` so a
/// retried submit lands on the same row; random otherwise.
fn build_task_id(kind: &str, user_id: i64, request_id: Option<&str>) -> String {
    match request_id {
        Some(request_id) => {
            let name = format!("wayfarer:ai_task:{kind}:{user_id}:{request_id}");
            let id = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_DNS, name.as_bytes());
            format!("at_{}", id.simple())
        }
        None => format!("at_{}", uuid::Uuid::new_v4().simple()),
    }
}

/// Structural payload equality ignoring the engine-assigned trace id.
fn payloads_match(stored: &Value, incoming: &Value) -> bool {
    let mut stored = stored.clone();
    if let Some(map) = stored.as_object_mut() {
        map.remove("trace_id");
    }
    let mut incoming = incoming.clone();
    if let Some(map) = incoming.as_object_mut() {
        map.remove("trace_id");
    }
    stored == incoming
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
