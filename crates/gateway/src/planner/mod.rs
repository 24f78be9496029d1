//! Unified planning entry point: dispatches by mode, persists on demand,
//! and records per-call metrics. Deep async submissions go through the
//! task engine; the worker funnels back into [`PlanService::plan`] via
//! the [`crate::runtime::tasks::TaskHandler`] seam.

pub mod deep;
pub mod fast;

pub use deep::{DeepPlanOutcome, DeepPlanner, PLANNER_NAME};
pub use fast::{FastPlanOutcome, FastPlanner, RULES_VERSION};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};

use wf_domain::config::Config;
use wf_domain::plan::{PlanMode, PlanRequest, PlanResponseData, TripPlan};
use wf_domain::trace::{new_trace_id, ToolTrace};
use wf_domain::{Error, Result};
use wf_storage::{Storage, TripStore};

use crate::metrics::{MetricsRegistry, PlanCallSummary};
use crate::runtime::tasks::TaskHandler;

/// Task kind executed by the worker pool.
pub const TASK_KIND_DEEP_PLAN: &str = "plan:deep";

pub struct PlanService {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    fast: Arc<FastPlanner>,
    deep: Arc<DeepPlanner>,
    metrics: Arc<MetricsRegistry>,
}

impl PlanService {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        fast: Arc<FastPlanner>,
        deep: Arc<DeepPlanner>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            storage,
            fast,
            deep,
            metrics,
        }
    }

    /// Synchronous planning paths (`fast`, and `deep` with `async=false`).
    /// Deep async requests never reach this; the API submits them to the
    /// task engine instead.
    pub async fn plan(
        &self,
        request: &PlanRequest,
        trace_id: Option<String>,
    ) -> Result<PlanResponseData> {
        let trace_id = trace_id.unwrap_or_else(|| new_trace_id("plan"));
        let t0 = Instant::now();

        let result = self.plan_dispatch(request, &trace_id).await;
        let latency_ms = (t0.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

        match result {
            Ok((plan, mut metrics, tool_traces, pseudo_center)) => {
                let (plan, saved_trip_id) = if request.save {
                    let persisted = self.persist(&plan).await?;
                    let id = persisted.id;
                    (persisted, id)
                } else {
                    (plan, None)
                };

                metrics["latency_ms"] = json!(latency_ms);
                metrics["saved"] = json!(request.save);
                if let Some(id) = saved_trip_id {
                    metrics["trip_id"] = json!(id);
                }
                let tokens = metrics["llm_tokens_total"].as_u64().unwrap_or(0);
                let fallback = metrics["fallback_to_fast"].as_bool().unwrap_or(false);
                self.metrics.record_plan(
                    request.mode,
                    PlanCallSummary {
                        trace_id: trace_id.clone(),
                        destination: request.destination.clone(),
                        days: request.day_count(),
                        latency_ms,
                        success: true,
                        error: None,
                        fallback_to_fast: fallback,
                        at: Utc::now(),
                    },
                    tokens,
                    pseudo_center,
                );

                Ok(PlanResponseData {
                    mode: request.mode,
                    async_: false,
                    request_id: request.request_id.clone(),
                    seed_mode: request.seed_mode,
                    task_id: None,
                    plan: Some(plan),
                    metrics,
                    tool_traces,
                    trace_id: Some(trace_id),
                })
            }
            Err(e) => {
                self.metrics.record_plan(
                    request.mode,
                    PlanCallSummary {
                        trace_id: trace_id.clone(),
                        destination: request.destination.clone(),
                        days: request.day_count(),
                        latency_ms,
                        success: false,
                        error: Some(e.kind().to_owned()),
                        fallback_to_fast: false,
                        at: Utc::now(),
                    },
                    0,
                    false,
                );
                Err(e)
            }
        }
    }

    async fn plan_dispatch(
        &self,
        request: &PlanRequest,
        trace_id: &str,
    ) -> Result<(TripPlan, Value, Vec<ToolTrace>, bool)> {
        match request.mode {
            PlanMode::Fast => {
                let outcome = self.fast.plan(request).await?;
                Ok((outcome.plan, outcome.metrics, Vec::new(), outcome.pseudo_center))
            }
            PlanMode::Deep if request.async_ => Err(Error::BadMode(
                "deep async requests must be submitted as tasks".into(),
            )),
            PlanMode::Deep => {
                if !self.config.deep.enabled {
                    return Err(Error::DeepUnsupported);
                }
                let outcome = self.deep.plan(request, trace_id).await?;
                Ok((
                    outcome.plan,
                    outcome.metrics,
                    outcome.tool_traces,
                    outcome.pseudo_center,
                ))
            }
        }
    }

    /// One short insert for trip + cards + sub-trips. Conflicts surface
    /// as structured errors; nothing is half-written.
    async fn persist(&self, plan: &TripPlan) -> Result<TripPlan> {
        match self.storage.insert_plan(plan).await {
            Ok(persisted) => Ok(persisted),
            Err(e @ Error::DbConflict(_)) => Err(e),
            Err(e) => Err(Error::PersistenceFailed(e.to_string())),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task handler — deep plans executed by the worker pool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl TaskHandler for PlanService {
    fn kind(&self) -> &'static str {
        TASK_KIND_DEEP_PLAN
    }

    async fn execute(&self, payload: &Value) -> Result<Value> {
        let mut request: PlanRequest = serde_json::from_value(payload.clone())
            .map_err(|e| Error::InvalidParams(format!("task payload: {e}")))?;
        // The worker always runs the synchronous deep path.
        request.mode = PlanMode::Deep;
        request.async_ = false;

        let trace_id = payload
            .get("trace_id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let response = self.plan(&request, trace_id).await?;
        Ok(serde_json::to_value(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::GeocodeService;
    use crate::poi::{InMemoryPoiCache, MockPoiProvider, PoiService};
    use crate::prompts::PromptRegistry;
    use chrono::NaiveDate;
    use tokio::sync::Semaphore;
    use wf_domain::plan::Preferences;
    use wf_llm::MockLlmProvider;
    use wf_memory::{LocalMemoryEngine, MemoryService};
    use wf_storage::MemoryStorage;

    fn service(llm: Arc<MockLlmProvider>) -> (PlanService, Arc<MemoryStorage>) {
        let config = Arc::new(Config::default());
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let poi = Arc::new(PoiService::new(
            config.poi.clone(),
            storage.clone(),
            Arc::new(InMemoryPoiCache::new(64)),
            Arc::new(MockPoiProvider),
            metrics.clone(),
            Arc::new(Semaphore::new(4)),
        ));
        let geocode = Arc::new(GeocodeService::new(&config.geocode, None));
        let fast = Arc::new(FastPlanner::new(
            config.clone(),
            storage.clone(),
            poi.clone(),
            geocode.clone(),
        ));
        let memory = Arc::new(MemoryService::new(Arc::new(LocalMemoryEngine::new())));
        let prompts = Arc::new(PromptRegistry::new(storage.clone(), 60));
        let deep = Arc::new(DeepPlanner::new(
            config.clone(),
            fast.clone(),
            poi,
            geocode,
            llm,
            memory,
            prompts,
            metrics.clone(),
        ));
        (
            PlanService::new(config, storage.clone(), fast, deep, metrics),
            storage,
        )
    }

    fn request(mode: PlanMode, save: bool) -> PlanRequest {
        PlanRequest {
            user_id: 1,
            destination: "Guangzhou".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 2).unwrap(),
            mode,
            save,
            preferences: Preferences {
                interests: vec!["food".into(), "sight".into()],
                pace: Some("normal".into()),
                ..Preferences::default()
            },
            people_count: None,
            seed: Some(42),
            async_: false,
            request_id: None,
            seed_mode: None,
        }
    }

    #[tokio::test]
    async fn fast_plan_inline() {
        let (service, _) = service(Arc::new(MockLlmProvider::new()));
        let response = service
            .plan(&request(PlanMode::Fast, false), None)
            .await
            .unwrap();
        assert!(response.plan.is_some());
        assert!(response.task_id.is_none());
        assert!(response.trace_id.is_some());
        assert_eq!(response.metrics["saved"], false);
        assert_eq!(response.plan.unwrap().day_cards.len(), 2);
    }

    #[tokio::test]
    async fn save_persists_and_returns_trip_id() {
        let (service, storage) = service(Arc::new(MockLlmProvider::new()));
        let response = service
            .plan(&request(PlanMode::Fast, true), None)
            .await
            .unwrap();
        let plan = response.plan.unwrap();
        let trip_id = plan.id.expect("persisted plan carries an id");

        let fetched = storage.fetch_trip(trip_id).await.unwrap().unwrap();
        assert_eq!(fetched.day_cards.len(), plan.day_cards.len());
        assert_eq!(fetched.sub_trip_count, plan.sub_trip_count);
    }

    #[tokio::test]
    async fn deep_async_is_rejected_inline() {
        let (service, _) = service(Arc::new(MockLlmProvider::new()));
        let mut req = request(PlanMode::Deep, false);
        req.async_ = true;
        let err = service.plan(&req, None).await.unwrap_err();
        assert_eq!(err.kind(), "bad_mode");
    }

    #[tokio::test]
    async fn failures_are_recorded_in_metrics() {
        let (service, _) = service(Arc::new(MockLlmProvider::new()));
        let mut req = request(PlanMode::Fast, false);
        req.end_date = req.start_date - chrono::Duration::days(1);
        assert!(service.plan(&req, None).await.is_err());

        let snap = service.metrics.snapshot(0, 0);
        assert_eq!(snap["plan"]["plan.fast"]["failures"], 1);
    }

    #[tokio::test]
    async fn task_handler_runs_deep_sync() {
        let llm = Arc::new(MockLlmProvider::with_handler(|_| {
            Err(wf_domain::Error::Llm {
                kind: wf_domain::LlmErrorKind::Timeout,
                message: "slow".into(),
            })
        }));
        let (service, _) = service(llm);
        let mut req = request(PlanMode::Deep, false);
        req.async_ = true; // handler forces sync
        let payload = req.safe_payload(TASK_KIND_DEEP_PLAN);
        let value = service.execute(&payload).await.unwrap();
        let response: PlanResponseData = serde_json::from_value(value).unwrap();
        // Per-day skeleton substitution keeps the result valid.
        assert!(response.plan.is_some());
    }
}
