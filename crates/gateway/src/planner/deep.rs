//! LLM-assisted itinerary generator (`mode=deep`).
//!
//! The run is a bounded state machine: seed the skeleton with the fast
//! planner, generate one DayCard per LLM call with per-day validation and
//! retries, aggregate, validate globally with cross-day dedup, repair the
//! offending day once, and fall back to the skeleton when configured.
//! The LLM never drives control flow; every transition is explicit.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde_json::{json, Value};

use wf_domain::config::{Config, OutlineSource};
use wf_domain::memory::MemoryLevel;
use wf_domain::plan::{PlanDayCard, PlanRequest, PoiRef, Preferences, TripPlan};
use wf_domain::trace::ToolTrace;
use wf_domain::validator::{PlanValidator, ValidationContext};
use wf_domain::{Error, LlmErrorKind, Result};
use wf_llm::{ChatMessage, ChatRequest, LlmProvider};
use wf_memory::MemoryService;

use crate::geocode::GeocodeService;
use crate::metrics::MetricsRegistry;
use crate::planner::fast::FastPlanner;
use crate::poi::PoiService;
use crate::prompts::PromptRegistry;

pub const PLANNER_NAME: &str = "deep_llm_v1";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct DeepPlanOutcome {
    pub plan: TripPlan,
    pub metrics: Value,
    pub tool_traces: Vec<ToolTrace>,
    pub pseudo_center: bool,
}

#[derive(Default)]
struct LlmCounters {
    calls: u64,
    retries: u64,
    latency_ms: f64,
    tokens_total: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DeepPlanner {
    config: Arc<Config>,
    fast: Arc<FastPlanner>,
    poi: Arc<PoiService>,
    geocode: Arc<GeocodeService>,
    llm: Arc<dyn LlmProvider>,
    memory: Arc<MemoryService>,
    prompts: Arc<PromptRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl DeepPlanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        fast: Arc<FastPlanner>,
        poi: Arc<PoiService>,
        geocode: Arc<GeocodeService>,
        llm: Arc<dyn LlmProvider>,
        memory: Arc<MemoryService>,
        prompts: Arc<PromptRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            fast,
            poi,
            geocode,
            llm,
            memory,
            prompts,
            metrics,
        }
    }

    pub async fn plan(&self, request: &PlanRequest, trace_id: &str) -> Result<DeepPlanOutcome> {
        if !self.config.deep.enabled {
            return Err(Error::DeepUnsupported);
        }
        let max_days = self.config.deep.max_days.min(self.config.planner.max_days);
        request.validate(max_days)?;

        let merged_prefs = self.merge_preferences_from_memory(request).await;
        let request = PlanRequest {
            preferences: merged_prefs,
            ..request.clone()
        };

        match self.plan_inner(&request, trace_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if self.config.deep.fallback_to_fast => {
                tracing::warn!(trace_id, error = %e, "deep planning failed, falling back to fast");
                let traces = vec![ToolTrace::ok(
                    "planner_deep_fallback",
                    None,
                    json!({ "reason": truncated(&e.to_string(), 200) }),
                )];
                let fallback = self.fast.plan(&request).await?;
                Ok(DeepPlanOutcome {
                    plan: fallback.plan,
                    metrics: json!({
                        "planner": PLANNER_NAME,
                        "prompt_version": self.config.deep.prompt_version,
                        "fallback_to_fast": true,
                        "fallback_planner": fallback.metrics["planner"],
                        "fallback_reason": truncated(&e.to_string(), 200),
                    }),
                    tool_traces: traces,
                    pseudo_center: fallback.pseudo_center,
                })
            }
            Err(e @ Error::RangeExceeded(_)) | Err(e @ Error::InvalidParams(_)) => Err(e),
            Err(e) => Err(Error::DeepPlanFailed(truncated(&e.to_string(), 200).into())),
        }
    }

    async fn plan_inner(&self, request: &PlanRequest, trace_id: &str) -> Result<DeepPlanOutcome> {
        let t0 = Instant::now();
        let day_count = request.day_count() as u32;
        let mut traces: Vec<ToolTrace> = Vec::new();
        let mut counters = LlmCounters::default();

        // ── seed ────────────────────────────────────────────────────
        let outline_source = request.seed_mode.unwrap_or(self.config.deep.outline_source);
        let skeleton = match outline_source {
            OutlineSource::Fast => {
                let seed_t0 = Instant::now();
                let outcome = self.fast.plan(request).await?;
                traces.push(ToolTrace::ok(
                    "planner_seed_fast",
                    Some(elapsed_ms(seed_t0)),
                    json!({ "planner": outcome.metrics["planner"] }),
                ));
                Some(outcome)
            }
            // An LLM-generated outline is an accepted seed mode but the
            // per-day loop works from the bare request outline.
            OutlineSource::LlmOutline => None,
        };
        let pseudo_center = skeleton.as_ref().map(|s| s.pseudo_center).unwrap_or(false);

        let outline = build_outline(request, skeleton.as_ref().map(|s| &s.plan));
        let candidates = self.load_candidate_pois(request).await;

        let mut used_pois: HashSet<PoiRef> = HashSet::new();
        let day_window = self.config.planner.parse_day_window();
        let day_ctx = ValidationContext {
            expected_days: day_count,
            start_date: request.start_date,
            require_unique_pois: true,
            day_window,
        };

        // ── per-day loop ────────────────────────────────────────────
        let mut day_cards: Vec<PlanDayCard> = Vec::with_capacity(day_count as usize);
        let mut day_summaries: Vec<Value> = Vec::new();
        let mut partial_fallback_days: Vec<u32> = Vec::new();

        for day_index in 0..day_count {
            let date = request.start_date + ChronoDuration::days(i64::from(day_index));
            let generated = self
                .generate_day_with_retries(
                    request,
                    day_index,
                    date,
                    &outline,
                    &day_summaries,
                    &candidates,
                    &used_pois,
                    &day_ctx,
                    &mut counters,
                    &mut traces,
                )
                .await;

            let card = match generated {
                Ok(card) => card,
                Err(e) => {
                    let skeleton_day = skeleton
                        .as_ref()
                        .and_then(|s| s.plan.day_cards.get(day_index as usize).cloned());
                    match skeleton_day {
                        Some(day) if self.config.deep.fallback_to_fast => {
                            partial_fallback_days.push(day_index);
                            traces.push(ToolTrace::ok(
                                "planner_deep_day_fallback",
                                None,
                                json!({ "day_index": day_index }),
                            ));
                            day
                        }
                        _ => return Err(e),
                    }
                }
            };

            for sub in &card.sub_trips {
                if let Some(poi) = sub.poi_ref() {
                    used_pois.insert(poi);
                }
            }
            day_summaries.push(summarize_day(&card));
            day_cards.push(card);
        }

        // ── aggregate + global validation ───────────────────────────
        let mut plan = assemble_trip(request, day_cards, skeleton.as_ref().map(|s| &s.plan));
        let global_ctx = ValidationContext {
            require_unique_pois: true,
            ..day_ctx.clone()
        };
        let mut issues = PlanValidator::validate_trip(&plan, &global_ctx);
        if !issues.is_empty() {
            // Single-day repair: regenerate the first offending day once.
            if let Some(day_index) = first_offending_day(&issues) {
                traces.push(ToolTrace::ok(
                    "plan_repair",
                    None,
                    json!({ "day_index": day_index }),
                ));
                let date = request.start_date + ChronoDuration::days(i64::from(day_index));
                let other_pois = pois_excluding_day(&plan, day_index);
                let summaries: Vec<Value> =
                    plan.day_cards.iter().map(summarize_day).collect();
                if let Ok(card) = self
                    .generate_day_with_retries(
                        request,
                        day_index,
                        date,
                        &outline,
                        &summaries,
                        &candidates,
                        &other_pois,
                        &day_ctx,
                        &mut counters,
                        &mut traces,
                    )
                    .await
                {
                    plan.day_cards[day_index as usize] = card;
                    plan.recount();
                }
                issues = PlanValidator::validate_trip(&plan, &global_ctx);
            }
        }
        if !issues.is_empty() {
            return Err(Error::Validation(issues));
        }
        traces.push(ToolTrace::ok("plan_validate_global", None, Value::Null));

        self.write_plan_summary(request, &plan, trace_id).await;

        let metrics = json!({
            "planner": PLANNER_NAME,
            "prompt_version": self.config.deep.prompt_version,
            "seed_mode": request.seed_mode,
            "fallback_to_fast": false,
            "fallback": { "partial_days": partial_fallback_days },
            "candidate_pois": candidates.len(),
            "llm_calls": counters.calls,
            "llm_retries": counters.retries,
            "llm_latency_ms": round2(counters.latency_ms),
            "llm_tokens_total": counters.tokens_total,
            "latency_ms": round2(elapsed_ms(t0)),
            "saved": request.save,
        });

        Ok(DeepPlanOutcome {
            plan,
            metrics,
            tool_traces: traces,
            pseudo_center,
        })
    }

    // ── per-day generation ──────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn generate_day_with_retries(
        &self,
        request: &PlanRequest,
        day_index: u32,
        date: NaiveDate,
        outline: &Value,
        context: &[Value],
        candidates: &[Value],
        used_pois: &HashSet<PoiRef>,
        day_ctx: &ValidationContext,
        counters: &mut LlmCounters,
        traces: &mut Vec<ToolTrace>,
    ) -> Result<PlanDayCard> {
        let attempts = self.config.deep.retries + 1;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                counters.retries += 1;
            }
            let t0 = Instant::now();
            let result = self
                .call_llm_plan_day(request, day_index, date, outline, context, candidates, used_pois)
                .await;

            match result {
                Ok((card, tokens, latency_ms)) => {
                    counters.calls += 1;
                    counters.latency_ms += latency_ms;
                    counters.tokens_total += tokens;
                    self.metrics.record_ai_call(true, None, latency_ms);

                    let issues = PlanValidator::validate_day(&card, day_index, day_ctx, used_pois);
                    if issues.is_empty() {
                        traces.push(ToolTrace::ok(
                            "planner_deep_day",
                            Some(elapsed_ms(t0)),
                            json!({ "day_index": day_index, "attempt": attempt + 1 }),
                        ));
                        traces.push(ToolTrace::ok(
                            "plan_validate",
                            None,
                            json!({ "day_index": day_index }),
                        ));
                        return Ok(card);
                    }
                    last_error = format!(
                        "validation failed: {}",
                        issues
                            .iter()
                            .map(|i| i.message.as_str())
                            .collect::<Vec<_>>()
                            .join("; ")
                    );
                    traces.push(ToolTrace::failed(
                        "planner_deep_day",
                        Some(elapsed_ms(t0)),
                        truncated(&last_error, 200),
                    ));
                }
                Err(e) => {
                    if let Error::Llm { .. } = e {
                        counters.calls += 1;
                    }
                    self.metrics
                        .record_ai_call(false, Some(e.kind()), elapsed_ms(t0));
                    last_error = e.to_string();
                    traces.push(ToolTrace::failed(
                        "planner_deep_day",
                        Some(elapsed_ms(t0)),
                        truncated(&last_error, 200),
                    ));
                }
            }
        }

        Err(Error::DeepPlanFailed(format!(
            "day_index={day_index} generation failed: {}",
            truncated(&last_error, 200)
        )))
    }

    async fn call_llm_plan_day(
        &self,
        request: &PlanRequest,
        day_index: u32,
        date: NaiveDate,
        outline: &Value,
        context: &[Value],
        candidates: &[Value],
        used_pois: &HashSet<PoiRef>,
    ) -> Result<(PlanDayCard, u64, f64)> {
        let deep = &self.config.deep;
        let system = self.prompts.get("planner.deep.day").await?;

        let recent = bounded_context(context, deep.context_max_days, deep.context_max_chars);
        let mut used: Vec<&PoiRef> = used_pois.iter().collect();
        used.sort_by(|a, b| (&a.provider, &a.provider_id).cmp(&(&b.provider, &b.provider_id)));

        let payload = json!({
            "destination": request.destination,
            "start_date": request.start_date,
            "end_date": request.end_date,
            "preferences": request.preferences,
            "day_index": day_index,
            "date": date,
            "outline": outline,
            "accepted_days": recent,
            "candidate_pois": candidates,
            "used_pois": used,
        });

        let response = self
            .llm
            .chat(ChatRequest {
                messages: vec![
                    ChatMessage {
                        role: system.role.clone(),
                        content: system.content.clone(),
                    },
                    ChatMessage::user(payload.to_string()),
                ],
                model: deep.model.clone(),
                temperature: Some(deep.temperature),
                max_tokens: Some(deep.max_tokens),
                json_mode: true,
                timeout_s: Some(deep.timeout_s),
            })
            .await?;

        let card: PlanDayCard = serde_json::from_str(response.content.trim()).map_err(|e| {
            Error::Llm {
                kind: LlmErrorKind::InvalidOutput,
                message: format!("day card parse failed: {e}"),
            }
        })?;
        Ok((card, response.tokens_total(), response.latency_ms))
    }

    // ── candidates ──────────────────────────────────────────────────

    async fn load_candidate_pois(&self, request: &PlanRequest) -> Vec<Value> {
        let max_pois = self.config.deep.max_pois.max(1);
        let interests = request.preferences.effective_interests();
        let center = match self.geocode.resolve_city_center(&request.destination).await {
            Ok(center) => center,
            Err(_) => return Vec::new(),
        };

        let per_type = (max_pois / interests.len().max(1)).max(5);
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut out = Vec::new();
        for interest in interests.iter().take(6) {
            let Ok((items, _meta)) = self
                .poi
                .get_poi_around(
                    center.point.lat,
                    center.point.lng,
                    Some(interest),
                    None,
                    per_type.min(30),
                )
                .await
            else {
                continue;
            };
            for item in items {
                if item.provider_id.is_empty() || !seen.insert(item.key()) {
                    continue;
                }
                out.push(json!({
                    "provider": item.provider,
                    "provider_id": item.provider_id,
                    "name": item.name,
                    "category": item.category,
                    "addr": item.addr,
                    "rating": item.rating,
                    "lat": item.lat,
                    "lng": item.lng,
                    "distance_m": item.distance_m,
                }));
                if out.len() >= max_pois {
                    return out;
                }
            }
        }
        out
    }

    // ── memory integration ──────────────────────────────────────────

    /// Merge stored travel preferences into the request: stored interests
    /// replace the defaults (never an explicit choice), pace/budget fill
    /// gaps only.
    async fn merge_preferences_from_memory(&self, request: &PlanRequest) -> Preferences {
        let mut merged = request.preferences.clone();
        let items = self
            .memory
            .search(
                request.user_id,
                MemoryLevel::User,
                "travel_preferences",
                None,
                None,
                3,
            )
            .await;

        let stored = items.iter().find_map(|item| {
            item.metadata
                .get("preferences")
                .cloned()
                .or_else(|| {
                    serde_json::from_str::<Value>(&item.text)
                        .ok()
                        .and_then(|v| v.get("preferences").cloned())
                })
                .filter(Value::is_object)
        });
        let Some(stored) = stored else {
            return merged;
        };

        if merged.is_default_interests() {
            if let Some(interests) = stored.get("interests").and_then(Value::as_array) {
                let parsed: Vec<String> = interests
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect();
                if !parsed.is_empty() {
                    merged.interests = parsed;
                }
            }
        }
        if merged.pace.is_none() {
            merged.pace = stored.get("pace").and_then(Value::as_str).map(str::to_owned);
        }
        if merged.budget_level.is_none() {
            merged.budget_level = stored
                .get("budget_level")
                .and_then(Value::as_str)
                .map(str::to_owned);
        }
        merged
    }

    /// Persist a short plan summary at user level. Idempotent per
    /// `(user_id, request_id)`: a summary already stored for the same
    /// request id is not written again.
    async fn write_plan_summary(&self, request: &PlanRequest, plan: &TripPlan, trace_id: &str) {
        if let Some(request_id) = request.request_id.as_deref() {
            let existing = self
                .memory
                .search(request.user_id, MemoryLevel::User, request_id, None, None, 5)
                .await;
            if existing
                .iter()
                .any(|item| item.metadata.get("request_id").and_then(Value::as_str)
                    == Some(request_id))
            {
                return;
            }
        }

        let text = json!({
            "type": "plan_summary",
            "destination": request.destination,
            "day_count": plan.day_count,
            "preferences": request.preferences,
            "request_id": request.request_id,
            "trace_id": trace_id,
        })
        .to_string();
        self.memory
            .write(
                request.user_id,
                MemoryLevel::User,
                &text,
                None,
                None,
                json!({
                    "kind": "plan_summary",
                    "destination": request.destination,
                    "day_count": plan.day_count,
                    "request_id": request.request_id,
                    "trace_id": trace_id,
                }),
            )
            .await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_outline(request: &PlanRequest, skeleton: Option<&TripPlan>) -> Value {
    match skeleton {
        None => json!({
            "destination": request.destination,
            "start_date": request.start_date,
            "end_date": request.end_date,
            "day_count": request.day_count(),
        }),
        Some(plan) => json!({
            "source": "seed_fast",
            "destination": plan.destination,
            "day_count": plan.day_count,
            "days": plan
                .day_cards
                .iter()
                .map(|card| json!({
                    "day_index": card.day_index,
                    "date": card.date,
                    "activities": card
                        .sub_trips
                        .iter()
                        .take(4)
                        .map(|s| s.activity.clone())
                        .collect::<Vec<_>>(),
                }))
                .collect::<Vec<_>>(),
        }),
    }
}

/// Per-day summary fed back into later prompts.
fn summarize_day(card: &PlanDayCard) -> Value {
    let mut highlights = Vec::new();
    let mut used = Vec::new();
    for sub in card.sub_trips.iter().take(6) {
        let poi = sub.poi_ref();
        highlights.push(json!({
            "activity": sub.activity,
            "loc_name": sub.loc_name,
            "poi": poi,
        }));
        if let Some(poi) = poi {
            used.push(json!(poi));
        }
    }
    json!({
        "day_index": card.day_index,
        "date": card.date,
        "highlights": highlights,
        "used_pois": used,
    })
}

/// Last `max_days` summaries, dropping the oldest until the serialized
/// block fits `max_chars`.
fn bounded_context(context: &[Value], max_days: usize, max_chars: usize) -> Vec<Value> {
    let start = context.len().saturating_sub(max_days);
    let mut recent: Vec<Value> = context[start..].to_vec();
    while recent.len() > 1 {
        let size: usize = recent.iter().map(|v| v.to_string().len()).sum();
        if size <= max_chars {
            break;
        }
        recent.remove(0);
    }
    recent
}

fn assemble_trip(
    request: &PlanRequest,
    day_cards: Vec<PlanDayCard>,
    skeleton: Option<&TripPlan>,
) -> TripPlan {
    let mut meta = json!({
        "planner": {
            "mode": "deep",
            "name": PLANNER_NAME,
        }
    });
    if let Some(seed_mode) = request.seed_mode {
        meta["planner"]["seed_mode"] = json!(seed_mode);
    }
    if let Some(rules) = skeleton.and_then(|s| s.meta["planner"]["rules_version"].as_str()) {
        meta["planner"]["seed_rules_version"] = json!(rules);
    }

    let mut plan = TripPlan {
        id: None,
        user_id: request.user_id,
        title: format!("{} itinerary", request.destination),
        destination: request.destination.clone(),
        start_date: request.start_date,
        end_date: request.end_date,
        status: "draft".into(),
        meta,
        day_cards,
        day_count: 0,
        sub_trip_count: 0,
    };
    plan.recount();
    plan
}

/// Day index of the first issue whose path points into `day_cards[..]`.
fn first_offending_day(issues: &[wf_domain::validator::ValidationIssue]) -> Option<u32> {
    issues.iter().find_map(|issue| {
        let rest = issue.path.strip_prefix("day_cards[")?;
        let end = rest.find(']')?;
        rest[..end].parse().ok()
    })
}

fn pois_excluding_day(plan: &TripPlan, day_index: u32) -> HashSet<PoiRef> {
    plan.day_cards
        .iter()
        .filter(|card| card.day_index != day_index)
        .flat_map(|card| card.sub_trips.iter())
        .filter_map(|sub| sub.poi_ref())
        .collect()
}

fn elapsed_ms(t0: Instant) -> f64 {
    t0.elapsed().as_secs_f64() * 1000.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn truncated(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
