//! In-process metrics registry.
//!
//! Families: `api.<method>.<path>` (count, last duration, p95 over a
//! bounded ring), `plan.<mode>` (calls, failures, latency, tokens,
//! fallbacks, destination histogram, recent calls), `poi` (cache and
//! provider counters), `ai` (LLM call outcomes). `snapshot()` reports
//! lifetime values; `snapshot_window(seconds)` approximates a fixed
//! window from the event rings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use wf_domain::plan::PlanMode;

/// Latency events retained per family.
const RING_CAPACITY: usize = 256;
/// Call summaries retained per family.
const RECENT_CAPACITY: usize = 20;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event ring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct EventRing {
    events: std::collections::VecDeque<(Instant, f64)>,
}

impl EventRing {
    fn push(&mut self, latency_ms: f64) {
        if self.events.len() == RING_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back((Instant::now(), latency_ms));
    }

    fn stats(&self, window: Option<Duration>) -> RingStats {
        let cutoff = window.map(|w| Instant::now() - w);
        let mut values: Vec<f64> = self
            .events
            .iter()
            .filter(|(at, _)| cutoff.map_or(true, |c| *at >= c))
            .map(|(_, v)| *v)
            .collect();
        if values.is_empty() {
            return RingStats::default();
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let p95_idx = ((count as f64) * 0.95).ceil() as usize - 1;
        RingStats {
            count: count as u64,
            mean_ms: round2(mean),
            p95_ms: round2(values[p95_idx.min(count - 1)]),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
struct RingStats {
    count: u64,
    mean_ms: f64,
    p95_ms: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-family state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct ApiStat {
    count: u64,
    last_ms: f64,
    ring: EventRing,
}

/// Summary of one planner call, kept in a bounded recent list.
#[derive(Debug, Clone, Serialize)]
pub struct PlanCallSummary {
    pub trace_id: String,
    pub destination: String,
    pub days: i64,
    pub latency_ms: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fallback_to_fast: bool,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct PlanModeStat {
    calls: u64,
    failures: u64,
    days_total: u64,
    tokens_total: u64,
    fallbacks: u64,
    pseudo_centers: u64,
    destinations: HashMap<String, u64>,
    ring: EventRing,
    recent: std::collections::VecDeque<PlanCallSummary>,
}

#[derive(Default)]
struct AiStat {
    calls: u64,
    successes: u64,
    failures_by_type: HashMap<String, u64>,
    ring: EventRing,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MetricsRegistry {
    api: Mutex<HashMap<String, ApiStat>>,
    plan: Mutex<HashMap<&'static str, PlanModeStat>>,
    ai: Mutex<AiStat>,
    // POI counters are hot (every lookup) so they stay lock-free.
    poi_cache_hits: AtomicU64,
    poi_cache_misses: AtomicU64,
    poi_api_calls: AtomicU64,
    poi_api_failures: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── api ─────────────────────────────────────────────────────────

    pub fn record_api(&self, method: &str, path: &str, latency_ms: f64) {
        let key = format!("api.{method}.{path}");
        let mut api = self.api.lock();
        let stat = api.entry(key).or_default();
        stat.count += 1;
        stat.last_ms = round2(latency_ms);
        stat.ring.push(latency_ms);
    }

    // ── plan ────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn record_plan(
        &self,
        mode: PlanMode,
        summary: PlanCallSummary,
        tokens_total: u64,
        pseudo_center: bool,
    ) {
        let key = match mode {
            PlanMode::Fast => "fast",
            PlanMode::Deep => "deep",
        };
        let mut plan = self.plan.lock();
        let stat = plan.entry(key).or_default();
        stat.calls += 1;
        if !summary.success {
            stat.failures += 1;
        }
        if summary.fallback_to_fast {
            stat.fallbacks += 1;
        }
        if pseudo_center {
            stat.pseudo_centers += 1;
        }
        stat.days_total += summary.days.max(0) as u64;
        stat.tokens_total += tokens_total;
        *stat.destinations.entry(summary.destination.clone()).or_default() += 1;
        stat.ring.push(summary.latency_ms);
        if stat.recent.len() == RECENT_CAPACITY {
            stat.recent.pop_front();
        }
        stat.recent.push_back(summary);
    }

    // ── poi ─────────────────────────────────────────────────────────

    pub fn poi_cache_hit(&self) {
        self.poi_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn poi_cache_miss(&self) {
        self.poi_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn poi_api_call(&self) {
        self.poi_api_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn poi_api_failure(&self) {
        self.poi_api_failures.fetch_add(1, Ordering::Relaxed);
    }

    // ── ai ──────────────────────────────────────────────────────────

    pub fn record_ai_call(&self, success: bool, error_type: Option<&str>, latency_ms: f64) {
        let mut ai = self.ai.lock();
        ai.calls += 1;
        if success {
            ai.successes += 1;
        } else {
            let key = error_type.unwrap_or("unknown").to_owned();
            *ai.failures_by_type.entry(key).or_default() += 1;
        }
        ai.ring.push(latency_ms);
    }

    // ── snapshots ───────────────────────────────────────────────────

    /// Lifetime snapshot. Memory counters are passed in by the caller
    /// (they live on the memory service) so the `ai` family can report
    /// them alongside LLM outcomes.
    pub fn snapshot(&self, memory_calls: u64, memory_errors: u64) -> Value {
        self.build_snapshot(None, memory_calls, memory_errors)
    }

    /// Fixed-window approximation over the bounded rings. Counters that
    /// have no per-event history (poi, destinations) report lifetime
    /// values.
    pub fn snapshot_window(&self, seconds: u64, memory_calls: u64, memory_errors: u64) -> Value {
        self.build_snapshot(
            Some(Duration::from_secs(seconds)),
            memory_calls,
            memory_errors,
        )
    }

    fn build_snapshot(
        &self,
        window: Option<Duration>,
        memory_calls: u64,
        memory_errors: u64,
    ) -> Value {
        let api: serde_json::Map<String, Value> = self
            .api
            .lock()
            .iter()
            .map(|(key, stat)| {
                let stats = stat.ring.stats(window);
                (
                    key.clone(),
                    serde_json::json!({
                        "count": stat.count,
                        "last_ms": stat.last_ms,
                        "window": stats,
                    }),
                )
            })
            .collect();

        let plan: serde_json::Map<String, Value> = self
            .plan
            .lock()
            .iter()
            .map(|(key, stat)| {
                let stats = stat.ring.stats(window);
                let avg_days = if stat.calls > 0 {
                    round2(stat.days_total as f64 / stat.calls as f64)
                } else {
                    0.0
                };
                let mut destinations: Vec<(&String, &u64)> = stat.destinations.iter().collect();
                destinations.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
                (
                    format!("plan.{key}"),
                    serde_json::json!({
                        "calls": stat.calls,
                        "failures": stat.failures,
                        "avg_days": avg_days,
                        "latency": stats,
                        "tokens_total": stat.tokens_total,
                        "fallbacks": stat.fallbacks,
                        "pseudo_centers": stat.pseudo_centers,
                        "top_destinations": destinations
                            .into_iter()
                            .take(10)
                            .map(|(d, n)| serde_json::json!({"destination": d, "count": n}))
                            .collect::<Vec<_>>(),
                        "recent": stat.recent.iter().collect::<Vec<_>>(),
                    }),
                )
            })
            .collect();

        let ai = self.ai.lock();
        serde_json::json!({
            "api": api,
            "plan": plan,
            "poi": {
                "cache_hits": self.poi_cache_hits.load(Ordering::Relaxed),
                "cache_misses": self.poi_cache_misses.load(Ordering::Relaxed),
                "api_calls": self.poi_api_calls.load(Ordering::Relaxed),
                "api_failures": self.poi_api_failures.load(Ordering::Relaxed),
            },
            "ai": {
                "calls": ai.calls,
                "successes": ai.successes,
                "failures_by_type": ai.failures_by_type,
                "latency": ai.ring.stats(window),
                "memory_calls": memory_calls,
                "memory_errors": memory_errors,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(success: bool, fallback: bool) -> PlanCallSummary {
        PlanCallSummary {
            trace_id: "plan-x".into(),
            destination: "Guangzhou".into(),
            days: 2,
            latency_ms: 12.0,
            success,
            error: (!success).then(|| "boom".into()),
            fallback_to_fast: fallback,
            at: Utc::now(),
        }
    }

    #[test]
    fn api_counts_and_p95() {
        let registry = MetricsRegistry::new();
        for i in 0..100 {
            registry.record_api("GET", "/api/poi/around", i as f64);
        }
        let snap = registry.snapshot(0, 0);
        let stat = &snap["api"]["api.GET./api/poi/around"];
        assert_eq!(stat["count"], 100);
        let p95 = stat["window"]["p95_ms"].as_f64().unwrap();
        assert!((90.0..=99.0).contains(&p95), "{p95}");
    }

    #[test]
    fn plan_family_aggregates() {
        let registry = MetricsRegistry::new();
        registry.record_plan(PlanMode::Fast, summary(true, false), 0, false);
        registry.record_plan(PlanMode::Fast, summary(false, false), 0, true);
        registry.record_plan(PlanMode::Deep, summary(true, true), 420, false);

        let snap = registry.snapshot(0, 0);
        assert_eq!(snap["plan"]["plan.fast"]["calls"], 2);
        assert_eq!(snap["plan"]["plan.fast"]["failures"], 1);
        assert_eq!(snap["plan"]["plan.fast"]["pseudo_centers"], 1);
        assert_eq!(snap["plan"]["plan.deep"]["fallbacks"], 1);
        assert_eq!(snap["plan"]["plan.deep"]["tokens_total"], 420);
        assert_eq!(
            snap["plan"]["plan.fast"]["top_destinations"][0]["destination"],
            "Guangzhou"
        );
        assert_eq!(snap["plan"]["plan.fast"]["avg_days"], 2.0);
    }

    #[test]
    fn recent_plan_calls_are_bounded() {
        let registry = MetricsRegistry::new();
        for _ in 0..(RECENT_CAPACITY + 5) {
            registry.record_plan(PlanMode::Fast, summary(true, false), 0, false);
        }
        let snap = registry.snapshot(0, 0);
        let recent = snap["plan"]["plan.fast"]["recent"].as_array().unwrap();
        assert_eq!(recent.len(), RECENT_CAPACITY);
    }

    #[test]
    fn poi_counters() {
        let registry = MetricsRegistry::new();
        registry.poi_cache_miss();
        registry.poi_api_call();
        registry.poi_cache_hit();
        let snap = registry.snapshot(0, 0);
        assert_eq!(snap["poi"]["cache_hits"], 1);
        assert_eq!(snap["poi"]["cache_misses"], 1);
        assert_eq!(snap["poi"]["api_calls"], 1);
        assert_eq!(snap["poi"]["api_failures"], 0);
    }

    #[test]
    fn ai_failures_bucketed_by_type() {
        let registry = MetricsRegistry::new();
        registry.record_ai_call(true, None, 100.0);
        registry.record_ai_call(false, Some("timeout"), 5000.0);
        registry.record_ai_call(false, Some("timeout"), 5000.0);

        let snap = registry.snapshot(7, 2);
        assert_eq!(snap["ai"]["calls"], 3);
        assert_eq!(snap["ai"]["successes"], 1);
        assert_eq!(snap["ai"]["failures_by_type"]["timeout"], 2);
        assert_eq!(snap["ai"]["memory_calls"], 7);
        assert_eq!(snap["ai"]["memory_errors"], 2);
    }

    #[test]
    fn window_snapshot_is_well_formed() {
        let registry = MetricsRegistry::new();
        registry.record_api("POST", "/api/ai/plan", 10.0);
        let snap = registry.snapshot_window(60, 0, 0);
        let window = &snap["api"]["api.POST./api/ai/plan"]["window"];
        assert_eq!(window["count"], 1);
    }
}
