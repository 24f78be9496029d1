//! Deterministic rule-based itinerary generator (`mode=fast`).
//!
//! No LLM involvement: candidates come from the local store and the POI
//! service, slots are filled by a fixed selection policy, and the same
//! request with the same seed against the same POI snapshot produces an
//! identical plan.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, NaiveTime};
use serde_json::{json, Value};

use wf_domain::config::Config;
use wf_domain::plan::{PlanDayCard, PlanRequest, PlanSubTrip, TripPlan};
use wf_domain::poi::PoiItem;
use wf_domain::trip::{GeoPoint, TransportMode};
use wf_domain::{Error, Result};
use wf_storage::{PoiStore, Storage};

use crate::geocode::GeocodeService;
use crate::poi::PoiService;

pub const RULES_VERSION: &str = "fast_rules_v1";

/// Candidate pool hard cap regardless of trip length.
const MAX_CANDIDATES: usize = 200;
/// Pool overcommit so later days still have unused candidates.
const OVERCOMMIT_FACTOR: usize = 2;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FastPlanOutcome {
    pub plan: TripPlan,
    pub metrics: Value,
    /// True when the destination center is hash-derived, not geocoded.
    pub pseudo_center: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Candidate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
struct Candidate {
    item: PoiItem,
    source: String,
}

impl Candidate {
    fn key(&self) -> (String, String) {
        self.item.key()
    }

    fn point(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.item.lat, self.item.lng).ok()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FastPlanner {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    poi: Arc<PoiService>,
    geocode: Arc<GeocodeService>,
}

impl FastPlanner {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        poi: Arc<PoiService>,
        geocode: Arc<GeocodeService>,
    ) -> Self {
        Self {
            config,
            storage,
            poi,
            geocode,
        }
    }

    pub async fn plan(&self, request: &PlanRequest) -> Result<FastPlanOutcome> {
        let t0 = Instant::now();
        request.validate(self.config.planner.max_days)?;
        let day_count = request.day_count() as u32;

        let seed = request.seed.unwrap_or(self.config.planner.fast_seed);
        let interests = request.preferences.effective_interests();

        let (day_start, day_end) = self
            .config
            .planner
            .parse_day_window()
            .ok_or_else(|| Error::PlanFailed("invalid day window config".into()))?;
        let slot_minutes = self.config.planner.slot_minutes.max(15);
        let mid = minutes_to_time((to_minutes(day_start) + to_minutes(day_end)) / 2);
        let half_day_windows = [("morning", day_start, mid), ("afternoon", mid, day_end)];

        let (candidates, poi_sources, pseudo_center) = self
            .load_candidates(request, &interests, day_count)
            .await?;

        // Deterministic interest rotation keyed by the seed.
        let rotation = (seed as usize) % interests.len();
        let interest_order: Vec<String> = interests[rotation..]
            .iter()
            .chain(interests[..rotation].iter())
            .cloned()
            .collect();
        let interest_set: HashSet<&str> = interest_order.iter().map(String::as_str).collect();

        let pace = request
            .preferences
            .pace
            .as_deref()
            .unwrap_or("normal")
            .to_lowercase();
        let mut per_half_day: usize = match pace.as_str() {
            "slow" => 1,
            "fast" | "packed" => 2,
            _ => 1,
        };
        if day_count <= 2 {
            per_half_day = per_half_day.max(2);
        }

        let transport: Option<TransportMode> =
            self.config.planner.fast_transport.parse().ok();

        let mut used: HashSet<(String, String)> = HashSet::new();
        let mut day_cards = Vec::with_capacity(day_count as usize);
        let mut total_sub_trips = 0u32;

        for day_index in 0..day_count {
            let date = request.start_date + ChronoDuration::days(i64::from(day_index));
            let mut sub_trips: Vec<PlanSubTrip> = Vec::new();
            let mut order_index = 0u32;
            let mut prev_category: Option<String> = None;
            let mut anchor: Option<GeoPoint> = None;

            for (slot_name, slot_start, slot_end) in &half_day_windows {
                let capacity = ((to_minutes(*slot_end) - to_minutes(*slot_start)) / slot_minutes)
                    .max(1) as usize;
                let per_slot = per_half_day.min(capacity);
                let slot_start_min = to_minutes(*slot_start);

                for local_idx in 0..per_slot as u32 {
                    let start_min = slot_start_min + local_idx * slot_minutes;
                    let pick = select_candidate(
                        &candidates,
                        &interest_set,
                        &used,
                        prev_category.as_deref(),
                        anchor,
                    );
                    match pick {
                        Some(idx) => {
                            let candidate = candidates[idx].clone();
                            used.insert(candidate.key());
                            if anchor.is_none() {
                                anchor = candidate.point();
                            }
                            prev_category =
                                candidate.item.category.clone().or(prev_category);
                            sub_trips.push(build_sub_trip(
                                &candidate,
                                order_index,
                                slot_name,
                                start_min,
                                slot_minutes,
                                transport,
                            ));
                        }
                        None => {
                            sub_trips.push(build_free_slot(
                                &request.destination,
                                order_index,
                                slot_name,
                                start_min,
                                slot_minutes,
                                transport,
                            ));
                        }
                    }
                    order_index += 1;
                }
            }

            total_sub_trips += sub_trips.len() as u32;
            day_cards.push(PlanDayCard {
                day_index,
                date,
                note: None,
                sub_trips,
            });
        }

        let plan = TripPlan {
            id: None,
            user_id: request.user_id,
            title: format!("{} itinerary", request.destination),
            destination: request.destination.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            status: "draft".into(),
            meta: json!({
                "planner": {
                    "mode": "fast",
                    "rules_version": RULES_VERSION,
                    "seed": seed,
                    "interests": interests,
                }
            }),
            day_cards,
            day_count,
            sub_trip_count: total_sub_trips,
        };

        let metrics = json!({
            "planner": RULES_VERSION,
            "seed": seed,
            "day_count": day_count,
            "activities": total_sub_trips,
            "poi_sources": poi_sources,
            "geocode_source": if pseudo_center { "pseudo" } else { "api" },
            "candidate_latency_ms": (t0.elapsed().as_secs_f64() * 100_000.0).round() / 100.0,
        });

        Ok(FastPlanOutcome {
            plan,
            metrics,
            pseudo_center,
        })
    }

    /// Candidate assembly: destination text matches from the local store
    /// plus per-interest POI queries around the resolved center, deduped
    /// by provider key and sorted by a stable total order.
    async fn load_candidates(
        &self,
        request: &PlanRequest,
        interests: &[String],
        day_count: u32,
    ) -> Result<(Vec<Candidate>, Value, bool)> {
        let per_day = self.config.planner.fast_poi_limit_per_day.max(1);
        let limit = (per_day * day_count as usize * OVERCOMMIT_FACTOR).min(MAX_CANDIDATES);

        let mut merged: Vec<Candidate> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for item in self
            .storage
            .search_pois_text(&request.destination, limit)
            .await?
        {
            if seen.insert(item.key()) {
                merged.push(Candidate {
                    item,
                    source: "db".into(),
                });
            }
        }

        let center = self
            .geocode
            .resolve_city_center(&request.destination)
            .await?;
        let mut sources = serde_json::Map::new();
        for interest in interests.iter().take(6) {
            let (items, meta) = match self
                .poi
                .get_poi_around(
                    center.point.lat,
                    center.point.lng,
                    Some(interest),
                    None,
                    limit.min(30),
                )
                .await
            {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(interest = %interest, error = %e, "candidate lookup failed");
                    continue;
                }
            };
            let bucket = sources
                .entry(meta.source.to_string())
                .or_insert_with(|| Value::from(0u64));
            *bucket = Value::from(bucket.as_u64().unwrap_or(0) + 1);
            for item in items {
                if !item.provider_id.is_empty() && seen.insert(item.key()) {
                    merged.push(Candidate {
                        source: item.source.to_string(),
                        item,
                    });
                }
            }
        }

        // Stable total order: rating descending, then name, then provider
        // key — the tiebreak that keeps plans byte-reproducible.
        merged.sort_by(|a, b| {
            b.item
                .rating
                .unwrap_or(0.0)
                .partial_cmp(&a.item.rating.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item.name.cmp(&b.item.name))
                .then_with(|| a.key().cmp(&b.key()))
        });
        merged.truncate(limit);

        Ok((merged, Value::Object(sources), center.is_pseudo()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Selection policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pick the next candidate index, or `None` when the pool is exhausted.
///
/// Tiers, best first:
/// 1. category matches an interest AND differs from the previous slot;
/// 2. category differs from the previous slot;
/// 3. any unused candidate.
/// Within a tier, closer to the day anchor wins (bucketed to 500 m so
/// rating order still decides nearby ties), then candidate order.
fn select_candidate(
    candidates: &[Candidate],
    interests: &HashSet<&str>,
    used: &HashSet<(String, String)>,
    prev_category: Option<&str>,
    anchor: Option<GeoPoint>,
) -> Option<usize> {
    let mut best: Option<(u8, u64, usize)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        if used.contains(&candidate.key()) {
            continue;
        }
        let category = candidate.item.category.as_deref();
        let diverse = category.is_some() && category != prev_category;
        let tier = if diverse && category.is_some_and(|c| interests.contains(c)) {
            0
        } else if diverse {
            1
        } else {
            2
        };
        let anchor_bucket = match (anchor, candidate.point()) {
            (Some(a), Some(p)) => (a.distance_m(&p) / 500.0) as u64,
            _ => u64::MAX,
        };
        let rank = (tier, anchor_bucket, idx);
        if best.map_or(true, |b| rank < b) {
            best = Some(rank);
        }
    }
    best.map(|(_, _, idx)| idx)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sub-trip assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn to_minutes(t: NaiveTime) -> u32 {
    use chrono::Timelike;
    t.hour() * 60 + t.minute()
}

fn minutes_to_time(minutes: u32) -> NaiveTime {
    let hour = (minutes / 60).min(23);
    let minute = (minutes % 60).min(59);
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn activity_title(category: &str) -> String {
    match category {
        "food" => "Food crawl".into(),
        "sight" => "Sightseeing".into(),
        "museum" => "Museum visit".into(),
        "park" => "Park stroll".into(),
        "hotel" => "Check-in and rest".into(),
        "shopping" => "Shopping break".into(),
        other if !other.is_empty() => format!("{other} stop"),
        _ => "Planned activity".into(),
    }
}

fn build_sub_trip(
    candidate: &Candidate,
    order_index: u32,
    slot_name: &str,
    start_min: u32,
    slot_minutes: u32,
    transport: Option<TransportMode>,
) -> PlanSubTrip {
    let item = &candidate.item;
    PlanSubTrip {
        order_index,
        activity: activity_title(item.category.as_deref().unwrap_or("")),
        poi_id: item.id,
        loc_name: Some(item.name.clone()),
        transport,
        start_time: Some(minutes_to_time(start_min)),
        end_time: Some(minutes_to_time(start_min + slot_minutes)),
        lat: Some(item.lat),
        lng: Some(item.lng),
        ext: json!({
            "slot": slot_name,
            "poi": {
                "provider": item.provider,
                "provider_id": item.provider_id,
                "source": candidate.source,
                "category": item.category,
                "addr": item.addr,
                "rating": item.rating,
                "distance_m": item.distance_m,
            },
            "planner": { "rules_version": RULES_VERSION },
        }),
    }
}

/// Degraded slot when the pool is exhausted: the day still fills, the
/// traveller just gets unstructured time with a hint.
fn build_free_slot(
    destination: &str,
    order_index: u32,
    slot_name: &str,
    start_min: u32,
    slot_minutes: u32,
    transport: Option<TransportMode>,
) -> PlanSubTrip {
    PlanSubTrip {
        order_index,
        activity: "free exploration".into(),
        poi_id: None,
        loc_name: Some(destination.to_owned()),
        transport,
        start_time: Some(minutes_to_time(start_min)),
        end_time: Some(minutes_to_time(start_min + slot_minutes)),
        lat: None,
        lng: None,
        ext: json!({
            "slot": slot_name,
            "fallback": true,
            "hint": "Not enough POI data for this slot; add POIs or widen \
                     the interest list and re-plan.",
            "planner": { "rules_version": RULES_VERSION },
        }),
    }
}
