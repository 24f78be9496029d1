//! Unified structural and cross-day plan validation, shared by the fast
//! and deep planners and by persistence.
//!
//! Validation never panics and never throws mid-way: each check appends a
//! [`ValidationIssue`] with a machine-readable location path, and callers
//! decide whether a non-empty result is fatal, retryable, or repairable.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::plan::{PlanDayCard, PoiRef, TripPlan};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Schema,
    Business,
    Range,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// Location path like `day_cards[2].sub_trips[0].order_index`.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, path: String, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }
}

/// Settings a validation run is evaluated against.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub expected_days: u32,
    pub start_date: NaiveDate,
    /// Enforce cross-day POI uniqueness (deep plans set this).
    pub require_unique_pois: bool,
    /// Day window all sub-trip times must fall into, when configured.
    pub day_window: Option<(NaiveTime, NaiveTime)>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PlanValidator;

impl PlanValidator {
    /// Single-day check: expected index/date, dense order indexes, time
    /// monotonicity and window, non-empty activities, a location reference
    /// per sub-trip, no intra-day POI duplicates, and no reuse of
    /// `used_pois` (POIs accepted on previous days).
    pub fn validate_day(
        card: &PlanDayCard,
        expected_day_index: u32,
        ctx: &ValidationContext,
        used_pois: &HashSet<PoiRef>,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let base = format!("day_cards[{expected_day_index}]");

        if card.day_index != expected_day_index {
            issues.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("{base}.day_index"),
                format!("expected {expected_day_index}, got {}", card.day_index),
            ));
        }

        let expected_date = ctx.start_date + Duration::days(i64::from(expected_day_index));
        if card.date != expected_date {
            issues.push(ValidationIssue::new(
                IssueKind::Business,
                format!("{base}.date"),
                format!("expected {expected_date}, got {}", card.date),
            ));
        }

        let mut seen_orders = HashSet::new();
        let mut seen_pois: HashSet<PoiRef> = HashSet::new();
        for (i, sub) in card.sub_trips.iter().enumerate() {
            let sub_path = format!("{base}.sub_trips[{i}]");

            if !seen_orders.insert(sub.order_index) {
                issues.push(ValidationIssue::new(
                    IssueKind::Schema,
                    format!("{sub_path}.order_index"),
                    format!("duplicate order_index {}", sub.order_index),
                ));
            }

            if sub.activity.trim().is_empty() {
                issues.push(ValidationIssue::new(
                    IssueKind::Schema,
                    format!("{sub_path}.activity"),
                    "activity must not be empty",
                ));
            }

            if sub.loc_name.as_deref().map_or(true, |s| s.trim().is_empty())
                && sub.poi_id.is_none()
                && sub.poi_ref().is_none()
            {
                issues.push(ValidationIssue::new(
                    IssueKind::Business,
                    format!("{sub_path}.loc_name"),
                    "sub_trip needs a loc_name or a POI reference",
                ));
            }

            if let (Some(start), Some(end)) = (sub.start_time, sub.end_time) {
                if start >= end {
                    issues.push(ValidationIssue::new(
                        IssueKind::Business,
                        format!("{sub_path}.start_time"),
                        format!("start_time {start} not before end_time {end}"),
                    ));
                }
            }
            if let Some((day_start, day_end)) = ctx.day_window {
                if sub.start_time.is_some_and(|t| t < day_start) {
                    issues.push(ValidationIssue::new(
                        IssueKind::Range,
                        format!("{sub_path}.start_time"),
                        "start_time before day window",
                    ));
                }
                if sub.end_time.is_some_and(|t| t > day_end) {
                    issues.push(ValidationIssue::new(
                        IssueKind::Range,
                        format!("{sub_path}.end_time"),
                        "end_time after day window",
                    ));
                }
            }

            if let Some(poi) = sub.poi_ref() {
                if used_pois.contains(&poi) {
                    issues.push(ValidationIssue::new(
                        IssueKind::Business,
                        format!("{sub_path}.ext.poi"),
                        format!("poi reused across days: {}/{}", poi.provider, poi.provider_id),
                    ));
                } else if !seen_pois.insert(poi.clone()) {
                    issues.push(ValidationIssue::new(
                        IssueKind::Business,
                        format!("{sub_path}.ext.poi"),
                        format!(
                            "poi duplicated in same day: {}/{}",
                            poi.provider, poi.provider_id
                        ),
                    ));
                }
            }
        }

        // Dense from 0: every index in 0..len must be present.
        let n = card.sub_trips.len() as u32;
        if seen_orders.len() == card.sub_trips.len() && (0..n).any(|i| !seen_orders.contains(&i)) {
            issues.push(ValidationIssue::new(
                IssueKind::Schema,
                format!("{base}.sub_trips"),
                "order_index must start at 0 and be continuous",
            ));
        }

        issues
    }

    /// Global check: day count, dense day indexes, per-day dates, derived
    /// counts, and cross-day POI uniqueness when the context requires it.
    pub fn validate_trip(plan: &TripPlan, ctx: &ValidationContext) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if plan.day_count != ctx.expected_days {
            issues.push(ValidationIssue::new(
                IssueKind::Business,
                "day_count".into(),
                format!("expected {}, got {}", ctx.expected_days, plan.day_count),
            ));
        }
        if plan.day_cards.len() as u32 != ctx.expected_days {
            issues.push(ValidationIssue::new(
                IssueKind::Business,
                "day_cards".into(),
                format!(
                    "expected {} cards, got {}",
                    ctx.expected_days,
                    plan.day_cards.len()
                ),
            ));
        }

        let per_day_ctx = ValidationContext {
            require_unique_pois: false,
            ..ctx.clone()
        };
        let empty = HashSet::new();
        for (idx, card) in plan.day_cards.iter().enumerate() {
            issues.extend(Self::validate_day(card, idx as u32, &per_day_ctx, &empty));
        }

        let expected_sub_trips: u32 = plan
            .day_cards
            .iter()
            .map(|c| c.sub_trips.len() as u32)
            .sum();
        if plan.sub_trip_count != expected_sub_trips {
            issues.push(ValidationIssue::new(
                IssueKind::Schema,
                "sub_trip_count".into(),
                format!("expected {expected_sub_trips}, got {}", plan.sub_trip_count),
            ));
        }

        if ctx.require_unique_pois {
            let mut seen: HashSet<PoiRef> = HashSet::new();
            for (d, card) in plan.day_cards.iter().enumerate() {
                for (s, sub) in card.sub_trips.iter().enumerate() {
                    if let Some(poi) = sub.poi_ref() {
                        if !seen.insert(poi.clone()) {
                            issues.push(ValidationIssue::new(
                                IssueKind::Business,
                                format!("day_cards[{d}].sub_trips[{s}].ext.poi"),
                                format!(
                                    "poi duplicated across days: {}/{}",
                                    poi.provider, poi.provider_id
                                ),
                            ));
                        }
                    }
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanSubTrip;
    use serde_json::json;

    fn ctx(days: u32) -> ValidationContext {
        ValidationContext {
            expected_days: days,
            start_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            require_unique_pois: false,
            day_window: None,
        }
    }

    fn sub(order: u32, poi: Option<(&str, &str)>) -> PlanSubTrip {
        PlanSubTrip {
            order_index: order,
            activity: "sightseeing".into(),
            poi_id: None,
            loc_name: Some("Somewhere".into()),
            transport: None,
            start_time: NaiveTime::from_hms_opt(9 + order, 0, 0),
            end_time: NaiveTime::from_hms_opt(10 + order, 0, 0),
            lat: None,
            lng: None,
            ext: match poi {
                Some((p, pid)) => json!({"poi": {"provider": p, "provider_id": pid}}),
                None => json!({}),
            },
        }
    }

    fn card(day: u32, subs: Vec<PlanSubTrip>) -> PlanDayCard {
        PlanDayCard {
            day_index: day,
            date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap() + Duration::days(i64::from(day)),
            note: None,
            sub_trips: subs,
        }
    }

    fn plan(cards: Vec<PlanDayCard>) -> TripPlan {
        let mut p = TripPlan {
            id: None,
            user_id: 1,
            title: "t".into(),
            destination: "Guangzhou".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 12, 2).unwrap(),
            status: "draft".into(),
            meta: json!({}),
            day_cards: cards,
            day_count: 0,
            sub_trip_count: 0,
        };
        p.recount();
        p
    }

    // ── validate_day ────────────────────────────────────────────────

    #[test]
    fn clean_day_passes() {
        let c = card(0, vec![sub(0, Some(("mock", "a"))), sub(1, Some(("mock", "b")))]);
        assert!(PlanValidator::validate_day(&c, 0, &ctx(2), &HashSet::new()).is_empty());
    }

    #[test]
    fn day_index_and_date_mismatch() {
        let mut c = card(1, vec![sub(0, None)]);
        c.date = NaiveDate::from_ymd_opt(2025, 12, 5).unwrap();
        let issues = PlanValidator::validate_day(&c, 0, &ctx(2), &HashSet::new());
        assert!(issues.iter().any(|i| i.path.ends_with(".day_index")));
        assert!(issues.iter().any(|i| i.path.ends_with(".date")));
    }

    #[test]
    fn non_dense_orders_flagged() {
        let c = card(0, vec![sub(0, None), sub(2, None)]);
        let issues = PlanValidator::validate_day(&c, 0, &ctx(1), &HashSet::new());
        assert!(issues.iter().any(|i| i.message.contains("continuous")));
    }

    #[test]
    fn duplicate_order_flagged() {
        let c = card(0, vec![sub(0, None), sub(0, None)]);
        let issues = PlanValidator::validate_day(&c, 0, &ctx(1), &HashSet::new());
        assert!(issues.iter().any(|i| i.message.contains("duplicate order_index")));
    }

    #[test]
    fn time_inversion_flagged() {
        let mut s = sub(0, None);
        s.start_time = NaiveTime::from_hms_opt(12, 0, 0);
        s.end_time = NaiveTime::from_hms_opt(11, 0, 0);
        let c = card(0, vec![s]);
        let issues = PlanValidator::validate_day(&c, 0, &ctx(1), &HashSet::new());
        assert!(issues.iter().any(|i| i.message.contains("not before")));
    }

    #[test]
    fn day_window_enforced() {
        let mut context = ctx(1);
        context.day_window = Some((
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        ));
        let mut s = sub(0, None);
        s.start_time = NaiveTime::from_hms_opt(7, 0, 0);
        s.end_time = NaiveTime::from_hms_opt(8, 0, 0);
        let c = card(0, vec![s]);
        let issues = PlanValidator::validate_day(&c, 0, &context, &HashSet::new());
        assert!(issues.iter().any(|i| i.kind == IssueKind::Range));
    }

    #[test]
    fn intra_day_poi_duplicate_flagged() {
        let c = card(0, vec![sub(0, Some(("mock", "a"))), sub(1, Some(("mock", "a")))]);
        let issues = PlanValidator::validate_day(&c, 0, &ctx(1), &HashSet::new());
        assert!(issues.iter().any(|i| i.message.contains("same day")));
    }

    #[test]
    fn cross_day_reuse_flagged_via_used_set() {
        let used: HashSet<PoiRef> = [PoiRef {
            provider: "mock".into(),
            provider_id: "a".into(),
        }]
        .into_iter()
        .collect();
        let c = card(0, vec![sub(0, Some(("mock", "a")))]);
        let issues = PlanValidator::validate_day(&c, 0, &ctx(1), &used);
        assert!(issues.iter().any(|i| i.message.contains("across days")));
    }

    #[test]
    fn missing_location_reference_flagged() {
        let mut s = sub(0, None);
        s.loc_name = None;
        let c = card(0, vec![s]);
        let issues = PlanValidator::validate_day(&c, 0, &ctx(1), &HashSet::new());
        assert!(issues.iter().any(|i| i.message.contains("loc_name or a POI")));
    }

    // ── validate_trip ───────────────────────────────────────────────

    #[test]
    fn clean_trip_passes() {
        let p = plan(vec![
            card(0, vec![sub(0, Some(("mock", "a")))]),
            card(1, vec![sub(0, Some(("mock", "b")))]),
        ]);
        assert!(PlanValidator::validate_trip(&p, &ctx(2)).is_empty());
    }

    #[test]
    fn day_count_mismatch_flagged() {
        let p = plan(vec![card(0, vec![sub(0, None)])]);
        let issues = PlanValidator::validate_trip(&p, &ctx(2));
        assert!(issues.iter().any(|i| i.path == "day_count"));
    }

    #[test]
    fn stale_counts_flagged() {
        let mut p = plan(vec![card(0, vec![sub(0, None)])]);
        p.sub_trip_count = 99;
        let issues = PlanValidator::validate_trip(&p, &ctx(1));
        assert!(issues.iter().any(|i| i.path == "sub_trip_count"));
    }

    #[test]
    fn cross_day_dedup_only_when_required() {
        let p = plan(vec![
            card(0, vec![sub(0, Some(("mock", "a")))]),
            card(1, vec![sub(0, Some(("mock", "a")))]),
        ]);
        assert!(PlanValidator::validate_trip(&p, &ctx(2)).is_empty());

        let mut strict = ctx(2);
        strict.require_unique_pois = true;
        let issues = PlanValidator::validate_trip(&p, &strict);
        assert!(issues.iter().any(|i| i.message.contains("across days")));
    }
}
