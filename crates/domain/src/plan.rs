//! The frozen plan contract: `PlanRequest` in, `PlanResponseData` out,
//! with `TripPlan` mirroring Trip/DayCard/SubTrip for plans that may not
//! be persisted yet.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::OutlineSource;
use crate::error::{Error, Result};
use crate::trace::ToolTrace;
use crate::trip::TransportMode;

/// Interests assumed when the request carries none.
pub const DEFAULT_INTERESTS: &[&str] = &["sight", "food"];

/// Upper bound on destination length accepted from untrusted input.
pub const MAX_DESTINATION_CHARS: usize = 80;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Fast,
    Deep,
}

impl std::fmt::Display for PlanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::Deep => "deep",
        })
    }
}

/// User preferences. Unknown keys are preserved in `extra` so older
/// servers keep working against newer clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_level: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Preferences {
    /// Trimmed, non-empty interests; falls back to [`DEFAULT_INTERESTS`].
    pub fn effective_interests(&self) -> Vec<String> {
        let cleaned: Vec<String> = self
            .interests
            .iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
        if cleaned.is_empty() {
            DEFAULT_INTERESTS.iter().map(|s| (*s).to_owned()).collect()
        } else {
            cleaned
        }
    }

    pub fn is_default_interests(&self) -> bool {
        self.interests.is_empty()
            || self.interests.iter().map(String::as_str).collect::<Vec<_>>() == DEFAULT_INTERESTS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub user_id: i64,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub mode: PlanMode,
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(rename = "async", default)]
    pub async_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_mode: Option<OutlineSource>,
}

impl PlanRequest {
    /// Inclusive day count; non-positive when the range is inverted.
    pub fn day_count(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Structural validation against configured limits.
    pub fn validate(&self, max_days: u32) -> Result<()> {
        let dest = self.destination.trim();
        if dest.is_empty() {
            return Err(Error::InvalidParams("destination must not be empty".into()));
        }
        if dest.chars().count() > MAX_DESTINATION_CHARS {
            return Err(Error::InvalidParams(format!(
                "destination exceeds {MAX_DESTINATION_CHARS} chars"
            )));
        }
        let days = self.day_count();
        if days <= 0 {
            return Err(Error::RangeExceeded(
                "end_date must not precede start_date".into(),
            ));
        }
        if days > i64::from(max_days) {
            return Err(Error::RangeExceeded(format!(
                "day_count {days} exceeds max_days {max_days}"
            )));
        }
        Ok(())
    }

    /// The payload subset that is safe to persist on a task row: no
    /// prompts, no secrets, structural equality defines idempotency.
    pub fn safe_payload(&self, kind: &str) -> Value {
        serde_json::json!({
            "user_id": self.user_id,
            "destination": self.destination,
            "start_date": self.start_date,
            "end_date": self.end_date,
            "mode": self.mode,
            "save": self.save,
            "preferences": self.preferences,
            "people_count": self.people_count,
            "seed": self.seed,
            "request_id": self.request_id,
            "seed_mode": self.seed_mode,
            "kind": kind,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TripPlan — possibly-unsaved itinerary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reference to a POI by its provider-scoped identity, as embedded in
/// `sub_trip.ext.poi`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoiRef {
    pub provider: String,
    pub provider_id: String,
}

impl PoiRef {
    /// Extract from a sub-trip `ext` value. `None` when absent or
    /// missing either key.
    pub fn from_ext(ext: &Value) -> Option<Self> {
        let poi = ext.get("poi")?;
        let provider = poi.get("provider")?.as_str()?.trim();
        let provider_id = poi.get("provider_id")?.as_str()?.trim();
        if provider.is_empty() || provider_id.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_owned(),
            provider_id: provider_id.to_owned(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanSubTrip {
    pub order_index: u32,
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poi_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub ext: Value,
}

impl PlanSubTrip {
    pub fn poi_ref(&self) -> Option<PoiRef> {
        PoiRef::from_ext(&self.ext)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanDayCard {
    pub day_index: u32,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub sub_trips: Vec<PlanSubTrip>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: i64,
    pub title: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    #[serde(default)]
    pub meta: Value,
    pub day_cards: Vec<PlanDayCard>,
    pub day_count: u32,
    pub sub_trip_count: u32,
}

impl TripPlan {
    /// All provider-scoped POI references used anywhere in the plan.
    pub fn used_pois(&self) -> HashSet<PoiRef> {
        self.day_cards
            .iter()
            .flat_map(|card| card.sub_trips.iter())
            .filter_map(PlanSubTrip::poi_ref)
            .collect()
    }

    /// Recompute `day_count` and `sub_trip_count` from the card list.
    pub fn recount(&mut self) {
        self.day_count = self.day_cards.len() as u32;
        self.sub_trip_count = self
            .day_cards
            .iter()
            .map(|c| c.sub_trips.len() as u32)
            .sum();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Exactly one of `plan` / `task_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponseData {
    pub mode: PlanMode,
    #[serde(rename = "async")]
    pub async_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_mode: Option<OutlineSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<TripPlan>,
    #[serde(default)]
    pub metrics: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_traces: Vec<ToolTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: (i32, u32, u32), end: (i32, u32, u32)) -> PlanRequest {
        PlanRequest {
            user_id: 1,
            destination: "Guangzhou".into(),
            start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            mode: PlanMode::Fast,
            save: false,
            preferences: Preferences::default(),
            people_count: None,
            seed: Some(42),
            async_: false,
            request_id: None,
            seed_mode: None,
        }
    }

    #[test]
    fn day_count_boundaries() {
        let req = request((2025, 12, 1), (2025, 12, 1));
        assert_eq!(req.day_count(), 1);
        assert!(req.validate(14).is_ok());

        let req = request((2025, 12, 1), (2025, 12, 14));
        assert_eq!(req.day_count(), 14);
        assert!(req.validate(14).is_ok());

        let req = request((2025, 12, 1), (2025, 12, 15));
        assert!(matches!(req.validate(14), Err(Error::RangeExceeded(_))));

        let req = request((2025, 12, 2), (2025, 12, 1));
        assert!(matches!(req.validate(14), Err(Error::RangeExceeded(_))));
    }

    #[test]
    fn empty_destination_rejected() {
        let mut req = request((2025, 12, 1), (2025, 12, 2));
        req.destination = "  ".into();
        assert!(matches!(req.validate(14), Err(Error::InvalidParams(_))));
    }

    #[test]
    fn default_interests_apply() {
        let prefs = Preferences::default();
        assert_eq!(prefs.effective_interests(), vec!["sight", "food"]);

        let prefs = Preferences {
            interests: vec!["  ".into(), "museum".into()],
            ..Preferences::default()
        };
        assert_eq!(prefs.effective_interests(), vec!["museum"]);
    }

    #[test]
    fn unknown_preference_keys_are_preserved() {
        let raw = r#"{"interests":["food"],"pace":"slow","dietary":"vegan"}"#;
        let prefs: Preferences = serde_json::from_str(raw).unwrap();
        assert_eq!(prefs.extra.get("dietary").unwrap(), "vegan");
        let back = serde_json::to_value(&prefs).unwrap();
        assert_eq!(back.get("dietary").unwrap(), "vegan");
    }

    #[test]
    fn async_field_uses_wire_name() {
        let raw = r#"{"user_id":1,"destination":"X","start_date":"2025-12-01",
            "end_date":"2025-12-02","mode":"deep","async":true}"#;
        let req: PlanRequest = serde_json::from_str(raw).unwrap();
        assert!(req.async_);
        assert_eq!(req.mode, PlanMode::Deep);
    }

    #[test]
    fn poi_ref_extraction() {
        let ext = serde_json::json!({"poi": {"provider": "mock", "provider_id": "food-1"}});
        let r = PoiRef::from_ext(&ext).unwrap();
        assert_eq!(r.provider, "mock");
        assert_eq!(r.provider_id, "food-1");

        assert!(PoiRef::from_ext(&serde_json::json!({})).is_none());
        assert!(PoiRef::from_ext(&serde_json::json!({"poi": {"provider": "mock"}})).is_none());
        assert!(
            PoiRef::from_ext(&serde_json::json!({"poi": {"provider": "", "provider_id": "x"}}))
                .is_none()
        );
    }

    #[test]
    fn safe_payload_is_structurally_stable() {
        let req = request((2025, 12, 1), (2025, 12, 2));
        let a = req.safe_payload("plan:deep");
        let b = req.safe_payload("plan:deep");
        assert_eq!(a, b);
        assert!(a.get("trace_id").is_none());
    }
}
