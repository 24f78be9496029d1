//! Deterministic intent router.
//!
//! Classifies a user query with keyword and pattern heuristics — no LLM —
//! and extracts the slots the tool layer needs (POI category, radius,
//! trip day, locations, travel mode). Higher-priority intents win when
//! keywords overlap: weather > navigation > trip query > POI > general.

use serde::Serialize;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Intent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PoiNearby,
    TripQuery,
    Weather,
    Navigation,
    GeneralQa,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PoiNearby => "poi_nearby",
            Self::TripQuery => "trip_query",
            Self::Weather => "weather",
            Self::Navigation => "navigation",
            Self::GeneralQa => "general_qa",
        }
    }
}

/// Slots extracted alongside the intent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Slots {
    pub poi_type: Option<String>,
    pub radius_m: Option<u32>,
    /// 0-based trip day referenced by the query.
    pub day_index: Option<u32>,
    pub locations: Vec<String>,
    pub travel_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteDecision {
    pub intent: Intent,
    pub confidence: f64,
    pub slots: Slots,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const WEATHER_WORDS: &[&str] = &["weather", "rain", "raining", "forecast", "temperature", "sunny", "umbrella"];
const NAV_WORDS: &[&str] = &["how do i get", "how to get", "navigate", "directions", "route to", "way to"];
const TRIP_WORDS: &[&str] = &["my trip", "my plan", "itinerary", "schedule", "my day"];
const POI_WORDS: &[&str] = &[
    "nearby", "around here", "near me", "close by", "restaurant", "food", "eat", "coffee",
    "museum", "hotel", "park", "shopping", "attraction", "sight", "bar",
];

pub fn route(query: &str) -> RouteDecision {
    let q = query.to_lowercase();
    let mut slots = Slots {
        poi_type: guess_poi_type(&q),
        radius_m: extract_radius_m(&q),
        day_index: extract_day_index(&q),
        locations: extract_locations(query),
        travel_mode: extract_travel_mode(&q),
    };

    let (intent, confidence) = if contains_any(&q, WEATHER_WORDS) {
        (Intent::Weather, 0.9)
    } else if contains_any(&q, NAV_WORDS) || slots.travel_mode.is_some() && q.contains(" to ") {
        (Intent::Navigation, 0.8)
    } else if contains_any(&q, TRIP_WORDS) || slots.day_index.is_some() {
        (Intent::TripQuery, 0.8)
    } else if contains_any(&q, POI_WORDS) {
        (Intent::PoiNearby, 0.7)
    } else {
        (Intent::GeneralQa, 0.5)
    };

    if intent != Intent::PoiNearby {
        slots.poi_type = None;
    }

    RouteDecision {
        intent,
        confidence,
        slots,
    }
}

fn contains_any(q: &str, words: &[&str]) -> bool {
    words.iter().any(|w| q.contains(w))
}

/// Map category keywords to the POI type vocabulary.
pub fn guess_poi_type(q: &str) -> Option<String> {
    const MAPPING: &[(&str, &str)] = &[
        ("restaurant", "food"),
        ("food", "food"),
        ("eat", "food"),
        ("coffee", "food"),
        ("bar", "food"),
        ("museum", "museum"),
        ("hotel", "hotel"),
        ("stay", "hotel"),
        ("park", "park"),
        ("shopping", "shopping"),
        ("mall", "shopping"),
        ("attraction", "sight"),
        ("sight", "sight"),
    ];
    MAPPING
        .iter()
        .find(|(word, _)| q.contains(word))
        .map(|(_, t)| (*t).to_owned())
}

/// Parse "800m", "800 meters", "2km", "2 km".
fn extract_radius_m(q: &str) -> Option<u32> {
    let bytes = q.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let number: u32 = q[start..i].parse().ok()?;
            let rest = q[i..].trim_start();
            if rest.starts_with("km") || rest.starts_with("kilometer") {
                return Some(number.saturating_mul(1000));
            }
            if rest.starts_with('m') && !rest.starts_with("min") || rest.starts_with("meter") {
                return Some(number);
            }
        } else {
            i += 1;
        }
    }
    None
}

/// "day 2" → day_index 1; "today" → 0, "tomorrow" → 1.
fn extract_day_index(q: &str) -> Option<u32> {
    if let Some(pos) = q.find("day ") {
        let rest = &q[pos + 4..];
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(n) = digits.parse::<u32>() {
            if n >= 1 {
                return Some(n - 1);
            }
        }
    }
    if q.contains("today") {
        return Some(0);
    }
    if q.contains("tomorrow") {
        return Some(1);
    }
    None
}

/// Location references after "in "/"at " — a capitalized run of words.
fn extract_locations(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    for marker in ["in ", "at ", "to "] {
        let mut rest = query;
        while let Some(pos) = rest.find(marker) {
            let tail = &rest[pos + marker.len()..];
            let candidate: String = tail
                .split_whitespace()
                .take_while(|w| w.chars().next().is_some_and(char::is_uppercase))
                .collect::<Vec<_>>()
                .join(" ");
            let cleaned = candidate.trim_end_matches(['?', '.', ',', '!']).to_owned();
            if !cleaned.is_empty() && !out.contains(&cleaned) {
                out.push(cleaned);
            }
            rest = &rest[pos + marker.len()..];
        }
    }
    out
}

fn extract_travel_mode(q: &str) -> Option<String> {
    const MODES: &[(&str, &str)] = &[
        ("walk", "walking"),
        ("on foot", "walking"),
        ("drive", "driving"),
        ("driving", "driving"),
        ("taxi", "driving"),
        ("bus", "transit"),
        ("subway", "transit"),
        ("metro", "transit"),
        ("transit", "transit"),
        ("bike", "bicycling"),
        ("cycling", "bicycling"),
    ];
    MODES
        .iter()
        .find(|(word, _)| q.contains(word))
        .map(|(_, mode)| (*mode).to_owned())
}
