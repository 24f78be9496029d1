use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fast planner configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// First activity slot of a day, `HH:MM`.
    #[serde(default = "d_day_start")]
    pub day_start: String,
    /// Last activity must end by this time, `HH:MM`.
    #[serde(default = "d_day_end")]
    pub day_end: String,
    /// Default duration of a single activity slot.
    #[serde(default = "d_slot_minutes")]
    pub slot_minutes: u32,
    /// Hard cap on trip length for any mode.
    #[serde(default = "d_max_days")]
    pub max_days: u32,
    /// Seed used by the fast planner when the request carries none.
    #[serde(default = "d_fast_seed")]
    pub fast_seed: u64,
    /// POI candidates fetched per trip day (before the overcommit factor).
    #[serde(default = "d_poi_limit_per_day")]
    pub fast_poi_limit_per_day: usize,
    /// Default transport mode stamped onto generated sub-trips.
    #[serde(default = "d_transport")]
    pub fast_transport: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            day_start: d_day_start(),
            day_end: d_day_end(),
            slot_minutes: d_slot_minutes(),
            max_days: d_max_days(),
            fast_seed: d_fast_seed(),
            fast_poi_limit_per_day: d_poi_limit_per_day(),
            fast_transport: d_transport(),
        }
    }
}

impl PlannerConfig {
    /// Parse the configured day window. `None` when either bound is not
    /// `HH:MM` or the window is empty.
    pub fn parse_day_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.day_start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(&self.day_end, "%H:%M").ok()?;
        (start < end).then_some((start, end))
    }
}

fn d_day_start() -> String {
    "09:00".into()
}

fn d_day_end() -> String {
    "18:00".into()
}

fn d_slot_minutes() -> u32 {
    90
}

fn d_max_days() -> u32 {
    14
}

fn d_fast_seed() -> u64 {
    42
}

fn d_poi_limit_per_day() -> usize {
    6
}

fn d_transport() -> String {
    "walk".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deep planner configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the deep planner's skeleton outline comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutlineSource {
    #[default]
    Fast,
    LlmOutline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepPlannerConfig {
    /// When false every `mode=deep` request fails with `deep_unsupported`.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Model override for per-day generation; `None` uses the provider
    /// default.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_timeout_s")]
    pub timeout_s: u64,
    /// Extra attempts per day after the first (0..=2 is sensible).
    #[serde(default = "d_retries")]
    pub retries: u32,
    /// Candidate POIs offered to the model per day prompt.
    #[serde(default = "d_max_pois")]
    pub max_pois: usize,
    /// Deep-specific day cap (may be tighter than `planner.max_days`).
    #[serde(default = "d_deep_max_days")]
    pub max_days: u32,
    /// Substitute the fast skeleton when a day (or the whole plan) fails.
    #[serde(default = "d_true")]
    pub fallback_to_fast: bool,
    /// How many previously accepted days are summarized into the prompt.
    #[serde(default = "d_context_max_days")]
    pub context_max_days: usize,
    /// Char budget for the accepted-days context block.
    #[serde(default = "d_context_max_chars")]
    pub context_max_chars: usize,
    #[serde(default = "d_prompt_version")]
    pub prompt_version: String,
    #[serde(default)]
    pub outline_source: OutlineSource,
}

impl Default for DeepPlannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            timeout_s: d_timeout_s(),
            retries: d_retries(),
            max_pois: d_max_pois(),
            max_days: d_deep_max_days(),
            fallback_to_fast: true,
            context_max_days: d_context_max_days(),
            context_max_chars: d_context_max_chars(),
            prompt_version: d_prompt_version(),
            outline_source: OutlineSource::Fast,
        }
    }
}

fn d_true() -> bool {
    true
}

fn d_temperature() -> f32 {
    0.2
}

fn d_max_tokens() -> u32 {
    2048
}

fn d_timeout_s() -> u64 {
    30
}

fn d_retries() -> u32 {
    1
}

fn d_max_pois() -> usize {
    24
}

fn d_deep_max_days() -> u32 {
    7
}

fn d_context_max_days() -> usize {
    3
}

fn d_context_max_chars() -> usize {
    4000
}

fn d_prompt_version() -> String {
    "v1".into()
}
