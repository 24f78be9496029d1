//! Point-of-interest entities. A POI is identified by its
//! `(provider, provider_id)` pair; rows are inserted on first external
//! fetch and never mutated by the planner or assistant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trip::GeoPoint;

/// A stored POI row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub id: i64,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub geom: GeoPoint,
    #[serde(default)]
    pub ext: Value,
    pub created_at: DateTime<Utc>,
}

impl Poi {
    pub fn key(&self) -> (String, String) {
        (self.provider.clone(), self.provider_id.clone())
    }
}

/// Where a POI result came from on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiSource {
    Cache,
    Db,
    Api,
}

impl std::fmt::Display for PoiSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Db => "db",
            Self::Api => "api",
        })
    }
}

/// Wire shape for POI query results, used by the API, the planners and
/// the `poi_around` tool alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoiItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    pub source: PoiSource,
    #[serde(default)]
    pub ext: Value,
}

impl PoiItem {
    pub fn key(&self) -> (String, String) {
        (self.provider.clone(), self.provider_id.clone())
    }
}

/// Result metadata returned alongside POI items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoiQueryMeta {
    pub source: PoiSource,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}
