//! Core itinerary entities: a trip owns per-day cards, each card owns an
//! ordered list of sub-trip activities.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Geometry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Construct a point, rejecting out-of-range coordinates.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(Error::InvalidParams(format!(
                "coordinates out of range: ({lat}, {lng})"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Great-circle distance to `other`, in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lng - self.lng).to_radians();
        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Walk,
    Bike,
    Drive,
    Transit,
}

impl std::str::FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "walk" => Ok(Self::Walk),
            "bike" => Ok(Self::Bike),
            "drive" => Ok(Self::Drive),
            "transit" => Ok(Self::Transit),
            other => Err(Error::InvalidParams(format!("unknown transport: {other}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persisted entities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Aggregate root. `start_date <= end_date` always holds for stored rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    #[serde(default)]
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn day_count(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// One day of a trip; `(trip_id, day_index)` is unique, indexes are dense
/// from 0 and `date == trip.start_date + day_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayCard {
    pub id: i64,
    pub trip_id: i64,
    pub day_index: u32,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One activity within a day; `(day_card_id, order_index)` is unique and
/// dense from 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTrip {
    pub id: i64,
    pub day_card_id: i64,
    pub order_index: u32,
    pub activity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poi_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geom: Option<GeoPoint>,
    #[serde(default)]
    pub ext: Value,
}
