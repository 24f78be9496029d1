//! POI endpoint.
//!
//! - `GET /api/poi/around?lat&lng&type&radius&limit`

use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use crate::api::{err, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AroundQuery {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type")]
    pub poi_type: Option<String>,
    pub radius: Option<u32>,
    pub limit: Option<usize>,
}

pub async fn around(State(state): State<AppState>, Query(query): Query<AroundQuery>) -> Response {
    let limit = query.limit.unwrap_or(50);
    match state
        .poi
        .get_poi_around(
            query.lat,
            query.lng,
            query.poi_type.as_deref(),
            query.radius,
            limit,
        )
        .await
    {
        Ok((items, meta)) => ok(json!({ "items": items, "meta": meta })),
        Err(e) => err(&e, None),
    }
}
