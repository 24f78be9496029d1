//! `weather_area` — batched realtime/forecast weather per location.
//!
//! Offline-friendly: conditions are derived deterministically from the
//! location name and day offset, tagged `source: "mock"`. A configured
//! real provider would slot in behind the same output shape.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use wf_domain::Result;

use crate::tools::{Tool, ToolContext, ToolDescriptor};

const CONDITIONS: &[&str] = &["sunny", "cloudy", "overcast", "light rain", "showers", "windy"];

pub struct WeatherAreaTool;

impl WeatherAreaTool {
    fn entry(location: &str, day_offset: u64) -> Value {
        let digest = Sha256::digest(format!("{location}:{day_offset}").as_bytes());
        let n = u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]);
        let condition = CONDITIONS[(n % CONDITIONS.len() as u64) as usize];
        let temp_low = 8 + (n / 7 % 15) as i64;
        let temp_high = temp_low + 4 + (n / 11 % 8) as i64;
        json!({
            "location": location,
            "day_offset": day_offset,
            "condition": condition,
            "temp_low_c": temp_low,
            "temp_high_c": temp_high,
        })
    }
}

#[async_trait::async_trait]
impl Tool for WeatherAreaTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "weather_area",
            description: "Realtime or multi-day forecast weather for a batch of \
                          locations.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "locations": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "maxItems": 10
                    },
                    "weather_type": { "enum": ["realtime", "forecast"] },
                    "days": { "type": "integer", "minimum": 1, "maximum": 4 }
                },
                "required": ["locations"]
            }),
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let locations: Vec<&str> = args["locations"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect();
        let weather_type = args["weather_type"].as_str().unwrap_or("realtime");
        let days = if weather_type == "forecast" {
            args["days"].as_u64().unwrap_or(1).clamp(1, 4)
        } else {
            1
        };

        let results: Vec<Value> = locations
            .iter()
            .map(|loc| {
                json!({
                    "location": loc,
                    "weather_type": weather_type,
                    "entries": (0..days).map(|d| Self::entry(loc, d)).collect::<Vec<_>>(),
                })
            })
            .collect();

        Ok(json!({
            "source": "mock",
            "count": results.len(),
            "results": results,
        }))
    }
}
