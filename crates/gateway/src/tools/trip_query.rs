//! `trip_query` — read a trip (or one of its days) for the calling user.

use std::sync::Arc;

use serde_json::{json, Value};

use wf_domain::{Error, Result};
use wf_storage::{Storage, TripStore};

use crate::tools::{Tool, ToolContext, ToolDescriptor};

pub struct TripQueryTool {
    storage: Arc<dyn Storage>,
}

impl TripQueryTool {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl Tool for TripQueryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "trip_query",
            description: "Read the caller's trip with its day cards and sub-trips; \
                          optionally a single day.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "trip_id": { "type": "integer", "minimum": 1 },
                    "day": { "type": "integer", "minimum": 0 }
                },
                "required": ["trip_id"]
            }),
        }
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let trip_id = args["trip_id"].as_i64().unwrap_or_default();
        let plan = self
            .storage
            .fetch_trip(trip_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("trip {trip_id}")))?;

        // Ownership is enforced here, not at the call site: a tool must be
        // safe no matter which pipeline invokes it.
        if plan.user_id != ctx.user_id {
            return Err(Error::NotAuthorized(format!(
                "trip {trip_id} is not owned by user {}",
                ctx.user_id
            )));
        }

        if let Some(day) = args["day"].as_u64() {
            let card = plan
                .day_cards
                .iter()
                .find(|c| u64::from(c.day_index) == day)
                .ok_or_else(|| Error::NotFound(format!("trip {trip_id} day {day}")))?;
            return Ok(json!({
                "trip_id": trip_id,
                "destination": plan.destination,
                "day_card": card,
            }));
        }

        Ok(json!({
            "trip_id": trip_id,
            "destination": plan.destination,
            "day_count": plan.day_count,
            "sub_trip_count": plan.sub_trip_count,
            "trip": plan,
        }))
    }
}
