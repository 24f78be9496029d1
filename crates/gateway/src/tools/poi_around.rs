//! `poi_around` — nearby POI lookup through the cache-aside service.

use std::sync::Arc;

use serde_json::{json, Value};

use wf_domain::Result;

use crate::poi::PoiService;
use crate::tools::{Tool, ToolContext, ToolDescriptor};

pub struct PoiAroundTool {
    poi: Arc<PoiService>,
}

impl PoiAroundTool {
    pub fn new(poi: Arc<PoiService>) -> Self {
        Self { poi }
    }
}

#[async_trait::async_trait]
impl Tool for PoiAroundTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "poi_around",
            description: "Find points of interest around a coordinate, optionally \
                          filtered by category.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "lat": { "type": "number", "minimum": -90, "maximum": 90 },
                    "lng": { "type": "number", "minimum": -180, "maximum": 180 },
                    "type": { "type": "string" },
                    "radius": { "type": "integer", "minimum": 1 },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 100 }
                },
                "required": ["lat", "lng"]
            }),
        }
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value> {
        let lat = args["lat"].as_f64().unwrap_or_default();
        let lng = args["lng"].as_f64().unwrap_or_default();
        let poi_type = args["type"].as_str();
        let radius = args["radius"].as_u64().map(|r| r as u32);
        let limit = args["limit"].as_u64().unwrap_or(20) as usize;

        let (items, meta) = self
            .poi
            .get_poi_around(lat, lng, poi_type, radius, limit)
            .await?;
        Ok(json!({
            "count": items.len(),
            "items": items,
            "meta": meta,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;
    use crate::poi::{InMemoryPoiCache, MockPoiProvider};
    use crate::tools::ToolRegistry;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use wf_domain::config::PoiConfig;
    use wf_storage::MemoryStorage;

    fn registry() -> ToolRegistry {
        let poi = Arc::new(PoiService::new(
            PoiConfig::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(InMemoryPoiCache::new(16)),
            Arc::new(MockPoiProvider),
            Arc::new(MetricsRegistry::new()),
            Arc::new(Semaphore::new(4)),
        ));
        let mut reg = ToolRegistry::new(Duration::from_secs(5));
        reg.register(Arc::new(PoiAroundTool::new(poi)));
        reg
    }

    fn ctx() -> ToolContext {
        ToolContext {
            user_id: 1,
            trip_id: None,
            trace_id: "t".into(),
        }
    }

    #[tokio::test]
    async fn finds_pois_around_point() {
        let reg = registry();
        let inv = reg
            .invoke(
                "poi_around",
                json!({"lat": 23.129, "lng": 113.264, "type": "food", "radius": 800}),
                &ctx(),
            )
            .await;
        assert!(inv.ok, "{:?}", inv.outcome);
        assert!(inv.outcome["count"].as_u64().unwrap() > 0);
        assert_eq!(inv.outcome["meta"]["source"], "api");
    }

    #[tokio::test]
    async fn schema_rejects_out_of_range_lat() {
        let reg = registry();
        let inv = reg
            .invoke("poi_around", json!({"lat": 120.0, "lng": 113.264}), &ctx())
            .await;
        assert!(!inv.ok);
    }
}
