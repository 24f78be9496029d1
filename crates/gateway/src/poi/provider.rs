//! External POI providers: a deterministic mock and the Amap around
//! search. An `amap` selection without a usable API key silently degrades
//! to the mock so keyless environments keep working.

use std::time::Duration;

use serde_json::Value;

use wf_domain::poi::{PoiItem, PoiSource};
use wf_domain::{Error, Result};

#[async_trait::async_trait]
pub trait PoiProvider: Send + Sync {
    async fn search(
        &self,
        lat: f64,
        lng: f64,
        poi_type: Option<&str>,
        radius_m: u32,
        limit: usize,
    ) -> Result<Vec<PoiItem>>;

    fn name(&self) -> &'static str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deterministic sample set keyed by the requested type. The same call
/// always returns the same items, which keeps fast plans reproducible.
#[derive(Default)]
pub struct MockPoiProvider;

#[async_trait::async_trait]
impl PoiProvider for MockPoiProvider {
    async fn search(
        &self,
        lat: f64,
        lng: f64,
        poi_type: Option<&str>,
        _radius_m: u32,
        limit: usize,
    ) -> Result<Vec<PoiItem>> {
        let type_str = poi_type.unwrap_or("place");
        let count = limit.min(10);
        Ok((0..count)
            .map(|idx| {
                let offset = (idx as f64 + 1.0) * 0.001;
                PoiItem {
                    id: None,
                    provider: "mock".into(),
                    provider_id: format!("{type_str}-{idx}"),
                    name: format!("Mock {} {}", capitalize(type_str), idx + 1),
                    category: Some(type_str.to_owned()),
                    addr: Some(format!("{} Nearby Rd", idx + 1)),
                    rating: Some(((4.0 - idx as f64 * 0.05) * 100.0).round() / 100.0),
                    lat: lat + offset,
                    lng: lng + offset,
                    distance_m: None,
                    source: PoiSource::Api,
                    ext: Value::Null,
                }
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Amap provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AmapPoiProvider {
    api_key: String,
    client: reqwest::Client,
}

impl AmapPoiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn search_once(
        &self,
        lat: f64,
        lng: f64,
        poi_type: Option<&str>,
        radius_m: u32,
        limit: usize,
    ) -> Result<Vec<PoiItem>> {
        let mut query: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone()),
            ("location", format!("{lng},{lat}")),
            ("radius", radius_m.to_string()),
            ("offset", limit.min(20).to_string()),
            ("sortrule", "distance".into()),
            ("page", "1".into()),
            ("output", "JSON".into()),
        ];
        if let Some(t) = poi_type {
            query.push(("types", t.to_owned()));
        }

        let payload: Value = self
            .client
            .get("https://restapi.amap.com/v3/place/around")
            .query(&query)
            .timeout(Duration::from_secs(6))
            .send()
            .await
            .map_err(|e| Error::PoiProvider(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::PoiProvider(e.to_string()))?;

        if payload["status"].as_str() != Some("1") {
            let info = payload["info"].as_str().unwrap_or("amap_error");
            return Err(Error::PoiProvider(format!("amap api failed: {info}")));
        }

        let mut items = Vec::new();
        for raw in payload["pois"].as_array().into_iter().flatten().take(limit) {
            let Some(location) = raw["location"].as_str() else {
                continue;
            };
            let Some((lng_str, lat_str)) = location.split_once(',') else {
                continue;
            };
            let (Ok(item_lat), Ok(item_lng)) = (lat_str.parse(), lng_str.parse()) else {
                continue;
            };
            items.push(PoiItem {
                id: None,
                provider: "amap".into(),
                provider_id: raw["id"].as_str().unwrap_or_default().to_owned(),
                name: raw["name"].as_str().unwrap_or_default().to_owned(),
                category: raw["type"].as_str().map(str::to_owned),
                addr: raw["address"].as_str().map(str::to_owned),
                rating: raw["biz_ext"]["rating"]
                    .as_str()
                    .and_then(|r| r.parse().ok()),
                lat: item_lat,
                lng: item_lng,
                distance_m: None,
                source: PoiSource::Api,
                ext: serde_json::json!({
                    "tel": raw["tel"],
                    "city": raw["cityname"],
                }),
            });
        }
        Ok(items)
    }
}

#[async_trait::async_trait]
impl PoiProvider for AmapPoiProvider {
    async fn search(
        &self,
        lat: f64,
        lng: f64,
        poi_type: Option<&str>,
        radius_m: u32,
        limit: usize,
    ) -> Result<Vec<PoiItem>> {
        // One retry on transient failure.
        match self.search_once(lat, lng, poi_type, radius_m, limit).await {
            Ok(items) => Ok(items),
            Err(first) => {
                tracing::warn!(error = %first, "amap search failed, retrying once");
                self.search_once(lat, lng, poi_type, radius_m, limit).await
            }
        }
    }

    fn name(&self) -> &'static str {
        "amap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_is_deterministic() {
        let provider = MockPoiProvider;
        let a = provider.search(23.13, 113.26, Some("food"), 800, 5).await.unwrap();
        let b = provider.search(23.13, 113.26, Some("food"), 800, 5).await.unwrap();
        assert_eq!(a.len(), 5);
        assert_eq!(a[0].provider_id, "food-0");
        assert_eq!(a[0].name, "Mock Food 1");
        assert_eq!(
            a.iter().map(|p| p.key()).collect::<Vec<_>>(),
            b.iter().map(|p| p.key()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn mock_caps_at_ten() {
        let provider = MockPoiProvider;
        let items = provider.search(0.0, 0.0, None, 800, 50).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items[0].category.as_deref(), Some("place"));
    }

    #[tokio::test]
    async fn mock_ratings_descend() {
        let provider = MockPoiProvider;
        let items = provider.search(0.0, 0.0, Some("sight"), 800, 3).await.unwrap();
        assert!(items[0].rating > items[1].rating);
        assert!(items[1].rating > items[2].rating);
    }
}
