//! Cache-aside POI lookups: normalized cache key → local spatial store →
//! external provider, with dedup + insert-if-absent on fetch and graceful
//! degradation when the provider fails.

mod cache;
mod provider;

pub use cache::{InMemoryPoiCache, PoiCache};
pub use provider::{AmapPoiProvider, MockPoiProvider, PoiProvider};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use wf_domain::config::{PoiConfig, PoiProviderKind};
use wf_domain::poi::{PoiItem, PoiQueryMeta, PoiSource};
use wf_domain::trip::GeoPoint;
use wf_domain::{Error, Result};
use wf_storage::{PoiStore, Storage};

use crate::metrics::MetricsRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache entry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    items: Vec<PoiItem>,
    origin: PoiSource,
    generated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PoiService {
    config: PoiConfig,
    storage: Arc<dyn Storage>,
    cache: Arc<dyn PoiCache>,
    provider: Arc<dyn PoiProvider>,
    metrics: Arc<MetricsRegistry>,
    external: Arc<Semaphore>,
}

impl PoiService {
    pub fn new(
        config: PoiConfig,
        storage: Arc<dyn Storage>,
        cache: Arc<dyn PoiCache>,
        provider: Arc<dyn PoiProvider>,
        metrics: Arc<MetricsRegistry>,
        external: Arc<Semaphore>,
    ) -> Self {
        Self {
            config,
            storage,
            cache,
            provider,
            metrics,
            external,
        }
    }

    /// Build the provider selected by config. `amap` without a key in the
    /// configured env var silently degrades to the mock.
    pub fn provider_from_config(config: &PoiConfig) -> Arc<dyn PoiProvider> {
        match config.provider {
            PoiProviderKind::Amap => {
                match std::env::var(&config.amap_key_env).ok().filter(|k| !k.is_empty()) {
                    Some(key) => Arc::new(AmapPoiProvider::new(key)),
                    None => {
                        tracing::warn!(
                            env = %config.amap_key_env,
                            "amap key not set, degrading POI provider to mock"
                        );
                        Arc::new(MockPoiProvider)
                    }
                }
            }
            PoiProviderKind::Mock => Arc::new(MockPoiProvider),
        }
    }

    /// The cache-aside read path. See module docs for the step order.
    pub async fn get_poi_around(
        &self,
        lat: f64,
        lng: f64,
        poi_type: Option<&str>,
        radius_m: Option<u32>,
        limit: usize,
    ) -> Result<(Vec<PoiItem>, PoiQueryMeta)> {
        // 1. Input validation — `invalid_params`, never a 500-equivalent.
        let center = GeoPoint::new(lat, lng)?;
        let max_radius = self.config.max_radius_m.max(1);
        let radius = radius_m.unwrap_or(self.config.default_radius_m.min(max_radius));
        if radius == 0 || radius > max_radius {
            return Err(Error::InvalidParams(format!(
                "radius must be within 1..={max_radius} meters"
            )));
        }
        if limit == 0 || limit > 100 {
            return Err(Error::InvalidParams("limit must be within 1..=100".into()));
        }
        let normalized_type = poi_type.map(str::trim).filter(|t| !t.is_empty());

        // 2. Cache lookup under the quantized key.
        let cache_key = self.cache_key(lat, lng, normalized_type, radius);
        if self.config.cache_enabled {
            if let Some(raw) = self.cache.get(&cache_key).await {
                if let Ok(entry) = serde_json::from_str::<CacheEntry>(&raw) {
                    self.metrics.poi_cache_hit();
                    let mut items = entry.items;
                    items.truncate(limit);
                    return Ok((
                        items,
                        PoiQueryMeta {
                            source: PoiSource::Cache,
                            degraded: false,
                        },
                    ));
                }
            }
            self.metrics.poi_cache_miss();
        }

        // 3. Local spatial store.
        let db_items = self
            .storage
            .query_pois_radius(center, f64::from(radius), normalized_type, limit)
            .await?;
        if db_items.len() >= self.config.min_results {
            self.cache_put(&cache_key, &db_items, PoiSource::Db).await;
            return Ok((
                db_items,
                PoiQueryMeta {
                    source: PoiSource::Db,
                    degraded: false,
                },
            ));
        }

        // 4. External provider, bounded by the shared semaphore.
        self.metrics.poi_api_call();
        let fetched = {
            let _permit = self.external.acquire().await.map_err(|_| {
                Error::Internal("external call semaphore closed".into())
            })?;
            self.provider
                .search(lat, lng, normalized_type, radius, limit)
                .await
        };

        match fetched {
            Ok(api_items) if !api_items.is_empty() => {
                self.storage.insert_missing_pois(&api_items).await?;
                let merged = merge_by_distance(db_items, api_items, center, limit);
                self.cache_put(&cache_key, &merged, PoiSource::Api).await;
                Ok((
                    merged,
                    PoiQueryMeta {
                        source: PoiSource::Api,
                        degraded: false,
                    },
                ))
            }
            Ok(_) => {
                // Provider had nothing to add; whatever the store had wins.
                self.cache_put(&cache_key, &db_items, PoiSource::Db).await;
                Ok((
                    db_items,
                    PoiQueryMeta {
                        source: PoiSource::Db,
                        degraded: false,
                    },
                ))
            }
            // 5. Provider failure degrades to local results.
            Err(e) => {
                self.metrics.poi_api_failure();
                tracing::warn!(provider = self.provider.name(), error = %e, "poi provider failed");
                Ok((
                    db_items,
                    PoiQueryMeta {
                        source: PoiSource::Db,
                        degraded: true,
                    },
                ))
            }
        }
    }

    fn cache_key(&self, lat: f64, lng: f64, poi_type: Option<&str>, radius: u32) -> String {
        let precision = self.config.coord_precision as usize;
        let type_q = poi_type.unwrap_or("all").replace(':', "_");
        format!(
            "poi:around:{lat:.precision$}:{lng:.precision$}:{type_q}:{radius}",
        )
    }

    async fn cache_put(&self, key: &str, items: &[PoiItem], origin: PoiSource) {
        if !self.config.cache_enabled {
            return;
        }
        let entry = CacheEntry {
            items: items.to_vec(),
            origin,
            generated_at: Utc::now(),
        };
        match serde_json::to_string(&entry) {
            Ok(raw) => {
                self.cache
                    .set(key, raw, Duration::from_secs(self.config.cache_ttl_seconds.max(1)))
                    .await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize poi cache entry"),
        }
    }
}

/// Merge DB rows with freshly fetched items: DB wins on key collision,
/// distances are computed for API items, and the result is sorted by
/// distance ascending.
fn merge_by_distance(
    db_items: Vec<PoiItem>,
    api_items: Vec<PoiItem>,
    center: GeoPoint,
    limit: usize,
) -> Vec<PoiItem> {
    let mut seen: std::collections::HashSet<(String, String)> =
        db_items.iter().map(PoiItem::key).collect();
    let mut merged = db_items;
    for mut item in api_items {
        if !seen.insert(item.key()) {
            continue;
        }
        if item.distance_m.is_none() {
            if let Ok(point) = GeoPoint::new(item.lat, item.lng) {
                item.distance_m = Some((center.distance_m(&point) * 100.0).round() / 100.0);
            }
        }
        merged.push(item);
    }
    merged.sort_by(|a, b| {
        let da = a.distance_m.unwrap_or(f64::MAX);
        let db = b.distance_m.unwrap_or(f64::MAX);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_storage::MemoryStorage;

    struct FailingProvider;

    #[async_trait::async_trait]
    impl PoiProvider for FailingProvider {
        async fn search(
            &self,
            _: f64,
            _: f64,
            _: Option<&str>,
            _: u32,
            _: usize,
        ) -> Result<Vec<PoiItem>> {
            Err(Error::PoiProvider("down".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn service_with(provider: Arc<dyn PoiProvider>) -> (PoiService, Arc<MetricsRegistry>) {
        let metrics = Arc::new(MetricsRegistry::new());
        let service = PoiService::new(
            PoiConfig::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(InMemoryPoiCache::new(64)),
            provider,
            metrics.clone(),
            Arc::new(Semaphore::new(4)),
        );
        (service, metrics)
    }

    fn poi_counters(metrics: &MetricsRegistry) -> (u64, u64, u64, u64) {
        let snap = metrics.snapshot(0, 0);
        (
            snap["poi"]["cache_hits"].as_u64().unwrap(),
            snap["poi"]["cache_misses"].as_u64().unwrap(),
            snap["poi"]["api_calls"].as_u64().unwrap(),
            snap["poi"]["api_failures"].as_u64().unwrap(),
        )
    }

    #[tokio::test]
    async fn cache_aside_api_then_cache() {
        let (service, metrics) = service_with(Arc::new(MockPoiProvider));

        // Empty store + empty cache: first call comes from the provider.
        let (items_a, meta_a) = service
            .get_poi_around(23.129, 113.264, Some("food"), Some(800), 20)
            .await
            .unwrap();
        assert!(!items_a.is_empty());
        assert_eq!(meta_a.source, PoiSource::Api);
        assert_eq!(poi_counters(&metrics), (0, 1, 1, 0));

        // Identical call within TTL: served from cache in the same order.
        let (items_b, meta_b) = service
            .get_poi_around(23.129, 113.264, Some("food"), Some(800), 20)
            .await
            .unwrap();
        assert_eq!(meta_b.source, PoiSource::Cache);
        assert_eq!(
            items_a.iter().map(PoiItem::key).collect::<Vec<_>>(),
            items_b.iter().map(PoiItem::key).collect::<Vec<_>>()
        );
        assert_eq!(poi_counters(&metrics), (1, 1, 1, 0));
    }

    #[tokio::test]
    async fn db_hit_skips_provider() {
        let (service, metrics) = service_with(Arc::new(MockPoiProvider));
        // Seed the store with enough rows to satisfy min_results.
        let seed = MockPoiProvider
            .search(23.129, 113.264, Some("food"), 800, 5)
            .await
            .unwrap();
        service.storage.insert_missing_pois(&seed).await.unwrap();

        let (items, meta) = service
            .get_poi_around(23.129, 113.264, Some("food"), Some(2000), 20)
            .await
            .unwrap();
        assert_eq!(meta.source, PoiSource::Db);
        assert!(items.len() >= 3);
        // Sorted by distance.
        let distances: Vec<f64> = items.iter().filter_map(|i| i.distance_m).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(poi_counters(&metrics).2, 0, "no api call expected");
    }

    #[tokio::test]
    async fn provider_failure_degrades() {
        let (service, metrics) = service_with(Arc::new(FailingProvider));
        let (items, meta) = service
            .get_poi_around(23.129, 113.264, Some("food"), Some(800), 20)
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(meta.source, PoiSource::Db);
        assert!(meta.degraded);
        let (_, _, api_calls, api_failures) = poi_counters(&metrics);
        assert_eq!(api_calls, 1);
        assert_eq!(api_failures, 1);
    }

    #[tokio::test]
    async fn invalid_inputs_rejected() {
        let (service, _) = service_with(Arc::new(MockPoiProvider));
        let err = service
            .get_poi_around(120.0, 113.264, None, None, 20)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");

        let max = PoiConfig::default().max_radius_m;
        let err = service
            .get_poi_around(23.1, 113.2, None, Some(max + 1), 20)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");

        // Exactly at the cap succeeds.
        assert!(service
            .get_poi_around(23.1, 113.2, None, Some(max), 20)
            .await
            .is_ok());

        let err = service
            .get_poi_around(23.1, 113.2, None, None, 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
    }

    #[tokio::test]
    async fn fetched_items_are_persisted_once() {
        let (service, _) = service_with(Arc::new(MockPoiProvider));
        service
            .get_poi_around(23.129, 113.264, Some("food"), Some(800), 20)
            .await
            .unwrap();
        // The provider rows landed in the store.
        let stored = service
            .storage
            .query_pois_radius(
                GeoPoint::new(23.129, 113.264).unwrap(),
                5000.0,
                Some("food"),
                50,
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 10);
    }

    #[test]
    fn cache_key_quantizes_coordinates() {
        let (service, _) = service_with(Arc::new(MockPoiProvider));
        let a = service.cache_key(23.12944, 113.26441, Some("food"), 800);
        let b = service.cache_key(23.12941, 113.26439, Some("food"), 800);
        assert_eq!(a, b);
        assert!(a.starts_with("poi:around:23.1294:113.2644:food:800"));

        let c = service.cache_key(23.12944, 113.26441, None, 800);
        assert!(c.contains(":all:"));
    }
}
