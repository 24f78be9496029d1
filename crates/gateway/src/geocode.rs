//! Destination → city-center resolution with a TTL cache and layered
//! fallbacks. The mock provider derives a deterministic pseudo-center
//! from a hash of the destination; its use is visible to metrics through
//! [`CityCenter::is_pseudo`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use wf_domain::config::{GeocodeConfig, GeocodeProviderKind};
use wf_domain::trip::GeoPoint;
use wf_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct CityCenter {
    pub point: GeoPoint,
    pub provider: &'static str,
    /// Where the value came from: `deterministic`, `api`, or a
    /// `fallback_*` tag naming why the provider was bypassed.
    pub source: &'static str,
}

impl CityCenter {
    /// True when the point is hash-derived rather than geocoded.
    pub fn is_pseudo(&self) -> bool {
        self.source != "api"
    }
}

/// Deterministic pseudo-center: lat in 20.00..35.00, lng in 100.00..125.00.
fn pseudo_city_center(destination: &str) -> GeoPoint {
    let digest = Sha256::digest(destination.as_bytes());
    let n1 = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let n2 = u32::from_be_bytes([digest[4], digest[5], digest[6], digest[7]]);
    GeoPoint {
        lat: 20.0 + f64::from(n1 % 1500) / 100.0,
        lng: 100.0 + f64::from(n2 % 2500) / 100.0,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GeocodeService {
    provider: GeocodeProviderKind,
    amap_key: Option<String>,
    ttl: Duration,
    cache: RwLock<HashMap<String, (Instant, CityCenter)>>,
    client: reqwest::Client,
}

impl GeocodeService {
    pub fn new(config: &GeocodeConfig, amap_key: Option<String>) -> Self {
        Self {
            provider: config.provider,
            amap_key,
            ttl: Duration::from_secs(config.cache_ttl_seconds.max(60)),
            cache: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
        }
    }

    pub async fn resolve_city_center(&self, destination: &str) -> Result<CityCenter> {
        let dest = destination.trim();
        if dest.is_empty() {
            return Err(Error::InvalidParams("destination must not be empty".into()));
        }

        if self.provider == GeocodeProviderKind::Disabled {
            return Ok(CityCenter {
                point: pseudo_city_center(dest),
                provider: "disabled",
                source: "fallback_pseudo",
            });
        }

        let cache_key = format!("geocode:center:{:?}:{dest}", self.provider);
        if let Some((expires, center)) = self.cache.read().get(&cache_key) {
            if *expires > Instant::now() {
                return Ok(center.clone());
            }
        }

        let center = match self.provider {
            GeocodeProviderKind::Mock => CityCenter {
                point: pseudo_city_center(dest),
                provider: "mock",
                source: "deterministic",
            },
            GeocodeProviderKind::Amap => self.amap_city_center(dest).await,
            GeocodeProviderKind::Disabled => unreachable!(),
        };

        self.cache
            .write()
            .insert(cache_key, (Instant::now() + self.ttl, center.clone()));
        Ok(center)
    }

    /// Amap forward geocoding. Every failure mode falls back to the
    /// pseudo-center with a source tag naming the cause.
    async fn amap_city_center(&self, destination: &str) -> CityCenter {
        let fallback = |source: &'static str| CityCenter {
            point: pseudo_city_center(destination),
            provider: "amap",
            source,
        };

        let Some(api_key) = self.amap_key.as_deref() else {
            return fallback("fallback_missing_key");
        };

        let resp = self
            .client
            .get("https://restapi.amap.com/v3/geocode/geo")
            .query(&[("address", destination), ("key", api_key)])
            .timeout(Duration::from_secs(6))
            .send()
            .await;
        let payload: serde_json::Value = match resp {
            Ok(resp) => match resp.json().await {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(destination, error = %e, "geocode response unreadable");
                    return fallback("fallback_parse");
                }
            },
            Err(e) => {
                tracing::warn!(destination, error = %e, "geocode request failed");
                return fallback("fallback");
            }
        };

        if payload["status"].as_str() != Some("1") {
            return fallback("fallback_bad_status");
        }
        let Some(location) = payload["geocodes"][0]["location"].as_str() else {
            return fallback("fallback_empty");
        };
        let Some((lng_str, lat_str)) = location.split_once(',') else {
            return fallback("fallback_missing_location");
        };
        match (lat_str.parse::<f64>(), lng_str.parse::<f64>()) {
            (Ok(lat), Ok(lng)) => match GeoPoint::new(lat, lng) {
                Ok(point) => CityCenter {
                    point,
                    provider: "amap",
                    source: "api",
                },
                Err(_) => fallback("fallback_parse"),
            },
            _ => fallback("fallback_parse"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(kind: GeocodeProviderKind) -> GeocodeService {
        let config = GeocodeConfig {
            provider: kind,
            cache_ttl_seconds: 3600,
        };
        GeocodeService::new(&config, None)
    }

    #[test]
    fn pseudo_center_is_deterministic_and_in_range() {
        let a = pseudo_city_center("Guangzhou");
        let b = pseudo_city_center("Guangzhou");
        assert_eq!(a, b);
        assert!((20.0..=35.0).contains(&a.lat));
        assert!((100.0..=125.0).contains(&a.lng));

        let other = pseudo_city_center("Chengdu");
        assert_ne!(a, other);
    }

    #[tokio::test]
    async fn mock_resolves_deterministically() {
        let service = service(GeocodeProviderKind::Mock);
        let first = service.resolve_city_center("Guangzhou").await.unwrap();
        let second = service.resolve_city_center("Guangzhou").await.unwrap();
        assert_eq!(first.point, second.point);
        assert_eq!(first.source, "deterministic");
        assert!(first.is_pseudo());
    }

    #[tokio::test]
    async fn disabled_tags_fallback() {
        let service = service(GeocodeProviderKind::Disabled);
        let center = service.resolve_city_center("Guangzhou").await.unwrap();
        assert_eq!(center.provider, "disabled");
        assert_eq!(center.source, "fallback_pseudo");
    }

    #[tokio::test]
    async fn amap_without_key_degrades_to_pseudo() {
        let service = service(GeocodeProviderKind::Amap);
        let center = service.resolve_city_center("Guangzhou").await.unwrap();
        assert_eq!(center.source, "fallback_missing_key");
        assert!(center.is_pseudo());
    }

    #[tokio::test]
    async fn empty_destination_rejected() {
        let service = service(GeocodeProviderKind::Mock);
        assert!(service.resolve_city_center("  ").await.is_err());
    }
}
