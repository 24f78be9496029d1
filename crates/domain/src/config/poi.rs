use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POI service configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// External POI provider selection. `amap` without an API key silently
/// degrades to `mock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoiProviderKind {
    #[default]
    Mock,
    Amap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoiConfig {
    #[serde(default)]
    pub provider: PoiProviderKind,
    /// Environment variable holding the Amap API key.
    #[serde(default = "d_amap_key_env")]
    pub amap_key_env: String,
    #[serde(default = "d_default_radius")]
    pub default_radius_m: u32,
    #[serde(default = "d_max_radius")]
    pub max_radius_m: u32,
    #[serde(default = "d_cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Decimal places kept when quantizing coordinates into cache keys.
    #[serde(default = "d_coord_precision")]
    pub coord_precision: u32,
    #[serde(default = "d_true")]
    pub cache_enabled: bool,
    /// Below this many local hits the external provider is consulted.
    #[serde(default = "d_min_results")]
    pub min_results: usize,
    /// Entry cap of the in-memory cache (LRU eviction).
    #[serde(default = "d_cache_capacity")]
    pub cache_capacity: usize,
    /// Semaphore bound shared by POI/geocode/LLM external calls.
    #[serde(default = "d_max_concurrent_external")]
    pub max_concurrent_external: usize,
}

impl Default for PoiConfig {
    fn default() -> Self {
        Self {
            provider: PoiProviderKind::Mock,
            amap_key_env: d_amap_key_env(),
            default_radius_m: d_default_radius(),
            max_radius_m: d_max_radius(),
            cache_ttl_seconds: d_cache_ttl(),
            coord_precision: d_coord_precision(),
            cache_enabled: true,
            min_results: d_min_results(),
            cache_capacity: d_cache_capacity(),
            max_concurrent_external: d_max_concurrent_external(),
        }
    }
}

fn d_amap_key_env() -> String {
    "WF_AMAP_API_KEY".into()
}

fn d_default_radius() -> u32 {
    1000
}

fn d_max_radius() -> u32 {
    5000
}

fn d_cache_ttl() -> u64 {
    300
}

fn d_coord_precision() -> u32 {
    4
}

fn d_true() -> bool {
    true
}

fn d_min_results() -> usize {
    3
}

fn d_cache_capacity() -> usize {
    1024
}

fn d_max_concurrent_external() -> usize {
    8
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Geocode configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeProviderKind {
    #[default]
    Mock,
    Amap,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default)]
    pub provider: GeocodeProviderKind,
    #[serde(default = "d_geocode_ttl")]
    pub cache_ttl_seconds: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            provider: GeocodeProviderKind::Mock,
            cache_ttl_seconds: d_geocode_ttl(),
        }
    }
}

fn d_geocode_ttl() -> u64 {
    3600
}
