//! AppState construction and worker startup. Shared by the binary and
//! the integration tests so both boot the exact same wiring.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use wf_domain::config::{Config, ConfigSeverity};
use wf_memory::{LocalMemoryEngine, MemoryService};
use wf_storage::{MemoryStorage, Storage};

use crate::geocode::GeocodeService;
use crate::metrics::MetricsRegistry;
use crate::planner::{DeepPlanner, FastPlanner, PlanService};
use crate::poi::{InMemoryPoiCache, PoiService};
use crate::prompts::PromptRegistry;
use crate::runtime::assistant::AssistantService;
use crate::runtime::cancel::CancelMap;
use crate::runtime::connections::ConnectionRegistry;
use crate::runtime::tasks::TaskEngine;
use crate::state::AppState;
use crate::tools::{PathNavigateTool, PoiAroundTool, ToolRegistry, TripQueryTool, WeatherAreaTool};

/// Validate config, initialize every subsystem, start the task workers
/// and return a fully wired [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    tracing::info!("storage ready (in-memory backend)");

    // ── Metrics ──────────────────────────────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new());

    // ── Memory service ───────────────────────────────────────────────
    let memory = if config.memory.enabled {
        Arc::new(MemoryService::new(Arc::new(LocalMemoryEngine::new())))
    } else {
        Arc::new(MemoryService::disabled())
    };
    tracing::info!(enabled = config.memory.enabled, "memory service ready");

    // ── LLM provider ─────────────────────────────────────────────────
    let llm = wf_llm::create_provider(&config.llm);
    tracing::info!(provider = llm.provider_id(), "LLM provider ready");

    // ── Prompt registry ──────────────────────────────────────────────
    let prompts = Arc::new(PromptRegistry::new(
        storage.clone(),
        config.prompts.cache_ttl_seconds,
    ));

    // ── External-call budget (POI + geocode + LLM) ───────────────────
    let external = Arc::new(Semaphore::new(config.poi.max_concurrent_external.max(1)));

    // ── POI + geocode ────────────────────────────────────────────────
    let amap_key = std::env::var(&config.poi.amap_key_env)
        .ok()
        .filter(|k| !k.is_empty());
    let poi = Arc::new(PoiService::new(
        config.poi.clone(),
        storage.clone(),
        Arc::new(InMemoryPoiCache::new(config.poi.cache_capacity)),
        PoiService::provider_from_config(&config.poi),
        metrics.clone(),
        external,
    ));
    let geocode = Arc::new(GeocodeService::new(&config.geocode, amap_key));
    tracing::info!(provider = ?config.poi.provider, "poi service ready");

    // ── Tools ────────────────────────────────────────────────────────
    let mut tools = ToolRegistry::new(Duration::from_secs(10));
    tools.register(Arc::new(PoiAroundTool::new(poi.clone())));
    tools.register(Arc::new(TripQueryTool::new(storage.clone())));
    tools.register(Arc::new(WeatherAreaTool));
    tools.register(Arc::new(PathNavigateTool));
    let tools = Arc::new(tools);
    tracing::info!(tools = tools.names().len(), "tool registry ready");

    // ── Planners ─────────────────────────────────────────────────────
    let fast = Arc::new(FastPlanner::new(
        config.clone(),
        storage.clone(),
        poi.clone(),
        geocode.clone(),
    ));
    let deep = Arc::new(DeepPlanner::new(
        config.clone(),
        fast.clone(),
        poi.clone(),
        geocode.clone(),
        llm.clone(),
        memory.clone(),
        prompts.clone(),
        metrics.clone(),
    ));
    let planner = Arc::new(PlanService::new(
        config.clone(),
        storage.clone(),
        fast,
        deep,
        metrics.clone(),
    ));

    // ── Task engine ──────────────────────────────────────────────────
    let mut tasks = TaskEngine::new(config.tasks.clone(), storage.clone());
    tasks.register_handler(planner.clone());
    let tasks = Arc::new(tasks);
    tasks.start().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    // ── Assistant ────────────────────────────────────────────────────
    let assistant = Arc::new(AssistantService::new(
        config.clone(),
        storage.clone(),
        memory.clone(),
        llm.clone(),
        prompts.clone(),
        tools.clone(),
        metrics.clone(),
    ));
    tracing::info!("assistant service ready");

    // ── Admin token (read once, hashed for constant-time compare) ────
    let admin_token_hash = std::env::var(&config.admin.token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| {
            let digest = Sha256::digest(t.as_bytes());
            let mut out = [0u8; 32];
            out.copy_from_slice(&digest);
            out
        });
    if admin_token_hash.is_some() {
        tracing::info!("admin token loaded");
    } else {
        tracing::warn!(
            env = %config.admin.token_env,
            "no admin token configured — admin endpoints rely on the IP allowlist (or are open)"
        );
    }

    Ok(AppState {
        config,
        storage,
        metrics,
        memory,
        llm,
        prompts,
        poi,
        geocode,
        tools,
        planner,
        tasks,
        assistant,
        connections: Arc::new(ConnectionRegistry::new()),
        cancels: Arc::new(CancelMap::new()),
        admin_token_hash,
    })
}
