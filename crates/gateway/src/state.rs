//! Shared application state passed to all API handlers.

use std::sync::Arc;

use wf_domain::config::Config;
use wf_llm::LlmProvider;
use wf_memory::MemoryService;
use wf_storage::Storage;

use crate::geocode::GeocodeService;
use crate::metrics::MetricsRegistry;
use crate::planner::PlanService;
use crate::poi::PoiService;
use crate::prompts::PromptRegistry;
use crate::runtime::assistant::AssistantService;
use crate::runtime::cancel::CancelMap;
use crate::runtime::connections::ConnectionRegistry;
use crate::runtime::tasks::TaskEngine;
use crate::tools::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub metrics: Arc<MetricsRegistry>,
    pub memory: Arc<MemoryService>,
    pub llm: Arc<dyn LlmProvider>,
    pub prompts: Arc<PromptRegistry>,
    pub poi: Arc<PoiService>,
    pub geocode: Arc<GeocodeService>,
    pub tools: Arc<ToolRegistry>,
    pub planner: Arc<PlanService>,
    pub tasks: Arc<TaskEngine>,
    pub assistant: Arc<AssistantService>,
    pub connections: Arc<ConnectionRegistry>,
    pub cancels: Arc<CancelMap>,
    /// SHA-256 of the admin token, read once at boot. `None` means no
    /// token is configured.
    pub admin_token_hash: Option<[u8; 32]>,
}
