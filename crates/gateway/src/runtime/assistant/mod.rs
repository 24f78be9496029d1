//! Assistant dialogue pipeline.
//!
//! One turn = load_context → memory_retrieve → rule_router →
//! tool_args_normalize → task_runner → answer_compose → persist. Every
//! step except answer_compose is deterministic, and answer_compose makes
//! at most one LLM call (skipped entirely when a tool result already
//! answers the intent). Streaming callers receive ordered chunk events;
//! the terminal result/error is the return value, emitted once by the
//! transport.

pub mod render;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use wf_domain::chat::{AiMeta, AssistantEvent, ChatPayload, ChatResult, Role, StoredMessage};
use wf_domain::config::Config;
use wf_domain::memory::MemoryLevel;
use wf_domain::trace::{new_trace_id, ToolTrace};
use wf_domain::{Error, Result};
use wf_llm::{ChatMessage, ChatRequest, LlmProvider};
use wf_memory::MemoryService;
use wf_storage::{ChatStore, NewMessage, Storage};

use crate::metrics::MetricsRegistry;
use crate::prompts::PromptRegistry;
use crate::runtime::cancel::CancelToken;
use crate::tools::{ToolContext, ToolInvocation, ToolRegistry};
use render::{deterministic_answer, history_block, memory_block, tool_results_block};
use router::{route, Intent, RouteDecision};

/// Channel the streaming transports listen on for chunk events.
pub type EventSink = mpsc::Sender<AssistantEvent>;

pub struct AssistantService {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    memory: Arc<MemoryService>,
    llm: Arc<dyn LlmProvider>,
    prompts: Arc<PromptRegistry>,
    tools: Arc<ToolRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl AssistantService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        memory: Arc<MemoryService>,
        llm: Arc<dyn LlmProvider>,
        prompts: Arc<PromptRegistry>,
        tools: Arc<ToolRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            storage,
            memory,
            llm,
            prompts,
            tools,
            metrics,
        }
    }

    /// Run one turn under the configured deadline. `sink` receives chunk
    /// events for streaming callers; the final result (or error) is the
    /// return value.
    pub async fn run_chat(
        &self,
        payload: ChatPayload,
        sink: Option<EventSink>,
        cancel: CancelToken,
    ) -> Result<ChatResult> {
        let deadline = Duration::from_secs(self.config.assistant.turn_timeout_s.max(1));
        match tokio::time::timeout(deadline, self.run_turn(payload, sink, cancel)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Internal("turn deadline exceeded".into())),
        }
    }

    async fn run_turn(
        &self,
        payload: ChatPayload,
        sink: Option<EventSink>,
        cancel: CancelToken,
    ) -> Result<ChatResult> {
        let trace_id = new_trace_id("chat");
        let mut traces: Vec<ToolTrace> = Vec::new();

        // ── load_context ────────────────────────────────────────────
        let session = self.load_session(&payload).await?;
        let history = self
            .storage
            .recent_messages(&session.id, self.config.assistant.history_max_rounds * 2)
            .await?;
        traces.push(ToolTrace::ok(
            "load_context",
            None,
            json!({ "history": history.len(), "session_id": session.id }),
        ));
        check_cancelled(&cancel)?;

        // ── memory_retrieve ─────────────────────────────────────────
        let memories = if payload.use_memory {
            let items = self.retrieve_memories(&payload, &session.id).await;
            traces.push(ToolTrace::ok(
                "memory_retrieve",
                None,
                json!({ "count": items.len() }),
            ));
            items
        } else {
            traces.push(ToolTrace::skipped("memory_retrieve", "memory_disabled"));
            Vec::new()
        };
        check_cancelled(&cancel)?;

        // ── rule_router ─────────────────────────────────────────────
        let decision = route(&payload.query);
        traces.push(ToolTrace::ok(
            "rule_router",
            None,
            json!({
                "intent": decision.intent.as_str(),
                "confidence": decision.confidence,
            }),
        ));

        // ── tool_args_normalize + task_runner ───────────────────────
        let invocations = self
            .run_tools(&payload, &decision, &trace_id, &cancel, &mut traces)
            .await?;

        // ── answer_compose ──────────────────────────────────────────
        check_cancelled(&cancel)?;
        let (answer, ai_meta) = match deterministic_answer(decision.intent, &invocations) {
            Some(answer) => {
                traces.push(ToolTrace::ok(
                    "answer_compose",
                    None,
                    json!({ "mode": "deterministic" }),
                ));
                (
                    answer,
                    AiMeta {
                        provider: "rules".into(),
                        model: "deterministic".into(),
                        latency_ms: 0.0,
                        tokens_total: 0,
                        trace_id: trace_id.clone(),
                    },
                )
            }
            None => {
                match self
                    .compose_with_llm(&payload, &history, &memories, &invocations)
                    .await
                {
                    Ok((answer, ai_meta)) => {
                        traces.push(ToolTrace::ok(
                            "answer_compose",
                            Some(ai_meta.latency_ms),
                            json!({ "mode": "llm", "model": ai_meta.model }),
                        ));
                        (answer, ai_meta)
                    }
                    Err(e) => {
                        // Structured failure: persist the user message
                        // alone, then surface the mapped error.
                        self.persist_user_only(&session.id, &payload, decision.intent)
                            .await;
                        return Err(e);
                    }
                }
            }
        };

        // ── streaming ───────────────────────────────────────────────
        // A dropped receiver or an explicit cancel aborts here; nothing
        // has been persisted yet, so the assistant message is discarded.
        if let Some(sink) = &sink {
            self.stream_chunks(sink, &ai_meta.trace_id, &answer, &cancel)
                .await?;
        }
        check_cancelled(&cancel)?;

        // ── persist ─────────────────────────────────────────────────
        let trace_summary: Vec<Value> = traces
            .iter()
            .map(|t| json!({ "node": t.node, "status": t.status }))
            .collect();
        let stored = self
            .storage
            .append_turn(
                &session.id,
                vec![
                    NewMessage {
                        role: Role::User,
                        content: payload.query.clone(),
                        tokens: None,
                        meta: json!({ "intent": decision.intent.as_str() }),
                    },
                    NewMessage {
                        role: Role::Assistant,
                        content: answer.clone(),
                        tokens: Some(ai_meta.tokens_total),
                        meta: json!({
                            "intent": decision.intent.as_str(),
                            "tool_traces": trace_summary,
                            "ai_meta": {
                                "provider": ai_meta.provider,
                                "model": ai_meta.model,
                                "latency_ms": ai_meta.latency_ms,
                                "trace_id": ai_meta.trace_id,
                            },
                        }),
                    },
                ],
            )
            .await?;

        self.write_turn_memory(&payload, &session.id, &answer).await;

        Ok(ChatResult {
            session_id: session.id,
            answer,
            intent: Some(decision.intent.as_str().to_owned()),
            used_memory: if payload.return_memory { memories } else { Vec::new() },
            tool_traces: if payload.return_tool_traces { traces } else { Vec::new() },
            ai_meta,
            messages: if payload.return_messages { stored } else { Vec::new() },
        })
    }

    // ── load_context ────────────────────────────────────────────────

    /// Resolve or create the session. Ownership is checked before any
    /// read or write touching the session id.
    async fn load_session(&self, payload: &ChatPayload) -> Result<wf_domain::chat::ChatSession> {
        match &payload.session_id {
            Some(session_id) => {
                let session = self
                    .storage
                    .get_session(session_id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
                if session.user_id != payload.user_id {
                    return Err(Error::NotAuthorized(format!(
                        "session {session_id} is not owned by user {}",
                        payload.user_id
                    )));
                }
                Ok(session)
            }
            None => {
                let session = self
                    .storage
                    .create_session(payload.user_id, payload.trip_id)
                    .await?;
                tracing::info!(session_id = %session.id, user_id = payload.user_id, "session created");
                Ok(session)
            }
        }
    }

    // ── memory_retrieve ─────────────────────────────────────────────

    /// Scoped retrieval, session > trip > user, deduplicated by text and
    /// bounded to the requested `k`.
    async fn retrieve_memories(
        &self,
        payload: &ChatPayload,
        session_id: &str,
    ) -> Vec<wf_domain::memory::MemoryItem> {
        let k = payload
            .top_k_memory
            .unwrap_or(self.config.assistant.memory_top_k)
            .max(1);

        let mut items = self
            .memory
            .search(
                payload.user_id,
                MemoryLevel::Session,
                &payload.query,
                None,
                Some(session_id),
                k,
            )
            .await;
        if let Some(trip_id) = payload.trip_id {
            items.extend(
                self.memory
                    .search(
                        payload.user_id,
                        MemoryLevel::Trip,
                        &payload.query,
                        Some(trip_id),
                        None,
                        k,
                    )
                    .await,
            );
        }
        items.extend(
            self.memory
                .search(payload.user_id, MemoryLevel::User, &payload.query, None, None, k)
                .await,
        );

        let mut seen = std::collections::HashSet::new();
        items.retain(|item| seen.insert(item.text.clone()));
        items.truncate(k);
        items
    }

    // ── tools ───────────────────────────────────────────────────────

    /// Normalize slots into tool arguments and run the plan. A missing
    /// required slot skips the tool with a reason trace; tool failures
    /// never abort the turn.
    async fn run_tools(
        &self,
        payload: &ChatPayload,
        decision: &RouteDecision,
        trace_id: &str,
        cancel: &CancelToken,
        traces: &mut Vec<ToolTrace>,
    ) -> Result<Vec<ToolInvocation>> {
        let slots = &decision.slots;
        let mut plan: Vec<(&'static str, Value)> = Vec::new();

        match decision.intent {
            Intent::PoiNearby => match payload.location {
                Some(location) => {
                    let mut args = json!({
                        "lat": location.lat,
                        "lng": location.lng,
                        "limit": 20,
                    });
                    if let Some(t) = payload.poi_type.as_deref().or(slots.poi_type.as_deref()) {
                        args["type"] = json!(t);
                    }
                    if let Some(r) = payload.poi_radius.or(slots.radius_m) {
                        args["radius"] = json!(r);
                    }
                    plan.push(("poi_around", args));
                }
                None => traces.push(ToolTrace::skipped("poi_around", "missing_location")),
            },
            Intent::TripQuery => match payload.trip_id {
                Some(trip_id) => {
                    let mut args = json!({ "trip_id": trip_id });
                    if let Some(day) = slots.day_index {
                        args["day"] = json!(day);
                    }
                    plan.push(("trip_query", args));
                }
                None => traces.push(ToolTrace::skipped("trip_query", "missing_trip_id")),
            },
            Intent::Weather => {
                if slots.locations.is_empty() {
                    traces.push(ToolTrace::skipped("weather_area", "missing_location"));
                } else {
                    let forecast_days = slots.day_index.map(|d| d + 1).unwrap_or(1).clamp(1, 4);
                    plan.push((
                        "weather_area",
                        json!({
                            "locations": slots.locations,
                            "weather_type": if forecast_days > 1 { "forecast" } else { "realtime" },
                            "days": forecast_days,
                        }),
                    ));
                }
            }
            Intent::Navigation => {
                if slots.locations.len() >= 2 {
                    plan.push((
                        "path_navigate",
                        json!({
                            "routes": [{
                                "origin": slots.locations[0],
                                "destination": slots.locations[1],
                            }],
                            "travel_mode": slots.travel_mode.as_deref().unwrap_or("driving"),
                        }),
                    ));
                } else {
                    traces.push(ToolTrace::skipped("path_navigate", "missing_route"));
                }
            }
            Intent::GeneralQa => {}
        }

        let ctx = ToolContext {
            user_id: payload.user_id,
            trip_id: payload.trip_id,
            trace_id: trace_id.to_owned(),
        };
        let mut invocations = Vec::new();
        for (name, args) in plan.into_iter().take(self.config.assistant.max_tools) {
            check_cancelled(cancel)?;
            let invocation = self.tools.invoke(name, args, &ctx).await;
            traces.push(invocation.trace.clone());
            invocations.push(invocation);
        }
        Ok(invocations)
    }

    // ── answer_compose ──────────────────────────────────────────────

    async fn compose_with_llm(
        &self,
        payload: &ChatPayload,
        history: &[StoredMessage],
        memories: &[wf_domain::memory::MemoryItem],
        invocations: &[ToolInvocation],
    ) -> Result<(String, AiMeta)> {
        let system = self.prompts.get("assistant.system.main").await?;
        let formatter = self.prompts.get("assistant.response.formatter").await?;

        let mut context = String::new();
        let history_text = history_block(history, self.config.assistant.history_max_rounds);
        if !history_text.is_empty() {
            context.push_str("## Recent conversation\n");
            context.push_str(&history_text);
        }
        let memory_text = memory_block(memories);
        if !memory_text.is_empty() {
            context.push_str("## Recalled memories\n");
            context.push_str(&memory_text);
        }
        let tools_text = tool_results_block(invocations);
        if !tools_text.is_empty() {
            context.push_str("## Tool results\n");
            context.push_str(&tools_text);
        }

        let mut messages = vec![
            ChatMessage {
                role: system.role.clone(),
                content: system.content.clone(),
            },
            ChatMessage {
                role: formatter.role.clone(),
                content: formatter.content.clone(),
            },
        ];
        if !context.is_empty() {
            messages.push(ChatMessage::system(context));
        }
        messages.push(ChatMessage::user(payload.query.clone()));

        let response = self
            .llm
            .chat(ChatRequest {
                messages,
                model: None,
                temperature: None,
                max_tokens: None,
                json_mode: false,
                timeout_s: Some(self.config.llm.timeout_s),
            })
            .await;

        match response {
            Ok(response) => {
                self.metrics.record_ai_call(true, None, response.latency_ms);
                let ai_meta = AiMeta {
                    provider: self.llm.provider_id().to_owned(),
                    model: response.model.clone(),
                    latency_ms: response.latency_ms,
                    tokens_total: response.tokens_total(),
                    trace_id: response.trace_id.clone(),
                };
                Ok((response.content, ai_meta))
            }
            Err(e) => {
                self.metrics.record_ai_call(false, Some(e.kind()), 0.0);
                Err(e)
            }
        }
    }

    // ── streaming ───────────────────────────────────────────────────

    /// Emit ordered chunk events. `index` is strictly increasing and
    /// contiguous from 0; the last chunk carries `done: true`. A closed
    /// sink means the client went away — treated as cancellation.
    async fn stream_chunks(
        &self,
        sink: &EventSink,
        trace_id: &str,
        answer: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        let chunk_chars = self.config.assistant.stream_chunk_chars.max(1);
        let chars: Vec<char> = answer.chars().collect();
        let total = chars.len().div_ceil(chunk_chars).max(1);
        for (index, chunk) in chars.chunks(chunk_chars).enumerate() {
            check_cancelled(cancel)?;
            let event = AssistantEvent::Chunk {
                trace_id: trace_id.to_owned(),
                index: index as u64,
                delta: chunk.iter().collect(),
                done: index + 1 == total,
            };
            if sink.send(event).await.is_err() {
                return Err(Error::Cancelled);
            }
        }
        if chars.is_empty() {
            let _ = sink
                .send(AssistantEvent::Chunk {
                    trace_id: trace_id.to_owned(),
                    index: 0,
                    delta: String::new(),
                    done: true,
                })
                .await;
        }
        Ok(())
    }

    // ── persistence helpers ─────────────────────────────────────────

    /// Failed turn: persist the user message alone so the transcript
    /// shows the question even when no answer was produced.
    async fn persist_user_only(&self, session_id: &str, payload: &ChatPayload, intent: Intent) {
        let result = self
            .storage
            .append_turn(
                session_id,
                vec![NewMessage {
                    role: Role::User,
                    content: payload.query.clone(),
                    tokens: None,
                    meta: json!({ "intent": intent.as_str() }),
                }],
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(session_id, error = %e, "failed to persist user message");
        }
    }

    /// One bounded session-level memory summary per turn.
    async fn write_turn_memory(&self, payload: &ChatPayload, session_id: &str, answer: &str) {
        if !payload.use_memory {
            return;
        }
        let text = format!(
            "Q: {}\nA: {}",
            truncate(&payload.query, 200),
            truncate(answer, 300)
        );
        let mut metadata = json!({
            "source": "assistant",
            "session_id": session_id,
        });
        if let Some(trip_id) = payload.trip_id {
            metadata["trip_id"] = json!(trip_id);
        }
        self.memory
            .write(
                payload.user_id,
                MemoryLevel::Session,
                &text,
                payload.trip_id,
                Some(session_id),
                metadata,
            )
            .await;
    }
}

fn check_cancelled(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::{InMemoryPoiCache, MockPoiProvider, PoiService};
    use crate::tools::{PathNavigateTool, PoiAroundTool, TripQueryTool, WeatherAreaTool};
    use tokio::sync::Semaphore;
    use wf_domain::trip::GeoPoint;
    use wf_llm::MockLlmProvider;
    use wf_memory::LocalMemoryEngine;
    use wf_storage::MemoryStorage;

    struct Fixture {
        service: AssistantService,
        storage: Arc<MemoryStorage>,
        memory: Arc<MemoryService>,
    }

    fn fixture(llm: Arc<MockLlmProvider>) -> Fixture {
        let config = Arc::new(Config::default());
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let poi = Arc::new(PoiService::new(
            config.poi.clone(),
            storage.clone(),
            Arc::new(InMemoryPoiCache::new(64)),
            Arc::new(MockPoiProvider),
            metrics.clone(),
            Arc::new(Semaphore::new(4)),
        ));
        let mut tools = ToolRegistry::new(Duration::from_secs(5));
        tools.register(Arc::new(PoiAroundTool::new(poi)));
        tools.register(Arc::new(TripQueryTool::new(storage.clone())));
        tools.register(Arc::new(WeatherAreaTool));
        tools.register(Arc::new(PathNavigateTool));

        let memory = Arc::new(MemoryService::new(Arc::new(LocalMemoryEngine::new())));
        let prompts = Arc::new(PromptRegistry::new(storage.clone(), 60));
        let service = AssistantService::new(
            config,
            storage.clone(),
            memory.clone(),
            llm,
            prompts,
            Arc::new(tools),
            metrics,
        );
        Fixture {
            service,
            storage,
            memory,
        }
    }

    fn payload(query: &str) -> ChatPayload {
        ChatPayload {
            user_id: 1,
            trip_id: None,
            session_id: None,
            query: query.into(),
            use_memory: true,
            top_k_memory: None,
            return_memory: true,
            return_tool_traces: true,
            return_messages: true,
            stream: false,
            location: None,
            poi_type: None,
            poi_radius: None,
        }
    }

    #[tokio::test]
    async fn general_turn_persists_one_user_one_assistant() {
        let fx = fixture(Arc::new(MockLlmProvider::new()));
        let result = fx
            .service
            .run_chat(payload("tell me about the city"), None, CancelToken::new())
            .await
            .unwrap();

        assert!(!result.answer.is_empty());
        assert_eq!(result.intent.as_deref(), Some("general_qa"));

        let messages = fx
            .storage
            .recent_messages(&result.session_id, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].meta["intent"], "general_qa");
    }

    #[tokio::test]
    async fn poi_turn_answers_deterministically() {
        let fx = fixture(Arc::new(MockLlmProvider::new()));
        let mut p = payload("any restaurants nearby?");
        p.location = Some(GeoPoint::new(23.129, 113.264).unwrap());
        let result = fx.service.run_chat(p, None, CancelToken::new()).await.unwrap();

        assert_eq!(result.intent.as_deref(), Some("poi_nearby"));
        assert_eq!(result.ai_meta.provider, "rules");
        assert!(result.answer.contains("found nearby"));
        assert!(result
            .tool_traces
            .iter()
            .any(|t| t.node == "poi_around" && t.status == "ok"));
    }

    #[tokio::test]
    async fn missing_location_skips_tool_but_answers() {
        let fx = fixture(Arc::new(MockLlmProvider::new()));
        let result = fx
            .service
            .run_chat(payload("any restaurants nearby?"), None, CancelToken::new())
            .await
            .unwrap();
        assert!(result
            .tool_traces
            .iter()
            .any(|t| t.node == "poi_around"
                && t.status == "skipped"
                && t.detail["reason"] == "missing_location"));
        // Falls through to the LLM.
        assert_eq!(result.ai_meta.provider, "mock");
    }

    #[tokio::test]
    async fn foreign_session_is_rejected_without_side_effects() {
        let fx = fixture(Arc::new(MockLlmProvider::new()));
        let session = fx.storage.create_session(2, None).await.unwrap();

        let mut p = payload("hello");
        p.session_id = Some(session.id.clone());
        let err = fx
            .service
            .run_chat(p, None, CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_authorized");

        let messages = fx.storage.recent_messages(&session.id, 10).await.unwrap();
        assert!(messages.is_empty(), "no messages may be appended");
        assert_eq!(fx.memory.counters().calls, 0, "no memory writes performed");
    }

    #[tokio::test]
    async fn llm_failure_persists_user_message_only() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.push_error(wf_domain::LlmErrorKind::Timeout, "slow");
        let fx = fixture(llm);

        let session = fx.storage.create_session(1, None).await.unwrap();
        let mut p = payload("tell me a story");
        p.session_id = Some(session.id.clone());
        let err = fx
            .service
            .run_chat(p, None, CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "llm_timeout");

        let messages = fx.storage.recent_messages(&session.id, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);

        // No turn summary was written after the failure: the only memory
        // calls are the two retrieval searches (session + user scope).
        assert_eq!(fx.memory.counters().calls, 2);
    }

    #[tokio::test]
    async fn streaming_chunks_are_contiguous_and_monotonic() {
        let llm = Arc::new(MockLlmProvider::new());
        llm.push_response("a".repeat(100));
        let fx = fixture(llm);

        let (tx, mut rx) = mpsc::channel(64);
        let result = fx
            .service
            .run_chat(payload("long answer please"), Some(tx), CancelToken::new())
            .await
            .unwrap();
        assert_eq!(result.answer.len(), 100);

        let mut indexes = Vec::new();
        let mut saw_done = false;
        while let Ok(event) = rx.try_recv() {
            if let AssistantEvent::Chunk { index, done, .. } = event {
                indexes.push(index);
                if done {
                    saw_done = true;
                }
            }
        }
        assert_eq!(indexes, (0..indexes.len() as u64).collect::<Vec<_>>());
        assert!(indexes.len() >= 2);
        assert!(saw_done);
    }

    #[tokio::test]
    async fn cancelled_turn_surfaces_cancelled() {
        let fx = fixture(Arc::new(MockLlmProvider::new()));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = fx
            .service
            .run_chat(payload("hello"), None, cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }

    #[tokio::test]
    async fn memory_flows_into_result_and_store() {
        let fx = fixture(Arc::new(MockLlmProvider::new()));
        // First turn writes a session summary; use a fixed session.
        let session = fx.storage.create_session(1, None).await.unwrap();
        let mut p = payload("I love quiet museums");
        p.session_id = Some(session.id.clone());
        fx.service
            .run_chat(p, None, CancelToken::new())
            .await
            .unwrap();

        let mut p2 = payload("what do I like? museums maybe");
        p2.session_id = Some(session.id.clone());
        let result = fx.service.run_chat(p2, None, CancelToken::new()).await.unwrap();
        assert!(result
            .used_memory
            .iter()
            .any(|m| m.text.contains("quiet museums")));
    }

    #[tokio::test]
    async fn weather_turn_uses_deterministic_summary() {
        let fx = fixture(Arc::new(MockLlmProvider::new()));
        let result = fx
            .service
            .run_chat(
                payload("What's the weather in Guangzhou?"),
                None,
                CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.intent.as_deref(), Some("weather"));
        assert_eq!(result.ai_meta.provider, "rules");
        assert!(result.answer.contains("Guangzhou"));
    }
}
