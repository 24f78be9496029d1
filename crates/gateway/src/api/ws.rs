//! Bidirectional assistant channel.
//!
//! `GET /ws/assistant?user_id&session_id&trip_id` upgrades to a
//! WebSocket carrying one logical dialogue per session. Client events:
//! `user_message`, `ping`, `cancel`. Server events: `ready`, `chunk`,
//! `result`, `error`, `done`. Per-turn errors never terminate the
//! connection; resource discipline (connection cap, idle timeout,
//! bounded send queue, sliding-window rate limit, message size cap) does.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{mpsc, Notify};

use wf_domain::chat::{AssistantEvent, ChatPayload, ClientEvent, TurnPayload};
use wf_domain::config::SendOverflowPolicy;
use wf_domain::Error;
use wf_storage::ChatStore;

use crate::api::err;
use crate::runtime::cancel::CancelToken;
use crate::runtime::connections::RateWindow;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Open parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: i64,
    pub session_id: Option<String>,
    pub trip_id: Option<i64>,
}

pub async fn assistant_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let ws_config = &state.config.assistant.ws;
    if !ws_config.enabled {
        return err(
            &Error::InvalidParams("assistant websocket is disabled".into()),
            None,
        );
    }
    if query.user_id <= 0 {
        return err(&Error::InvalidParams("user_id is required".into()), None);
    }
    if !state
        .connections
        .try_acquire(query.user_id, ws_config.max_connections_per_user)
    {
        return err(
            &Error::RateLimited("connection limit reached for user".into()),
            None,
        );
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound queue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounded per-connection send queue. A slow client either loses the
/// oldest chunk events or gets closed, per the configured policy.
struct SendQueue {
    events: Mutex<VecDeque<AssistantEvent>>,
    notify: Notify,
    maxsize: usize,
    policy: SendOverflowPolicy,
    closing: AtomicBool,
}

impl SendQueue {
    fn new(maxsize: usize, policy: SendOverflowPolicy) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            maxsize: maxsize.max(1),
            policy,
            closing: AtomicBool::new(false),
        }
    }

    fn push(&self, event: AssistantEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.maxsize {
            match self.policy {
                SendOverflowPolicy::DropOldest => {
                    // Chunks are droppable (the result carries the full
                    // answer); anything else forces an error.
                    let before = events.len();
                    events.retain(|e| !matches!(e, AssistantEvent::Chunk { .. }));
                    if events.len() == before {
                        events.pop_front();
                    }
                    tracing::debug!(dropped = before - events.len(), "send queue overflow");
                }
                SendOverflowPolicy::Close => {
                    events.push_back(AssistantEvent::Error {
                        error_type: "rate_limited".into(),
                        message: "send queue overflow".into(),
                        trace_id: None,
                    });
                    self.closing.store(true, Ordering::Release);
                    self.notify.notify_one();
                    return;
                }
            }
        }
        events.push_back(event);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<AssistantEvent> {
        self.events.lock().pop_front()
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    let ws_config = state.config.assistant.ws.clone();
    let (mut ws_sink, mut ws_stream) = socket.split();
    let connection_id = uuid::Uuid::new_v4().to_string();

    // Resolve the session before anything else; a bad session id is a
    // terminal error on this connection.
    let session = match resolve_session(&state, &query).await {
        Ok(session) => session,
        Err(e) => {
            let event = AssistantEvent::Error {
                error_type: e.kind().into(),
                message: e.to_string(),
                trace_id: None,
            };
            let _ = ws_sink
                .send(Message::Text(serde_json::to_string(&event).unwrap_or_default()))
                .await;
            state.connections.release(query.user_id);
            return;
        }
    };

    let queue = Arc::new(SendQueue::new(
        ws_config.send_queue_maxsize,
        ws_config.send_overflow,
    ));
    queue.push(AssistantEvent::Ready {
        session_id: session.id.clone(),
        server_time: Utc::now(),
        caps: vec!["chunk".into(), "cancel".into(), "ping".into()],
    });
    state.connections.register_session(&session.id, &connection_id);
    tracing::info!(
        user_id = query.user_id,
        session_id = %session.id,
        connection_id = %connection_id,
        "assistant connection opened"
    );

    // Writer: drains the send queue into the socket.
    let writer_queue = queue.clone();
    let writer = tokio::spawn(async move {
        loop {
            match writer_queue.pop() {
                Some(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(_) => continue,
                    };
                    if ws_sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                    if writer_queue.is_closing() {
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
                None => writer_queue.notify.notified().await,
            }
        }
    });

    let rate = RateWindow::per_minute(ws_config.rate_limit_per_min);
    let turns: Arc<Mutex<HashMap<String, CancelToken>>> = Arc::new(Mutex::new(HashMap::new()));
    let idle = Duration::from_secs(ws_config.idle_timeout_s.max(1));

    // Reader loop with idle timeout.
    loop {
        let next = tokio::time::timeout(idle, ws_stream.next()).await;
        let message = match next {
            Err(_) => {
                tracing::info!(session_id = %session.id, "idle timeout, closing connection");
                break;
            }
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        queue.push(AssistantEvent::Error {
                            error_type: "bad_request".into(),
                            message: format!("unparseable event: {e}"),
                            trace_id: None,
                        });
                        continue;
                    }
                };
                match event {
                    ClientEvent::Ping { .. } => {
                        // Liveness only; receipt already reset the idle clock.
                    }
                    ClientEvent::Cancel { id } => {
                        let cancelled = turns.lock().get(&id).map(|t| {
                            t.cancel();
                        });
                        if cancelled.is_none() {
                            queue.push(AssistantEvent::Error {
                                error_type: "bad_request".into(),
                                message: format!("no in-flight turn {id}"),
                                trace_id: None,
                            });
                        }
                    }
                    ClientEvent::UserMessage { id, payload } => {
                        if payload.query.chars().count() > ws_config.max_message_chars {
                            queue.push(AssistantEvent::Error {
                                error_type: "bad_request".into(),
                                message: format!(
                                    "message exceeds {} chars",
                                    ws_config.max_message_chars
                                ),
                                trace_id: None,
                            });
                            continue;
                        }
                        if !rate.allow() {
                            queue.push(AssistantEvent::Error {
                                error_type: "rate_limited".into(),
                                message: "message rate limit reached".into(),
                                trace_id: None,
                            });
                            continue;
                        }
                        spawn_turn(
                            &state,
                            &queue,
                            &turns,
                            &session.id,
                            &query,
                            id,
                            payload,
                        );
                    }
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {
                // Socket-level liveness is handled by axum.
            }
            _ => {}
        }

        if queue.is_closing() {
            break;
        }
    }

    // Disconnect acts as cancellation for every in-flight turn.
    for (_, token) in turns.lock().drain() {
        token.cancel();
    }
    writer.abort();
    state.connections.remove_session(&session.id);
    state.connections.release(query.user_id);
    tracing::info!(session_id = %session.id, "assistant connection closed");
}

async fn resolve_session(
    state: &AppState,
    query: &WsQuery,
) -> wf_domain::Result<wf_domain::chat::ChatSession> {
    match &query.session_id {
        Some(session_id) => {
            let session = state
                .storage
                .get_session(session_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
            if session.user_id != query.user_id {
                return Err(Error::NotAuthorized(format!(
                    "session {session_id} is not owned by user {}",
                    query.user_id
                )));
            }
            Ok(session)
        }
        None => state.storage.create_session(query.user_id, query.trip_id).await,
    }
}

/// Run one turn in the background: chunks flow through the send queue,
/// and exactly one terminal `result`/`error` event follows.
fn spawn_turn(
    state: &AppState,
    queue: &Arc<SendQueue>,
    turns: &Arc<Mutex<HashMap<String, CancelToken>>>,
    session_id: &str,
    query: &WsQuery,
    turn_id: String,
    payload: TurnPayload,
) {
    let chat_payload = ChatPayload {
        user_id: query.user_id,
        trip_id: query.trip_id,
        session_id: Some(session_id.to_owned()),
        query: payload.query,
        use_memory: payload.use_memory,
        top_k_memory: payload.top_k_memory,
        return_memory: false,
        return_tool_traces: true,
        return_messages: false,
        stream: true,
        location: payload.location,
        poi_type: payload.poi_type,
        poi_radius: payload.poi_radius,
    };

    let token = CancelToken::new();
    turns.lock().insert(turn_id.clone(), token.clone());

    let assistant = state.assistant.clone();
    let queue = queue.clone();
    let turns = turns.clone();
    tokio::spawn(async move {
        // Bridge chunk events from the pipeline into the send queue.
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<AssistantEvent>(64);
        let forward_queue = queue.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = chunk_rx.recv().await {
                forward_queue.push(event);
            }
        });

        let outcome = assistant.run_chat(chat_payload, Some(chunk_tx), token).await;
        let _ = forwarder.await;

        let terminal = match outcome {
            Ok(result) => AssistantEvent::Result { payload: result },
            Err(e) => AssistantEvent::Error {
                error_type: e.kind().into(),
                message: e.to_string(),
                trace_id: None,
            },
        };
        queue.push(terminal);
        queue.push(AssistantEvent::Done);
        turns.lock().remove(&turn_id);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64) -> AssistantEvent {
        AssistantEvent::Chunk {
            trace_id: "t".into(),
            index,
            delta: "x".into(),
            done: false,
        }
    }

    #[test]
    fn drop_oldest_discards_chunks_first() {
        let queue = SendQueue::new(2, SendOverflowPolicy::DropOldest);
        queue.push(chunk(0));
        queue.push(chunk(1));
        queue.push(AssistantEvent::Done);
        // Overflow dropped the queued chunks, kept the newer event.
        let mut kinds = Vec::new();
        while let Some(event) = queue.pop() {
            kinds.push(matches!(event, AssistantEvent::Chunk { .. }));
        }
        assert!(!kinds.is_empty());
        assert!(!kinds.iter().all(|is_chunk| *is_chunk));
        assert!(!queue.is_closing());
    }

    #[test]
    fn close_policy_flags_connection() {
        let queue = SendQueue::new(1, SendOverflowPolicy::Close);
        queue.push(chunk(0));
        queue.push(chunk(1));
        assert!(queue.is_closing());
        // The error event is queued for delivery before the close.
        let mut saw_error = false;
        while let Some(event) = queue.pop() {
            if matches!(event, AssistantEvent::Error { .. }) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
