//! Assistant chat endpoint.
//!
//! - `POST /api/ai/chat` — unary JSON, or SSE frames when `stream: true`.
//!   Stream frames carry the same [`AssistantEvent`] payloads the
//!   WebSocket channel uses; only the framing differs.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::Stream;
use tokio::sync::mpsc;

use wf_domain::chat::{AssistantEvent, ChatPayload};
use wf_domain::trace::new_trace_id;

use crate::api::{err, ok};
use crate::runtime::cancel::CancelToken;
use crate::state::AppState;

pub async fn chat(State(state): State<AppState>, Json(payload): Json<ChatPayload>) -> Response {
    if payload.query.trim().is_empty() {
        return err(
            &wf_domain::Error::InvalidParams("query must not be empty".into()),
            None,
        );
    }

    if !payload.stream {
        let cancel = CancelToken::new();
        return match state.assistant.run_chat(payload, None, cancel).await {
            Ok(result) => ok(result),
            Err(e) => err(&e, None),
        };
    }

    // Streaming: run the turn in the background, forward chunk events,
    // then exactly one terminal result/error event.
    let (tx, rx) = mpsc::channel::<AssistantEvent>(64);
    let cancel_key = format!("sse:{}", new_trace_id("chat"));
    let cancel = state.cancels.register(&cancel_key);

    let assistant = state.assistant.clone();
    let cancels = state.cancels.clone();
    let terminal_tx = tx.clone();
    let key_for_task = cancel_key.clone();
    tokio::spawn(async move {
        let outcome = assistant.run_chat(payload, Some(tx), cancel).await;
        let event = match outcome {
            Ok(result) => AssistantEvent::Result { payload: result },
            Err(e) => AssistantEvent::Error {
                error_type: e.kind().into(),
                message: e.to_string(),
                trace_id: None,
            },
        };
        let _ = terminal_tx.send(event).await;
        cancels.remove(&key_for_task);
    });

    Sse::new(event_stream(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// One SSE frame per assistant event; the stream ends after the terminal
/// result/error followed by a `done` marker.
fn event_stream(
    mut rx: mpsc::Receiver<AssistantEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let name = match &event {
                AssistantEvent::Ready { .. } => "ready",
                AssistantEvent::Chunk { .. } => "chunk",
                AssistantEvent::Result { .. } => "result",
                AssistantEvent::Error { .. } => "error",
                AssistantEvent::Done => "done",
            };
            let terminal = matches!(
                &event,
                AssistantEvent::Result { .. } | AssistantEvent::Error { .. }
            );
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(name).data(data));
            if terminal {
                yield Ok(Event::default().event("done").data("{}"));
                break;
            }
        }
    }
}
