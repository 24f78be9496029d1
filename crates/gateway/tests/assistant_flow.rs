//! End-to-end assistant flows: turn atomicity, session ownership, and
//! streaming order, against a fully booted app state.

use std::sync::Arc;

use tokio::sync::mpsc;

use wf_domain::chat::{AssistantEvent, ChatPayload, Role};
use wf_domain::config::Config;
use wf_domain::trip::GeoPoint;
use wf_gateway::bootstrap::build_app_state;
use wf_gateway::runtime::cancel::CancelToken;
use wf_gateway::state::AppState;
use wf_storage::ChatStore;

async fn boot() -> AppState {
    build_app_state(Arc::new(Config::default())).await.unwrap()
}

fn payload(query: &str) -> ChatPayload {
    ChatPayload {
        user_id: 1,
        trip_id: None,
        session_id: None,
        query: query.into(),
        use_memory: true,
        top_k_memory: None,
        return_memory: false,
        return_tool_traces: true,
        return_messages: true,
        stream: false,
        location: None,
        poi_type: None,
        poi_radius: None,
    }
}

#[tokio::test]
async fn turn_atomicity_one_user_one_assistant_message() {
    let state = boot().await;
    let result = state
        .assistant
        .run_chat(payload("what should I do this evening?"), None, CancelToken::new())
        .await
        .unwrap();

    let messages = state
        .storage
        .recent_messages(&result.session_id, 10)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, result.answer);
}

#[tokio::test]
async fn foreign_session_rejected_with_no_side_effects() {
    let state = boot().await;
    let session = state.storage.create_session(7, None).await.unwrap();

    let mut p = payload("hello");
    p.user_id = 2;
    p.session_id = Some(session.id.clone());
    let err = state
        .assistant
        .run_chat(p, None, CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_authorized");

    assert!(state
        .storage
        .recent_messages(&session.id, 10)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(state.memory.counters().calls, 0);
}

#[tokio::test]
async fn multi_turn_history_is_visible_to_later_turns() {
    let state = boot().await;
    let first = state
        .assistant
        .run_chat(payload("remember that I hate crowds"), None, CancelToken::new())
        .await
        .unwrap();

    let mut p = payload("so what did I just tell you?");
    p.session_id = Some(first.session_id.clone());
    let second = state
        .assistant
        .run_chat(p, None, CancelToken::new())
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);

    let messages = state
        .storage
        .recent_messages(&first.session_id, 10)
        .await
        .unwrap();
    assert_eq!(messages.len(), 4);
}

#[tokio::test]
async fn poi_turn_with_location_reports_source() {
    let state = boot().await;
    let mut p = payload("good food nearby?");
    p.location = Some(GeoPoint::new(23.129, 113.264).unwrap());

    let result = state
        .assistant
        .run_chat(p, None, CancelToken::new())
        .await
        .unwrap();
    assert_eq!(result.intent.as_deref(), Some("poi_nearby"));
    assert!(result
        .tool_traces
        .iter()
        .any(|t| t.node == "poi_around" && t.status == "ok"));
    assert!(result.answer.contains("Mock"));
}

#[tokio::test]
async fn streamed_turn_chunks_are_ordered_and_terminal() {
    let state = boot().await;
    let (tx, mut rx) = mpsc::channel(64);

    let result = state
        .assistant
        .run_chat(
            payload("please write a couple of sentences about travel"),
            Some(tx),
            CancelToken::new(),
        )
        .await
        .unwrap();
    assert!(!result.answer.is_empty());

    let mut last_index: Option<u64> = None;
    let mut saw_done = false;
    while let Ok(event) = rx.try_recv() {
        if let AssistantEvent::Chunk { index, done, .. } = event {
            match last_index {
                None => assert_eq!(index, 0, "chunks start at 0"),
                Some(prev) => assert_eq!(index, prev + 1, "chunks are contiguous"),
            }
            last_index = Some(index);
            if done {
                saw_done = true;
            }
        }
    }
    assert!(saw_done, "final chunk carries done=true");
}
