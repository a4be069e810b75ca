mod common;

use chatgate::backend::{ChatMessage, MemoryHistory, Role};
use chatgate::chat::{ChatOutcome, ChatRequest, ChatService, StreamEvent, STREAM_TIMEOUT_MESSAGE};
use common::{ScriptedBackend, TricklingBackend};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn answered_chat_is_saved_to_history() {
    let backend = ScriptedBackend::replying("hi there");
    let history = MemoryHistory::new();
    let service = ChatService::new(Arc::new(backend.clone()))
        .with_history(Arc::new(history.clone()))
        .with_system_prompt("be brief");

    let request = ChatRequest::new("hello").with_history(vec![ChatMessage::user("earlier")]);
    let outcome = service.chat("u1", "session-1", &request).await.unwrap();

    assert_eq!(outcome.content(), "hi there");
    assert!(!outcome.is_degraded());
    let sent = backend.last_messages().unwrap();
    assert_eq!(sent.first().map(|m| m.role), Some(Role::System));
    assert_eq!(sent.last(), Some(&ChatMessage::user("hello")));

    let records = history.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session_id, "session-1");
    assert_eq!(records[0].assistant_message, "hi there");
}

#[tokio::test]
async fn backend_outage_degrades_to_offline_reply() {
    let history = MemoryHistory::new();
    let service = ChatService::new(Arc::new(ScriptedBackend::failing()))
        .with_history(Arc::new(history.clone()));

    let outcome = service.chat("u1", "s", &ChatRequest::new("hello")).await.unwrap();
    assert!(matches!(outcome, ChatOutcome::Degraded(ref text) if !text.is_empty()));
    assert!(history.records().is_empty());
}

#[tokio::test]
async fn empty_backend_reply_also_degrades() {
    let service = ChatService::new(Arc::new(ScriptedBackend::replying("   ")));
    let outcome = service.chat("u1", "s", &ChatRequest::new("hello")).await.unwrap();
    assert!(outcome.is_degraded());
}

#[tokio::test]
async fn stream_relays_chunks_then_done() {
    let backend = TricklingBackend { chunks: vec!["hi", " there"], gap: Duration::from_millis(1) };
    let service = ChatService::new(Arc::new(backend));

    let mut events = service.stream_chat(&ChatRequest::new("hello")).unwrap();
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            StreamEvent::Message("hi".into()),
            StreamEvent::Message(" there".into()),
            StreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn stream_backend_error_ends_with_error_event() {
    let service = ChatService::new(Arc::new(ScriptedBackend::failing()));
    let mut events = service.stream_chat(&ChatRequest::new("hello")).unwrap();

    match events.recv().await {
        Some(StreamEvent::Error(text)) => assert!(text.starts_with("Error: ")),
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(events.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_times_out() {
    let backend = TricklingBackend { chunks: vec!["hi", "late"], gap: Duration::from_secs(5) };
    let service = ChatService::new(Arc::new(backend)).with_idle_timeout(Duration::from_secs(10));
    let mut events = service.stream_chat(&ChatRequest::new("hello")).unwrap();
    assert_eq!(events.recv().await, Some(StreamEvent::Message("hi".into())));
    assert_eq!(events.recv().await, Some(StreamEvent::Message("late".into())));
    assert_eq!(events.recv().await, Some(StreamEvent::Done));

    let backend = TricklingBackend { chunks: vec!["hi", "too late"], gap: Duration::from_secs(30) };
    let service = ChatService::new(Arc::new(backend)).with_idle_timeout(Duration::from_secs(10));
    let mut events = service.stream_chat(&ChatRequest::new("hello")).unwrap();
    assert_eq!(
        events.recv().await,
        Some(StreamEvent::Error(STREAM_TIMEOUT_MESSAGE.to_string()))
    );
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn stream_rejects_empty_message() {
    let service = ChatService::new(Arc::new(ScriptedBackend::replying("x")));
    let err = service.stream_chat(&ChatRequest::new(" ")).unwrap_err();
    assert_eq!(err.status_code(), 400);
}
