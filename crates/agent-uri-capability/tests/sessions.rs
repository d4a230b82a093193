// crates/agent-uri-capability/tests/sessions.rs
// ============================================================================
// Module: Session Behavior Tests
// Description: Validate session serialization and context carry-over.
// Purpose: Pin per-session exclusion and the session id sources.
// Dependencies: agent-uri-capability, tokio
// ============================================================================

//! ## Overview
//! Covers the session contract: concurrent calls with one session id never
//! enter the handler concurrently while distinct ids run in parallel,
//! handler context round-trips to the next call in the session, and the
//! `X-Session-ID` header wins over the `session_id` param.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only fixtures use unwraps for clarity."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use agent_uri_capability::CapabilityHandler;
use agent_uri_capability::CapabilityRecord;
use agent_uri_capability::CapabilityRegistry;
use agent_uri_capability::CapabilityRequest;
use agent_uri_capability::DispatchContext;
use agent_uri_capability::DispatchReply;
use agent_uri_capability::Dispatcher;
use agent_uri_capability::HandlerReply;
use agent_uri_capability::InvocationRequest;
use agent_uri_core::ProblemDetail;
use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;

/// Handler tracking concurrent entries and counting turns per session.
struct TurnHandler {
    /// Handlers currently inside `handle`.
    inside: AtomicUsize,
    /// Highest concurrency observed.
    peak: AtomicUsize,
}

impl TurnHandler {
    fn new() -> Self {
        Self {
            inside: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CapabilityHandler for TurnHandler {
    async fn handle(&self, request: CapabilityRequest) -> Result<HandlerReply, ProblemDetail> {
        let inside = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(inside, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.inside.fetch_sub(1, Ordering::SeqCst);

        let session = request.session.expect("memory-enabled handler gets a session");
        let turn = session
            .context
            .as_ref()
            .and_then(|context| context.get("turn"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
            + 1;
        Ok(HandlerReply::ValueWithContext {
            value: json!({"session": session.id, "turn": turn}),
            context: json!({"turn": turn}),
        })
    }
}

fn dispatcher_with(handler: Arc<TurnHandler>) -> Dispatcher {
    let registry = CapabilityRegistry::new();
    registry
        .register(CapabilityRecord::named("chat").with_memory(), handler)
        .unwrap();
    Dispatcher::new(Arc::new(registry))
}

fn value_of(reply: DispatchReply) -> Value {
    match reply {
        DispatchReply::Value(value) => value,
        DispatchReply::Stream(_) => panic!("expected value reply"),
    }
}

// ============================================================================
// SECTION: Context Carry-Over
// ============================================================================

#[tokio::test]
async fn context_flows_to_the_next_call_in_the_session() {
    let dispatcher = dispatcher_with(Arc::new(TurnHandler::new()));
    for expected_turn in 1..=3 {
        let request =
            InvocationRequest::new("chat", json!({})).with_header("X-Session-ID", "s-1");
        let reply = dispatcher.dispatch(request, DispatchContext::default()).await.unwrap();
        assert_eq!(value_of(reply)["turn"], json!(expected_turn));
    }
}

#[tokio::test]
async fn distinct_sessions_do_not_share_context() {
    let dispatcher = dispatcher_with(Arc::new(TurnHandler::new()));
    for session in ["a", "b"] {
        let request =
            InvocationRequest::new("chat", json!({})).with_header("X-Session-ID", session);
        let reply = dispatcher.dispatch(request, DispatchContext::default()).await.unwrap();
        assert_eq!(value_of(reply)["turn"], json!(1), "session {session} starts fresh");
    }
}

#[tokio::test]
async fn header_wins_over_param_for_the_session_id() {
    let dispatcher = dispatcher_with(Arc::new(TurnHandler::new()));
    let request = InvocationRequest::new("chat", json!({"session_id": "param-session"}))
        .with_header("X-Session-ID", "header-session");
    let reply = dispatcher.dispatch(request, DispatchContext::default()).await.unwrap();
    assert_eq!(value_of(reply)["session"], json!("header-session"));

    // Without the header the param is honored.
    let request = InvocationRequest::new("chat", json!({"session_id": "param-session"}));
    let reply = dispatcher.dispatch(request, DispatchContext::default()).await.unwrap();
    assert_eq!(value_of(reply)["session"], json!("param-session"));
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

#[tokio::test]
async fn same_session_calls_never_overlap() {
    let handler = Arc::new(TurnHandler::new());
    let dispatcher = Arc::new(dispatcher_with(Arc::clone(&handler)));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let dispatcher = Arc::clone(&dispatcher);
        tasks.push(tokio::spawn(async move {
            let request =
                InvocationRequest::new("chat", json!({})).with_header("X-Session-ID", "only");
            dispatcher.dispatch(request, DispatchContext::default()).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(handler.peak.load(Ordering::SeqCst), 1, "same-session calls must serialize");
}

#[tokio::test]
async fn different_sessions_may_run_concurrently() {
    let handler = Arc::new(TurnHandler::new());
    let dispatcher = Arc::new(dispatcher_with(Arc::clone(&handler)));

    let mut tasks = Vec::new();
    for n in 0..6 {
        let dispatcher = Arc::clone(&dispatcher);
        tasks.push(tokio::spawn(async move {
            let request = InvocationRequest::new("chat", json!({}))
                .with_header("X-Session-ID", format!("s-{n}"));
            dispatcher.dispatch(request, DispatchContext::default()).await.unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert!(
        handler.peak.load(Ordering::SeqCst) > 1,
        "distinct sessions should overlap in the handler"
    );
}
