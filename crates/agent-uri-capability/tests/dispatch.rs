// crates/agent-uri-capability/tests/dispatch.rs
// ============================================================================
// Module: Dispatch Pipeline Tests
// Description: Validate lookup, schema, auth, and streaming adaptation.
// Purpose: Pin the dispatcher's fail-closed pipeline behavior.
// Dependencies: agent-uri-capability, agent-uri-core, tokio
// ============================================================================

//! ## Overview
//! Drives the dispatcher through every pipeline stage: capability misses,
//! input schema violations with pointer paths, authorization outcomes, and
//! the adaptation between value and stream reply shapes.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only fixtures use unwraps for clarity."
)]

use std::sync::Arc;

use agent_uri_capability::AuthPolicy;
use agent_uri_capability::CapabilityHandler;
use agent_uri_capability::CapabilityRecord;
use agent_uri_capability::CapabilityRegistry;
use agent_uri_capability::CapabilityRequest;
use agent_uri_capability::DispatchContext;
use agent_uri_capability::DispatchReply;
use agent_uri_capability::Dispatcher;
use agent_uri_capability::HandlerReply;
use agent_uri_capability::InvocationRequest;
use agent_uri_core::ErrorKind;
use agent_uri_core::ProblemDetail;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde_json::Value;
use serde_json::json;

struct EchoHandler;

#[async_trait]
impl CapabilityHandler for EchoHandler {
    async fn handle(&self, request: CapabilityRequest) -> Result<HandlerReply, ProblemDetail> {
        Ok(HandlerReply::Value(request.params))
    }
}

struct CountHandler;

#[async_trait]
impl CapabilityHandler for CountHandler {
    async fn handle(&self, _request: CapabilityRequest) -> Result<HandlerReply, ProblemDetail> {
        let chunks =
            stream::iter((0..3).map(|n| Ok(agent_uri_transport::StreamChunk::json(json!(n)))));
        Ok(HandlerReply::Stream(chunks.boxed()))
    }
}

struct DenyPolicy;

impl AuthPolicy for DenyPolicy {
    fn authorize(
        &self,
        _record: &CapabilityRecord,
        context: &DispatchContext,
    ) -> Result<(), ProblemDetail> {
        if context.caller.as_deref() == Some("alice") {
            Ok(())
        } else {
            Err(ProblemDetail::from_kind(ErrorKind::PermissionDenied)
                .with_detail("only alice may call this"))
        }
    }
}

fn registry() -> Arc<CapabilityRegistry> {
    let registry = CapabilityRegistry::new();
    registry
        .register(
            CapabilityRecord::named("echo").with_input_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"],
            })),
            Arc::new(EchoHandler),
        )
        .unwrap();
    registry
        .register(CapabilityRecord::named("count").streaming(), Arc::new(CountHandler))
        .unwrap();
    registry
        .register(
            CapabilityRecord::named("secret").with_auth_required(),
            Arc::new(EchoHandler),
        )
        .unwrap();
    Arc::new(registry)
}

fn value_of(reply: DispatchReply) -> Value {
    match reply {
        DispatchReply::Value(value) => value,
        DispatchReply::Stream(_) => panic!("expected value reply"),
    }
}

// ============================================================================
// SECTION: Pipeline Stages
// ============================================================================

#[tokio::test]
async fn lookup_miss_is_a_not_found_problem() {
    let dispatcher = Dispatcher::new(registry());
    let err = dispatcher
        .dispatch(InvocationRequest::new("missing", json!({})), DispatchContext::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::CapabilityNotFound));
    assert_eq!(err.status, 404);
}

#[tokio::test]
async fn valid_params_reach_the_handler() {
    let dispatcher = Dispatcher::new(registry());
    let reply = dispatcher
        .dispatch(
            InvocationRequest::new("echo", json!({"text": "hi"})),
            DispatchContext::default(),
        )
        .await
        .unwrap();
    assert_eq!(value_of(reply), json!({"text": "hi"}));
}

#[tokio::test]
async fn schema_violations_surface_with_pointer_paths() {
    let dispatcher = Dispatcher::new(registry());
    let err = dispatcher
        .dispatch(
            InvocationRequest::new("echo", json!({"text": 42})),
            DispatchContext::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));
    let violations = err.extensions.get("violations").and_then(Value::as_array).unwrap();
    assert!(!violations.is_empty());
    assert_eq!(violations[0]["path"], json!("/text"));
}

#[tokio::test]
async fn auth_required_without_policy_fails_closed() {
    let dispatcher = Dispatcher::new(registry());
    let err = dispatcher
        .dispatch(
            InvocationRequest::new("secret", json!({"text": "x"})),
            DispatchContext::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::AuthenticationFailed));
    assert_eq!(err.status, 401);
}

#[tokio::test]
async fn auth_policy_grants_and_denies() {
    let dispatcher = Dispatcher::new(registry()).with_auth_policy(Arc::new(DenyPolicy));

    let granted = dispatcher
        .dispatch(
            InvocationRequest::new("secret", json!({"text": "x"})),
            DispatchContext {
                caller: Some("alice".to_string()),
                auth_scheme: Some("Bearer".to_string()),
            },
        )
        .await;
    assert!(granted.is_ok());

    let denied = dispatcher
        .dispatch(
            InvocationRequest::new("secret", json!({"text": "x"})),
            DispatchContext {
                caller: Some("mallory".to_string()),
                auth_scheme: Some("Bearer".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(denied.kind(), Some(ErrorKind::PermissionDenied));
    assert_eq!(denied.status, 403);
}

// ============================================================================
// SECTION: Streaming Adaptation
// ============================================================================

#[tokio::test]
async fn streaming_capability_returns_a_chunk_sequence() {
    let dispatcher = Dispatcher::new(registry());
    let reply = dispatcher
        .dispatch(InvocationRequest::new("count", json!({})), DispatchContext::default())
        .await
        .unwrap();
    let DispatchReply::Stream(sequence) = reply else {
        panic!("expected stream reply");
    };
    let chunks: Vec<_> = sequence.map(|chunk| chunk.unwrap().payload).collect().await;
    assert_eq!(chunks, vec![json!(0), json!(1), json!(2)]);
}

#[tokio::test]
async fn value_reply_adapts_to_single_chunk_for_streaming_capability() {
    let registry = CapabilityRegistry::new();
    registry
        .register(CapabilityRecord::named("one").streaming(), Arc::new(EchoHandler))
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let reply = dispatcher
        .dispatch(InvocationRequest::new("one", json!({"v": 1})), DispatchContext::default())
        .await
        .unwrap();
    let DispatchReply::Stream(sequence) = reply else {
        panic!("expected stream reply");
    };
    let chunks: Vec<_> = sequence.map(|chunk| chunk.unwrap().payload).collect().await;
    assert_eq!(chunks, vec![json!({"v": 1})]);
}

#[tokio::test]
async fn stream_reply_from_non_streaming_capability_is_internal_error() {
    let registry = CapabilityRegistry::new();
    registry
        .register(CapabilityRecord::named("oops"), Arc::new(CountHandler))
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let err = dispatcher
        .dispatch(InvocationRequest::new("oops", json!({})), DispatchContext::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Internal));
}
