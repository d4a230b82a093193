// crates/agent-uri-transport/tests/duplex_binding.rs
// ============================================================================
// Module: Duplex Binding Tests
// Description: Drive the frame binding over an in-memory link.
// Purpose: Pin mux ordering, cancellation, reconnection, and error passing.
// Dependencies: agent-uri-transport, agent-uri-core, tokio
// ============================================================================

//! ## Overview
//! A channel-backed [`FrameLink`] stands in for the socket library. The test
//! server answers `echo` with a result frame, streams `generate-text` until
//! it sees a cancel frame, and emits problem frames for `always-fails`.
//! Covers: invoke/result matching, per-id interleaving, cancel-on-drop with
//! the at-most-one-further-chunk guarantee, problem preservation, the
//! connection lifecycle phases, and reconnect-without-replay.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only fixtures use unwraps for clarity."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use agent_uri_core::ErrorKind;
use agent_uri_core::ProblemDetail;
use agent_uri_transport::ConnectionPhase;
use agent_uri_transport::DuplexConfig;
use agent_uri_transport::DuplexTransport;
use agent_uri_transport::Frame;
use agent_uri_transport::FrameConnector;
use agent_uri_transport::FrameKind;
use agent_uri_transport::FrameLink;
use agent_uri_transport::Transport;
use agent_uri_transport::TransportError;
use agent_uri_transport::TransportRequest;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: In-Memory Link
// ============================================================================

/// Client half of an in-memory framed connection.
struct ChannelLink {
    /// Frames toward the server task.
    to_server: mpsc::UnboundedSender<Frame>,
    /// Frames from the server task.
    from_server: Mutex<mpsc::UnboundedReceiver<Frame>>,
    /// Closed marker.
    closed: AtomicBool,
}

#[async_trait]
impl FrameLink for ChannelLink {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.to_server.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Option<Frame> {
        self.from_server.lock().await.recv().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Counters exposed by the scripted server.
#[derive(Default)]
struct ServerStats {
    /// Chunks emitted for the current streaming invocation.
    chunks_sent: AtomicUsize,
    /// Chunk count observed at the moment the cancel frame arrived.
    chunks_at_cancel: AtomicUsize,
    /// Cancel frames received.
    cancels: AtomicUsize,
    /// Connections accepted.
    connections: AtomicUsize,
}

/// Connector spawning one scripted server task per connection.
struct ScriptedConnector {
    /// Shared server counters.
    stats: Arc<ServerStats>,
}

#[async_trait]
impl FrameConnector for ScriptedConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Arc<dyn FrameLink>, TransportError> {
        self.stats.connections.fetch_add(1, Ordering::SeqCst);
        let (to_server, mut server_rx) = mpsc::unbounded_channel::<Frame>();
        let (server_tx, from_server) = mpsc::unbounded_channel::<Frame>();
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            let cancelled = Arc::new(AtomicBool::new(false));
            while let Some(frame) = server_rx.recv().await {
                match frame.kind {
                    FrameKind::Invoke => match frame.capability.as_deref() {
                        Some("echo") => {
                            let _ = server_tx.send(Frame::result(
                                &frame.id,
                                frame.params.unwrap_or(json!(null)),
                            ));
                        }
                        Some("always-fails") => {
                            let problem = ProblemDetail::from_kind(ErrorKind::PermissionDenied)
                                .with_detail("caller is not allowed")
                                .with_instance("agent://acme.ai/always-fails");
                            let _ = server_tx.send(Frame::error(&frame.id, problem));
                        }
                        Some("generate-text") => {
                            let tx = server_tx.clone();
                            let id = frame.id.clone();
                            let stats = Arc::clone(&stats);
                            let cancelled = Arc::clone(&cancelled);
                            tokio::spawn(async move {
                                for n in 0.. {
                                    if cancelled.load(Ordering::SeqCst) {
                                        break;
                                    }
                                    if tx.send(Frame::chunk(&id, json!({"n": n}))).is_err() {
                                        break;
                                    }
                                    stats.chunks_sent.fetch_add(1, Ordering::SeqCst);
                                    tokio::time::sleep(std::time::Duration::from_millis(20))
                                        .await;
                                }
                            });
                        }
                        Some("finite-stream") => {
                            for n in 0..3 {
                                let _ = server_tx.send(Frame::chunk(&frame.id, json!(n)));
                            }
                            let _ = server_tx.send(Frame::result(&frame.id, json!("done")));
                        }
                        _ => {
                            let problem =
                                ProblemDetail::from_kind(ErrorKind::CapabilityNotFound);
                            let _ = server_tx.send(Frame::error(&frame.id, problem));
                        }
                    },
                    FrameKind::Cancel => {
                        stats
                            .chunks_at_cancel
                            .store(stats.chunks_sent.load(Ordering::SeqCst), Ordering::SeqCst);
                        stats.cancels.fetch_add(1, Ordering::SeqCst);
                        cancelled.store(true, Ordering::SeqCst);
                    }
                    _ => {}
                }
            }
        });

        Ok(Arc::new(ChannelLink {
            to_server,
            from_server: Mutex::new(from_server),
            closed: AtomicBool::new(false),
        }))
    }
}

fn transport_with_stats() -> (DuplexTransport, Arc<ServerStats>) {
    let stats = Arc::new(ServerStats::default());
    let connector = Arc::new(ScriptedConnector {
        stats: Arc::clone(&stats),
    });
    (DuplexTransport::new(connector, DuplexConfig::default()), stats)
}

// ============================================================================
// SECTION: Invoke
// ============================================================================

#[tokio::test]
async fn invoke_matches_result_by_id() {
    let (transport, _) = transport_with_stats();
    let request = TransportRequest::new("wss://acme.ai/agent", "echo")
        .with_params(json!({"text": "hello"}));
    let response = transport.invoke(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"text": "hello"}));
}

#[tokio::test]
async fn error_frame_problem_is_preserved() {
    let (transport, _) = transport_with_stats();
    let request = TransportRequest::new("wss://acme.ai/agent", "always-fails");
    let err = transport.invoke(request).await.unwrap_err();
    let TransportError::Invocation {
        problem,
    } = err
    else {
        panic!("expected invocation error");
    };
    assert_eq!(problem.kind(), Some(ErrorKind::PermissionDenied));
    assert_eq!(problem.status, 403);
    assert_eq!(problem.detail.as_deref(), Some("caller is not allowed"));
    assert_eq!(problem.instance.as_deref(), Some("agent://acme.ai/always-fails"));
}

#[tokio::test]
async fn concurrent_invocations_interleave_by_id() {
    let (transport, stats) = transport_with_stats();
    let transport = Arc::new(transport);
    let mut tasks = Vec::new();
    for n in 0..16 {
        let transport = Arc::clone(&transport);
        tasks.push(tokio::spawn(async move {
            let request = TransportRequest::new("wss://acme.ai/agent", "echo")
                .with_params(json!({"n": n}));
            transport.invoke(request).await.unwrap()
        }));
    }
    for (n, task) in tasks.into_iter().enumerate() {
        let response = task.await.unwrap();
        assert_eq!(response.body, json!({"n": n}));
    }
    assert_eq!(stats.connections.load(Ordering::SeqCst), 1, "one shared connection");
}

// ============================================================================
// SECTION: Streaming
// ============================================================================

#[tokio::test]
async fn finite_stream_surfaces_chunks_then_result() {
    let (transport, _) = transport_with_stats();
    let request = TransportRequest::new("wss://acme.ai/agent", "finite-stream");
    let chunks: Vec<_> = transport
        .stream(request)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().payload)
        .collect()
        .await;
    assert_eq!(chunks, vec![json!(0), json!(1), json!(2), json!("done")]);
}

#[tokio::test]
async fn dropping_the_consumer_cancels_within_one_chunk() {
    let (transport, stats) = transport_with_stats();
    let request = TransportRequest::new("wss://acme.ai/agent", "generate-text");
    let mut sequence = transport.stream(request).await.unwrap();

    // Consume two chunks, then abandon the stream.
    let first = sequence.next().await.unwrap().unwrap();
    let second = sequence.next().await.unwrap().unwrap();
    assert_eq!(first.payload["n"], json!(0));
    assert_eq!(second.payload["n"], json!(1));
    drop(sequence);

    // Wait for the cancel to land and the producer to wind down.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(stats.cancels.load(Ordering::SeqCst), 1, "cancel frame must be sent");
    let at_cancel = stats.chunks_at_cancel.load(Ordering::SeqCst);
    let finally = stats.chunks_sent.load(Ordering::SeqCst);
    assert!(
        finally <= at_cancel + 1,
        "at most one chunk after cancel (sent {finally}, at cancel {at_cancel})"
    );
}

#[tokio::test]
async fn stream_error_frame_terminates_with_problem() {
    let (transport, _) = transport_with_stats();
    let request = TransportRequest::new("wss://acme.ai/agent", "always-fails");
    let results: Vec<_> = transport.stream(request).await.unwrap().collect().await;
    assert_eq!(results.len(), 1);
    let Err(TransportError::Invocation {
        problem,
    }) = &results[0]
    else {
        panic!("expected problem-carrying error item");
    };
    assert_eq!(problem.kind(), Some(ErrorKind::PermissionDenied));
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[tokio::test]
async fn connection_phases_progress() {
    let (transport, _) = transport_with_stats();
    let endpoint = "wss://acme.ai/agent";
    assert_eq!(transport.connection_phase(endpoint).await, ConnectionPhase::Init);

    let request = TransportRequest::new(endpoint, "echo").with_params(json!({}));
    transport.invoke(request).await.unwrap();
    assert_eq!(transport.connection_phase(endpoint).await, ConnectionPhase::Open);

    transport.close().await.unwrap();
    assert_eq!(transport.connection_phase(endpoint).await, ConnectionPhase::Init);
}

#[tokio::test]
async fn reconnect_opens_a_fresh_connection_without_replay() {
    let (transport, stats) = transport_with_stats();
    let endpoint = "wss://acme.ai/agent";

    let request = TransportRequest::new(endpoint, "echo").with_params(json!({"first": true}));
    transport.invoke(request).await.unwrap();
    assert_eq!(stats.connections.load(Ordering::SeqCst), 1);

    transport.close().await.unwrap();

    let request = TransportRequest::new(endpoint, "echo").with_params(json!({"second": true}));
    let response = transport.invoke(request).await.unwrap();
    assert_eq!(response.body, json!({"second": true}));
    assert_eq!(stats.connections.load(Ordering::SeqCst), 2, "new connection, no replay");
}
