// crates/agent-uri-transport/src/duplex.rs
// ============================================================================
// Module: Duplex Binding
// Description: Full-duplex streaming transport over framed connections.
// Purpose: Multiplex invocations by id over one frame link per endpoint.
// Dependencies: async-trait, futures, serde, tokio
// ============================================================================

//! ## Overview
//! The duplex binding speaks JSON frames (`invoke`, `chunk`, `result`,
//! `error`, `cancel`) over a [`FrameLink`]. The concrete socket library is an
//! external collaborator: anything that can connect, send, and receive
//! frames plugs in through [`FrameConnector`]. One connection per endpoint
//! multiplexes concurrent invocations; frames for distinct ids interleave
//! freely while frames for one id arrive in send order. A connection walks
//! `INIT -> CONNECTING -> OPEN -> CLOSING -> CLOSED`; dropping a stream
//! consumer sends a `cancel` frame so the server stops emitting chunks, and
//! a reconnect never replays in-flight invocations.
//! Security posture: inbound frames are untrusted; unroutable or malformed
//! frames are dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use agent_uri_core::ProblemDetail;

use crate::contract::ChunkSequence;
use crate::contract::StreamChunk;
use crate::contract::Transport;
use crate::contract::TransportRequest;
use crate::contract::TransportResponse;
use crate::error::TransportError;

// ============================================================================
// SECTION: Frames
// ============================================================================

/// Frame discriminator.
///
/// # Invariants
/// - Wire labels are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// Start an invocation.
    Invoke,
    /// One streamed chunk.
    Chunk,
    /// Final successful value.
    Result,
    /// Terminal failure with a problem payload.
    Error,
    /// Consumer abandoned the invocation.
    Cancel,
}

/// One wire frame; exactly one frame per message.
///
/// # Invariants
/// - `id` correlates every frame of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame discriminator.
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Invocation correlation id.
    pub id: String,
    /// Capability name (`invoke` frames).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Invocation parameters (`invoke` frames).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Chunk or result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Problem payload (`error` frames).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<ProblemDetail>,
}

impl Frame {
    /// Builds an `invoke` frame.
    #[must_use]
    pub fn invoke(id: impl Into<String>, capability: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            kind: FrameKind::Invoke,
            id: id.into(),
            capability: Some(capability.into()),
            params,
            value: None,
            problem: None,
        }
    }

    /// Builds a `chunk` frame.
    #[must_use]
    pub fn chunk(id: impl Into<String>, value: Value) -> Self {
        Self {
            kind: FrameKind::Chunk,
            id: id.into(),
            capability: None,
            params: None,
            value: Some(value),
            problem: None,
        }
    }

    /// Builds a `result` frame.
    #[must_use]
    pub fn result(id: impl Into<String>, value: Value) -> Self {
        Self {
            kind: FrameKind::Result,
            id: id.into(),
            capability: None,
            params: None,
            value: Some(value),
            problem: None,
        }
    }

    /// Builds an `error` frame.
    #[must_use]
    pub fn error(id: impl Into<String>, problem: ProblemDetail) -> Self {
        Self {
            kind: FrameKind::Error,
            id: id.into(),
            capability: None,
            params: None,
            value: None,
            problem: Some(problem),
        }
    }

    /// Builds a `cancel` frame.
    #[must_use]
    pub fn cancel(id: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Cancel,
            id: id.into(),
            capability: None,
            params: None,
            value: None,
            problem: None,
        }
    }
}

// ============================================================================
// SECTION: Link Abstraction
// ============================================================================

/// One established framed connection.
#[async_trait]
pub trait FrameLink: Send + Sync {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the connection is unusable.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Receives the next frame; `None` means the peer closed.
    async fn recv(&self) -> Option<Frame>;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when teardown fails.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Connects endpoints to frame links.
#[async_trait]
pub trait FrameConnector: Send + Sync {
    /// Opens a framed connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the connection cannot be established.
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn FrameLink>, TransportError>;
}

// ============================================================================
// SECTION: Connection State
// ============================================================================

/// Lifecycle phase of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Created, never connected.
    Init,
    /// Handshake in progress.
    Connecting,
    /// Ready for traffic.
    Open,
    /// Local close requested.
    Closing,
    /// Fully closed.
    Closed,
}

/// Routing table from invocation id to its consumer.
type Routes = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Frame>>>>;

/// One live connection with its reader and writer plumbing.
struct Connection {
    /// Outbound frame queue consumed by the writer task.
    writer: mpsc::UnboundedSender<Frame>,
    /// Per-id consumer routes.
    routes: Routes,
    /// Lifecycle phase.
    phase: Mutex<ConnectionPhase>,
    /// Set when either pump stops.
    closed: AtomicBool,
}

impl Connection {
    fn set_phase(&self, phase: ConnectionPhase) {
        if let Ok(mut guard) = self.phase.lock() {
            *guard = phase;
        }
    }

    fn phase(&self) -> ConnectionPhase {
        self.phase.lock().map(|guard| *guard).unwrap_or(ConnectionPhase::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registers a consumer for an id.
    fn register(&self, id: &str) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(id.to_string(), tx);
        }
        rx
    }

    /// Drops the consumer route for an id.
    fn unregister(&self, id: &str) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.remove(id);
        }
    }

    /// Marks the connection dead and wakes every consumer.
    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.set_phase(ConnectionPhase::Closed);
        if let Ok(mut routes) = self.routes.lock() {
            routes.clear();
        }
    }
}

// ============================================================================
// SECTION: Binding
// ============================================================================

/// Configuration for the duplex binding.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct DuplexConfig {
    /// Protocol tag served by this binding instance.
    pub tag: String,
    /// Default overall deadline per invocation, in milliseconds.
    pub timeout_ms: u64,
    /// Reconnect on the next call after a connection loss. In-flight
    /// invocations are never replayed.
    pub reconnect: bool,
}

impl Default for DuplexConfig {
    fn default() -> Self {
        Self {
            tag: "wss".to_string(),
            timeout_ms: 30_000,
            reconnect: true,
        }
    }
}

/// Shared internals of the duplex binding.
struct DuplexInner {
    /// Connector producing frame links.
    connector: Arc<dyn FrameConnector>,
    /// Live connections keyed by endpoint.
    connections: tokio::sync::Mutex<HashMap<String, Arc<Connection>>>,
    /// Monotonic invocation id source.
    next_id: AtomicU64,
    /// Binding configuration.
    config: DuplexConfig,
}

/// Full-duplex streaming binding over framed connections.
#[derive(Clone)]
pub struct DuplexTransport {
    /// Shared state.
    inner: Arc<DuplexInner>,
}

impl DuplexTransport {
    /// Creates the binding over a connector.
    #[must_use]
    pub fn new(connector: Arc<dyn FrameConnector>, config: DuplexConfig) -> Self {
        Self {
            inner: Arc::new(DuplexInner {
                connector,
                connections: tokio::sync::Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                config,
            }),
        }
    }

    /// Returns the lifecycle phase of the connection to `endpoint`.
    pub async fn connection_phase(&self, endpoint: &str) -> ConnectionPhase {
        let connections = self.inner.connections.lock().await;
        connections.get(endpoint).map_or(ConnectionPhase::Init, |conn| conn.phase())
    }

    /// Returns the connection for `endpoint`, establishing it when needed.
    async fn ensure_connection(&self, endpoint: &str) -> Result<Arc<Connection>, TransportError> {
        let mut connections = self.inner.connections.lock().await;
        if let Some(existing) = connections.get(endpoint) {
            if !existing.is_closed() {
                return Ok(Arc::clone(existing));
            }
            if !self.inner.config.reconnect {
                return Err(TransportError::Closed);
            }
            connections.remove(endpoint);
        }

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Frame>();
        let connection = Arc::new(Connection {
            writer: writer_tx,
            routes: Arc::new(Mutex::new(HashMap::new())),
            phase: Mutex::new(ConnectionPhase::Connecting),
            closed: AtomicBool::new(false),
        });

        let link = match self.inner.connector.connect(endpoint).await {
            Ok(link) => link,
            Err(err) => {
                connection.shut();
                return Err(err);
            }
        };
        connection.set_phase(ConnectionPhase::Open);

        // Writer pump: serializes outbound frames onto the link.
        let writer_link = Arc::clone(&link);
        let writer_conn = Arc::clone(&connection);
        tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                if writer_link.send(frame).await.is_err() {
                    break;
                }
            }
            writer_conn.shut();
            let _ = writer_link.close().await;
        });

        // Reader pump: routes inbound frames to their consumer in order.
        let reader_conn = Arc::clone(&connection);
        tokio::spawn(async move {
            while let Some(frame) = link.recv().await {
                let sender = reader_conn
                    .routes
                    .lock()
                    .ok()
                    .and_then(|routes| routes.get(&frame.id).cloned());
                if let Some(sender) = sender {
                    let _ = sender.send(frame);
                }
            }
            reader_conn.shut();
        });

        connections.insert(endpoint.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    fn allocate_id(&self) -> String {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    fn protocol_tag(&self) -> &str {
        &self.inner.config.tag
    }

    async fn invoke(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let connection = self.ensure_connection(&request.endpoint).await?;
        let id = self.allocate_id();
        let mut receiver = connection.register(&id);
        let frame = Frame::invoke(&id, &request.capability, request.params.clone());
        if connection.writer.send(frame).is_err() {
            connection.unregister(&id);
            return Err(TransportError::Closed);
        }

        let timeout =
            request.timeout.unwrap_or(Duration::from_millis(self.inner.config.timeout_ms));
        let outcome = tokio::time::timeout(timeout, async {
            // Skip chunks: invoke resolves on the first result or error.
            loop {
                match receiver.recv().await {
                    Some(frame) if frame.kind == FrameKind::Result => {
                        return Ok(TransportResponse {
                            status: 200,
                            headers: BTreeMap::new(),
                            body: frame.value.unwrap_or(Value::Null),
                        });
                    }
                    Some(frame) if frame.kind == FrameKind::Error => {
                        let problem = frame.problem.unwrap_or_else(|| {
                            ProblemDetail::from_kind(agent_uri_core::ErrorKind::Upstream)
                        });
                        return Err(TransportError::invocation(problem));
                    }
                    Some(_) => {}
                    None => return Err(TransportError::Closed),
                }
            }
        })
        .await;
        connection.unregister(&id);
        match outcome {
            Ok(result) => result,
            Err(_) => {
                let _ = connection.writer.send(Frame::cancel(&id));
                Err(TransportError::Timeout {
                    elapsed_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    async fn stream(&self, request: TransportRequest) -> Result<ChunkSequence, TransportError> {
        let connection = self.ensure_connection(&request.endpoint).await?;
        let id = self.allocate_id();
        let receiver = connection.register(&id);
        let frame = Frame::invoke(&id, &request.capability, request.params.clone());
        if connection.writer.send(frame).is_err() {
            connection.unregister(&id);
            return Err(TransportError::Closed);
        }

        let inner = FrameStream {
            receiver,
            connection: Arc::clone(&connection),
            id: id.clone(),
            finished: false,
        };
        let transport = self.clone();
        let restart_request = request;
        Ok(ChunkSequence::with_restart(
            inner.boxed(),
            Box::new(move || {
                Box::pin(async move {
                    // A restart is a brand new invocation with a fresh id.
                    transport.stream(restart_request).await
                })
            }),
        ))
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut connections = self.inner.connections.lock().await;
        for (_, connection) in connections.drain() {
            connection.set_phase(ConnectionPhase::Closing);
            connection.shut();
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Frame Stream
// ============================================================================

/// Consumer-side stream over routed frames with cancel-on-drop.
struct FrameStream {
    /// Routed frames for this id.
    receiver: mpsc::UnboundedReceiver<Frame>,
    /// Owning connection, used for cancel and route cleanup.
    connection: Arc<Connection>,
    /// Invocation id.
    id: String,
    /// Completed by result or error; no cancel on drop.
    finished: bool,
}

impl Stream for FrameStream {
    type Item = Result<StreamChunk, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        loop {
            return match self.receiver.poll_recv(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => {
                    self.finished = true;
                    Poll::Ready(Some(Err(TransportError::Closed)))
                }
                Poll::Ready(Some(frame)) => match frame.kind {
                    FrameKind::Chunk => Poll::Ready(Some(Ok(StreamChunk::json(
                        frame.value.unwrap_or(Value::Null),
                    )))),
                    FrameKind::Result => {
                        self.finished = true;
                        match frame.value {
                            Some(value) if !value.is_null() => {
                                Poll::Ready(Some(Ok(StreamChunk::json(value))))
                            }
                            _ => Poll::Ready(None),
                        }
                    }
                    FrameKind::Error => {
                        self.finished = true;
                        let problem = frame.problem.unwrap_or_else(|| {
                            ProblemDetail::from_kind(agent_uri_core::ErrorKind::Upstream)
                        });
                        Poll::Ready(Some(Err(TransportError::invocation(problem))))
                    }
                    // Server-to-client invoke/cancel frames are not part of
                    // the client contract; drop them and poll again.
                    FrameKind::Invoke | FrameKind::Cancel => continue,
                },
            };
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.connection.unregister(&self.id);
        if !self.finished {
            let _ = self.connection.writer.send(Frame::cancel(&self.id));
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
