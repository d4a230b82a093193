// crates/agent-uri-transport/src/contract.rs
// ============================================================================
// Module: Transport Contract
// Description: Uniform invoke/stream interface implemented by every binding.
// Purpose: Define the request/response shapes and the chunk stream type.
// Dependencies: async-trait, futures, serde_json
// ============================================================================

//! ## Overview
//! All bindings implement [`Transport`]: a capability invocation either
//! returns one [`TransportResponse`] or a [`ChunkSequence`], a finite lazy
//! stream of chunks that may be restarted exactly once. Requests carry an
//! opaque params document, caller headers, an optional deadline, and an
//! optional auth provider.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::auth::AuthProvider;
use crate::error::TransportError;

// ============================================================================
// SECTION: Request / Response
// ============================================================================

/// One capability invocation as seen by a binding.
///
/// # Invariants
/// - `endpoint` is a fully qualified wire address for the binding's scheme.
/// - Caller headers are merged last and win over binding defaults.
#[derive(Clone)]
pub struct TransportRequest {
    /// Wire address of the target agent.
    pub endpoint: String,
    /// Capability name to invoke.
    pub capability: String,
    /// Opaque structured parameters.
    pub params: Option<Value>,
    /// Caller-supplied headers.
    pub headers: BTreeMap<String, String>,
    /// Overall deadline for the operation.
    pub timeout: Option<Duration>,
    /// Request a streaming response shape.
    pub stream: bool,
    /// Credential source applied by the binding.
    pub auth: Option<Arc<dyn AuthProvider>>,
}

impl TransportRequest {
    /// Creates a request for a capability at an endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            capability: capability.into(),
            params: None,
            headers: BTreeMap::new(),
            timeout: None,
            stream: false,
            auth: None,
        }
    }

    /// Returns the request with params attached.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Returns the request with one header set.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the request with a deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the request with an auth provider.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("endpoint", &self.endpoint)
            .field("capability", &self.capability)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("stream", &self.stream)
            .field("auth", &self.auth.as_ref().map(|provider| provider.scheme()))
            .finish()
    }
}

/// Response from a non-streaming invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP-compatible status code.
    pub status: u16,
    /// Response headers (empty on transports without headers).
    pub headers: BTreeMap<String, String>,
    /// Decoded response body.
    pub body: Value,
}

/// One chunk of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// Decoded chunk payload.
    pub payload: Value,
    /// Media type of the chunk, when the wire carries one.
    pub media_type: Option<String>,
}

impl StreamChunk {
    /// Creates a chunk from a JSON payload.
    #[must_use]
    pub const fn json(payload: Value) -> Self {
        Self {
            payload,
            media_type: None,
        }
    }
}

/// Boxed chunk stream yielded by bindings.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, TransportError>>;

// ============================================================================
// SECTION: Chunk Sequence
// ============================================================================

/// Factory re-issuing the underlying request for a single restart.
type RestartFn =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<ChunkSequence, TransportError>> + Send>;

/// Finite lazy chunk sequence, restartable exactly once.
///
/// # Invariants
/// - `restart` consumes the sequence; the replacement is not restartable.
/// - Dropping the sequence cancels the producer (binding-specific).
pub struct ChunkSequence {
    /// Underlying chunk stream.
    inner: ChunkStream,
    /// One-shot restart factory.
    restart: Option<RestartFn>,
}

impl ChunkSequence {
    /// Wraps a stream without restart support.
    #[must_use]
    pub fn new(inner: ChunkStream) -> Self {
        Self {
            inner,
            restart: None,
        }
    }

    /// Wraps a stream with a one-shot restart factory.
    #[must_use]
    pub fn with_restart(inner: ChunkStream, restart: RestartFn) -> Self {
        Self {
            inner,
            restart: Some(restart),
        }
    }

    /// Returns true when one restart is still available.
    #[must_use]
    pub const fn restartable(&self) -> bool {
        self.restart.is_some()
    }

    /// Discards this sequence and re-issues the underlying request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotRestartable`] when the single restart was
    /// already used, or the binding error from re-issuing the request.
    pub async fn restart(self) -> Result<Self, TransportError> {
        let Some(restart) = self.restart else {
            return Err(TransportError::NotRestartable);
        };
        drop(self.inner);
        let mut replacement = restart().await?;
        replacement.restart = None;
        Ok(replacement)
    }
}

impl Stream for ChunkSequence {
    type Item = Result<StreamChunk, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl fmt::Debug for ChunkSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkSequence").field("restartable", &self.restartable()).finish()
    }
}

// ============================================================================
// SECTION: Transport Trait
// ============================================================================

/// Uniform capability interface implemented by every binding.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the protocol tag this binding serves.
    fn protocol_tag(&self) -> &str;

    /// Invokes a capability and returns a single response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on any wire, protocol, or server failure.
    async fn invoke(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;

    /// Invokes a capability and returns a chunk sequence.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the stream cannot be established;
    /// in-stream failures surface as `Err` items.
    async fn stream(&self, request: TransportRequest) -> Result<ChunkSequence, TransportError>;

    /// Releases connections held by the binding.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when teardown fails.
    async fn close(&self) -> Result<(), TransportError>;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Transport").field(&self.protocol_tag()).finish()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
