// crates/agent-uri-transport/src/local.rs
// ============================================================================
// Module: In-Process Binding
// Description: Transport routing invocations to handlers in the same process.
// Purpose: Serve agent+local:// endpoints without any network.
// Dependencies: async-trait, futures, tokio
// ============================================================================

//! ## Overview
//! The local binding maps an agent name to a registered [`LocalAgent`].
//! `invoke` awaits the handler and returns its value; `stream` expects the
//! handler to produce a lazy chunk sequence. No network is involved;
//! deadlines come from the scheduler. The agent registry uses
//! reader-preferred locking since registration is rare.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use serde_json::Value;

use agent_uri_core::ErrorKind;
use agent_uri_core::ProblemDetail;

use crate::contract::ChunkSequence;
use crate::contract::ChunkStream;
use crate::contract::StreamChunk;
use crate::contract::Transport;
use crate::contract::TransportRequest;
use crate::contract::TransportResponse;
use crate::error::TransportError;

// ============================================================================
// SECTION: Handler Contract
// ============================================================================

/// One in-process invocation.
#[derive(Debug, Clone)]
pub struct LocalCall {
    /// Capability name.
    pub capability: String,
    /// Opaque parameters.
    pub params: Option<Value>,
    /// Caller headers, passed through untouched.
    pub headers: BTreeMap<String, String>,
}

/// Reply produced by a local agent.
pub enum LocalReply {
    /// Single value for `invoke`.
    Value(Value),
    /// Lazy chunk sequence for `stream`.
    Chunks(ChunkStream),
}

impl LocalReply {
    /// Builds a chunk reply from eagerly known values.
    #[must_use]
    pub fn chunk_values(values: Vec<Value>) -> Self {
        Self::Chunks(
            stream::iter(values.into_iter().map(|value| Ok(StreamChunk::json(value)))).boxed(),
        )
    }
}

/// Handler registered under a local agent name.
#[async_trait]
pub trait LocalAgent: Send + Sync {
    /// Handles one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on handler failure; problem payloads pass
    /// through verbatim.
    async fn invoke(&self, call: LocalCall) -> Result<LocalReply, TransportError>;
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the local binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct LocalTransportConfig {
    /// Default deadline per invocation, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for LocalTransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
        }
    }
}

// ============================================================================
// SECTION: Binding
// ============================================================================

/// In-process transport binding.
///
/// # Invariants
/// - Agent names are unique; re-registration replaces the handler.
#[derive(Default)]
pub struct LocalTransport {
    /// Handlers keyed by local agent name.
    agents: RwLock<HashMap<String, Arc<dyn LocalAgent>>>,
    /// Binding configuration.
    config: LocalTransportConfig,
}

impl LocalTransport {
    /// Creates the binding with the given configuration.
    #[must_use]
    pub fn new(config: LocalTransportConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Registers a handler for a local agent name, replacing any previous.
    pub fn register(&self, name: impl Into<String>, agent: Arc<dyn LocalAgent>) {
        if let Ok(mut agents) = self.agents.write() {
            agents.insert(name.into(), agent);
        }
    }

    /// Removes the handler for a name.
    pub fn unregister(&self, name: &str) {
        if let Ok(mut agents) = self.agents.write() {
            agents.remove(name);
        }
    }

    /// Removes every handler. Intended for tests.
    pub fn clear(&self) {
        if let Ok(mut agents) = self.agents.write() {
            agents.clear();
        }
    }

    /// Returns the handler for an endpoint.
    fn agent_for(&self, endpoint: &str) -> Result<Arc<dyn LocalAgent>, TransportError> {
        let name = agent_name(endpoint);
        let agents = self
            .agents
            .read()
            .map_err(|_| TransportError::Internal("local agent registry poisoned".to_string()))?;
        agents.get(name).cloned().ok_or_else(|| {
            TransportError::invocation(
                ProblemDetail::from_kind(ErrorKind::CapabilityNotFound)
                    .with_detail(format!("local agent not registered: {name}")),
            )
        })
    }

    fn deadline(&self, request: &TransportRequest) -> Duration {
        request.timeout.unwrap_or(Duration::from_millis(self.config.timeout_ms))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn protocol_tag(&self) -> &str {
        "local"
    }

    async fn invoke(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let agent = self.agent_for(&request.endpoint)?;
        let call = LocalCall {
            capability: request.capability.clone(),
            params: request.params.clone(),
            headers: request.headers.clone(),
        };
        let deadline = self.deadline(&request);
        let reply = tokio::time::timeout(deadline, agent.invoke(call)).await.map_err(|_| {
            TransportError::Timeout {
                elapsed_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }
        })??;
        match reply {
            LocalReply::Value(body) => Ok(TransportResponse {
                status: 200,
                headers: BTreeMap::new(),
                body,
            }),
            LocalReply::Chunks(_) => Err(TransportError::Protocol(
                "handler returned a stream to a non-streaming invoke".to_string(),
            )),
        }
    }

    async fn stream(&self, request: TransportRequest) -> Result<ChunkSequence, TransportError> {
        let agent = self.agent_for(&request.endpoint)?;
        let call = LocalCall {
            capability: request.capability.clone(),
            params: request.params.clone(),
            headers: request.headers.clone(),
        };
        let deadline = self.deadline(&request);
        let reply = tokio::time::timeout(deadline, agent.invoke(call)).await.map_err(|_| {
            TransportError::Timeout {
                elapsed_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            }
        })??;
        let inner: ChunkStream = match reply {
            LocalReply::Chunks(chunks) => chunks,
            // A plain value streams as its single chunk.
            LocalReply::Value(value) => {
                stream::once(async move { Ok(StreamChunk::json(value)) }).boxed()
            }
        };
        Ok(ChunkSequence::new(inner))
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the agent name from a local endpoint.
fn agent_name(endpoint: &str) -> &str {
    let trimmed = endpoint
        .strip_prefix("agent+local://")
        .or_else(|| endpoint.strip_prefix("local://"))
        .unwrap_or(endpoint);
    trimmed.split(['/', '?', '#']).next().unwrap_or(trimmed)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
