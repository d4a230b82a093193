// crates/agent-uri-capability/src/dispatch.rs
// ============================================================================
// Module: Capability Dispatch
// Description: Request routing to registered capability handlers.
// Purpose: Validate, authorize, and invoke handlers with session wiring.
// Dependencies: agent-uri-core, agent-uri-transport, futures, tokio
// ============================================================================

//! ## Overview
//! Dispatch runs the server-side pipeline for one invocation: look up the
//! capability (miss is a 404-equivalent problem), validate params against
//! the compiled input schema, apply the auth policy when the record demands
//! it, acquire the session lease for memory-enabled capabilities, invoke the
//! handler, and adapt the reply to the capability's streaming shape. The
//! session id comes from the `X-Session-ID` header or the `session_id`
//! param; the header wins when both are present.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde_json::Value;

use agent_uri_core::ErrorKind;
use agent_uri_core::ProblemDetail;
use agent_uri_transport::ChunkSequence;
use agent_uri_transport::StreamChunk;

use crate::record::CapabilityRecord;
use crate::record::CapabilityRequest;
use crate::record::HandlerReply;
use crate::record::SessionContext;
use crate::registry::CapabilityRegistry;
use crate::session::MemorySessionStore;
use crate::session::SessionStore;

// ============================================================================
// SECTION: Request Model
// ============================================================================

/// Header carrying the session correlation token.
pub const SESSION_HEADER: &str = "x-session-id";

/// Param carrying the session correlation token.
pub const SESSION_PARAM: &str = "session_id";

/// One inbound invocation before dispatch.
#[derive(Debug, Clone, Default)]
pub struct InvocationRequest {
    /// Capability name.
    pub capability: String,
    /// Opaque invocation parameters.
    pub params: Value,
    /// Transport headers, lowercased keys.
    pub headers: BTreeMap<String, String>,
}

impl InvocationRequest {
    /// Creates a request for a capability.
    #[must_use]
    pub fn new(capability: impl Into<String>, params: Value) -> Self {
        Self {
            capability: capability.into(),
            params,
            headers: BTreeMap::new(),
        }
    }

    /// Returns the request with one header set (key lowercased).
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Extracts the session id: header first, then the `session_id` param.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        if let Some(id) = self.headers.get(SESSION_HEADER) {
            return Some(id.clone());
        }
        self.params.get(SESSION_PARAM).and_then(Value::as_str).map(str::to_string)
    }
}

/// Caller identity facts supplied by the hosting layer.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    /// Authenticated principal, when the host established one.
    pub caller: Option<String>,
    /// Authentication scheme the host verified.
    pub auth_scheme: Option<String>,
}

/// Authorization hook applied to capabilities that require auth.
pub trait AuthPolicy: Send + Sync {
    /// Authorizes one invocation.
    ///
    /// # Errors
    ///
    /// Returns a [`ProblemDetail`] (401/403-shaped) reaching the caller
    /// verbatim.
    fn authorize(
        &self,
        record: &CapabilityRecord,
        context: &DispatchContext,
    ) -> Result<(), ProblemDetail>;
}

/// Dispatch outcome.
pub enum DispatchReply {
    /// Single response value.
    Value(Value),
    /// Chunk sequence for streaming capabilities.
    Stream(ChunkSequence),
}

impl std::fmt::Debug for DispatchReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Server-side request dispatcher.
///
/// # Invariants
/// - Handlers for one session id never run concurrently.
/// - Schema validation happens before authorization and invocation.
pub struct Dispatcher {
    /// Capability registry.
    registry: Arc<CapabilityRegistry>,
    /// Session storage.
    sessions: Arc<dyn SessionStore>,
    /// Optional authorization hook.
    auth: Option<Arc<dyn AuthPolicy>>,
}

impl Dispatcher {
    /// Creates a dispatcher with the default in-memory session store.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            sessions: Arc::new(MemorySessionStore::default()),
            auth: None,
        }
    }

    /// Replaces the session store.
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Installs the authorization policy.
    #[must_use]
    pub fn with_auth_policy(mut self, auth: Arc<dyn AuthPolicy>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Dispatches one invocation.
    ///
    /// # Errors
    ///
    /// Returns a [`ProblemDetail`] for lookup misses, schema violations,
    /// authorization failures, and handler errors.
    pub async fn dispatch(
        &self,
        request: InvocationRequest,
        context: DispatchContext,
    ) -> Result<DispatchReply, ProblemDetail> {
        let Some(entry) = self.registry.get(&request.capability) else {
            return Err(ProblemDetail::from_kind(ErrorKind::CapabilityNotFound)
                .with_detail(format!("no capability named {}", request.capability)));
        };

        if let Some(validator) = &entry.validator {
            let violations: Vec<Value> = validator
                .iter_errors(&request.params)
                .map(|error| {
                    serde_json::json!({
                        "path": error.instance_path.to_string(),
                        "message": error.to_string(),
                    })
                })
                .collect();
            if !violations.is_empty() {
                return Err(ProblemDetail::from_kind(ErrorKind::InvalidInput)
                    .with_detail("params do not match the capability input schema")
                    .with_extension("violations", Value::Array(violations)));
            }
        }

        if entry.record.requires_auth {
            match &self.auth {
                Some(policy) => policy.authorize(&entry.record, &context)?,
                None => {
                    return Err(ProblemDetail::from_kind(ErrorKind::AuthenticationFailed)
                        .with_detail("capability requires authentication"));
                }
            }
        }

        let session_id = request.session_id();
        let reply = if entry.record.memory_enabled
            && let Some(session_id) = session_id
        {
            // The lease serializes same-session handlers (held across await).
            let lease = self.sessions.lease(&session_id).await;
            let capability_request = CapabilityRequest {
                params: request.params,
                headers: request.headers,
                session: Some(SessionContext {
                    id: session_id.clone(),
                    context: lease.context.clone(),
                }),
            };
            let reply = entry.handler.handle(capability_request).await?;
            if let HandlerReply::ValueWithContext {
                value,
                context,
            } = reply
            {
                self.sessions.save(&session_id, context).await;
                HandlerReply::Value(value)
            } else {
                reply
            }
        } else {
            let capability_request = CapabilityRequest {
                params: request.params,
                headers: request.headers,
                session: None,
            };
            entry.handler.handle(capability_request).await?
        };

        adapt_reply(&entry.record, reply)
    }
}

/// Adapts a handler reply to the capability's advertised shape.
fn adapt_reply(
    record: &CapabilityRecord,
    reply: HandlerReply,
) -> Result<DispatchReply, ProblemDetail> {
    match (record.streaming, reply) {
        (false, HandlerReply::Value(value)) => Ok(DispatchReply::Value(value)),
        (false, HandlerReply::ValueWithContext {
            value, ..
        }) => Ok(DispatchReply::Value(value)),
        (false, HandlerReply::Stream(_)) => {
            Err(ProblemDetail::from_kind(ErrorKind::Internal)
                .with_detail("handler streamed from a non-streaming capability"))
        }
        (true, HandlerReply::Stream(chunks)) => {
            Ok(DispatchReply::Stream(ChunkSequence::new(chunks)))
        }
        // A single value adapts to a one-chunk sequence.
        (true, HandlerReply::Value(value) | HandlerReply::ValueWithContext {
            value, ..
        }) => Ok(DispatchReply::Stream(ChunkSequence::new(
            stream::once(async move { Ok(StreamChunk::json(value)) }).boxed(),
        ))),
    }
}
