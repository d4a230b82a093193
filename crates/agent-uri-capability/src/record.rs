// crates/agent-uri-capability/src/record.rs
// ============================================================================
// Module: Capability Records
// Description: Design-time capability metadata and the handler contract.
// Purpose: Describe server-side capabilities and their invocation shape.
// Dependencies: agent-uri-descriptor, agent-uri-transport, async-trait, serde
// ============================================================================

//! ## Overview
//! A [`CapabilityRecord`] is the design-time description of one server-side
//! capability: its advertised metadata plus the switches the dispatcher
//! enforces (schemas, streaming, sessions, auth). The paired
//! [`CapabilityHandler`] receives validated parameters and replies with a
//! value, a value plus session context, or a chunk stream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use agent_uri_core::ProblemDetail;
use agent_uri_descriptor::Capability;
use agent_uri_descriptor::ContentTypes;
use agent_uri_transport::ChunkStream;

// ============================================================================
// SECTION: Capability Record
// ============================================================================

/// Design-time description of a server-side capability.
///
/// # Invariants
/// - `name` is the invocation key and unique within one registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// Capability name.
    pub name: String,
    /// Optional capability version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Description surfaced in derived descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// JSON schema enforced against invocation params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// JSON schema advertised for output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// True when the handler streams chunks.
    #[serde(default)]
    pub streaming: bool,
    /// True when the capability keeps per-session state.
    #[serde(default)]
    pub memory_enabled: bool,
    /// True when identical inputs yield identical outputs.
    #[serde(default)]
    pub is_deterministic: bool,
    /// True when the dispatcher must apply the auth policy.
    #[serde(default)]
    pub requires_auth: bool,
    /// Accepted and produced media types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_types: Option<ContentTypes>,
}

impl CapabilityRecord {
    /// Creates a record with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the record with a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the record with an input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Returns the record marked as streaming.
    #[must_use]
    pub const fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Returns the record with session memory enabled.
    #[must_use]
    pub const fn with_memory(mut self) -> Self {
        self.memory_enabled = true;
        self
    }

    /// Returns the record requiring authentication.
    #[must_use]
    pub const fn with_auth_required(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Maps the record into its advertised descriptor capability.
    #[must_use]
    pub fn to_capability(&self) -> Capability {
        let mut capability = Capability::named(self.name.clone());
        capability.version = self.version.clone();
        capability.description = self.description.clone();
        capability.tags = self.tags.clone();
        capability.input_schema = self.input_schema.clone();
        capability.output_schema = self.output_schema.clone();
        capability.streaming = Some(self.streaming);
        capability.memory_enabled = Some(self.memory_enabled);
        capability.is_deterministic = Some(self.is_deterministic);
        capability.content_types = self.content_types.clone();
        capability
    }
}

// ============================================================================
// SECTION: Handler Contract
// ============================================================================

/// Session correlation passed to memory-enabled handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    /// Correlation token identifying the session.
    pub id: String,
    /// Context returned by the previous call in this session.
    pub context: Option<Value>,
}

/// One invocation as seen by a handler.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    /// Validated invocation parameters.
    pub params: Value,
    /// Caller headers, passed through.
    pub headers: BTreeMap<String, String>,
    /// Session correlation for memory-enabled capabilities.
    pub session: Option<SessionContext>,
}

/// Handler reply shapes.
pub enum HandlerReply {
    /// Single response value.
    Value(Value),
    /// Response value plus session context carried to the next call.
    ValueWithContext {
        /// Response value.
        value: Value,
        /// Context stored under the session id.
        context: Value,
    },
    /// Lazy chunk stream for streaming capabilities.
    Stream(ChunkStream),
}

/// User-supplied capability implementation.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Handles one validated invocation.
    ///
    /// # Errors
    ///
    /// Returns a [`ProblemDetail`] that reaches the caller verbatim.
    async fn handle(&self, request: CapabilityRequest) -> Result<HandlerReply, ProblemDetail>;
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::CapabilityRecord;

    #[test]
    fn record_maps_to_descriptor_capability() {
        let record = CapabilityRecord::named("gen-iti")
            .with_description("Generate an itinerary")
            .with_input_schema(json!({"type": "object"}))
            .streaming()
            .with_memory();
        let capability = record.to_capability();
        assert_eq!(capability.name, "gen-iti");
        assert_eq!(capability.streaming, Some(true));
        assert_eq!(capability.memory_enabled, Some(true));
        assert_eq!(capability.is_deterministic, Some(false));
        assert_eq!(capability.input_schema, Some(json!({"type": "object"})));
    }
}
