// crates/agent-uri-capability/src/registry.rs
// ============================================================================
// Module: Capability Registry
// Description: Ordered capability registration and descriptor derivation.
// Purpose: Hold capability records, handlers, and compiled input schemas.
// Dependencies: agent-uri-descriptor, jsonschema, thiserror
// ============================================================================

//! ## Overview
//! Capabilities register once under a unique name; duplicates are rejected.
//! Registration order is preserved and flows into generated descriptors, so
//! listings stay diff-stable across releases. Input schemas compile at
//! registration time; a schema that does not compile never enters the
//! registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;

use jsonschema::Draft;
use jsonschema::Validator;
use thiserror::Error;

use agent_uri_descriptor::AgentDescriptor;
use agent_uri_descriptor::AgentStatus;
use agent_uri_descriptor::Authentication;
use agent_uri_descriptor::InteractionModel;
use agent_uri_descriptor::Provider;

use crate::record::CapabilityHandler;
use crate::record::CapabilityRecord;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registration failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A capability with this name is already registered.
    #[error("capability already registered: {name}")]
    Duplicate {
        /// The conflicting name.
        name: String,
    },
    /// The input schema did not compile.
    #[error("input schema for {name} is invalid: {detail}")]
    InvalidSchema {
        /// Capability name.
        name: String,
        /// Compiler diagnostic.
        detail: String,
    },
}

// ============================================================================
// SECTION: Agent Metadata
// ============================================================================

/// Agent-level metadata merged into derived descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentMeta {
    /// Agent name.
    pub name: String,
    /// Agent version string.
    pub version: String,
    /// Optional description.
    pub description: Option<String>,
    /// Primary endpoint URL.
    pub url: Option<String>,
    /// Providing organization.
    pub provider: Option<Provider>,
    /// Interaction model.
    pub interaction_model: Option<InteractionModel>,
    /// Authentication requirements.
    pub authentication: Option<Authentication>,
    /// Lifecycle status.
    pub status: Option<AgentStatus>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// One registered capability.
pub(crate) struct Registered {
    /// Design-time record.
    pub record: CapabilityRecord,
    /// User handler.
    pub handler: Arc<dyn CapabilityHandler>,
    /// Compiled input schema, when declared.
    pub validator: Option<Arc<Validator>>,
}

/// Ordered capability registry.
///
/// # Invariants
/// - Names are unique.
/// - `list` returns records in registration order.
#[derive(Default)]
pub struct CapabilityRegistry {
    /// Registered capabilities in registration order.
    entries: RwLock<Vec<Arc<Registered>>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability with its handler.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Duplicate`] for a name collision and
    /// [`CapabilityError::InvalidSchema`] when the input schema fails to
    /// compile.
    pub fn register(
        &self,
        record: CapabilityRecord,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<(), CapabilityError> {
        let validator = match &record.input_schema {
            Some(schema) => Some(Arc::new(
                jsonschema::options()
                    .with_draft(Draft::Draft202012)
                    .build(schema)
                    .map_err(|err| CapabilityError::InvalidSchema {
                        name: record.name.clone(),
                        detail: err.to_string(),
                    })?,
            )),
            None => None,
        };
        let mut entries = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.iter().any(|entry| entry.record.name == record.name) {
            return Err(CapabilityError::Duplicate {
                name: record.name,
            });
        }
        entries.push(Arc::new(Registered {
            record,
            handler,
            validator,
        }));
        Ok(())
    }

    /// Returns the records in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<CapabilityRecord> {
        self.entries
            .read()
            .map(|entries| entries.iter().map(|entry| entry.record.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the registered entry for a name.
    pub(crate) fn get(&self, name: &str) -> Option<Arc<Registered>> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| {
                entries.iter().find(|entry| entry.record.name == name).cloned()
            })
    }

    /// Returns true when a capability is registered under the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Synthesizes a descriptor from agent metadata and the capability list.
    #[must_use]
    pub fn derive_descriptor(&self, meta: &AgentMeta) -> AgentDescriptor {
        let capabilities =
            self.list().iter().map(CapabilityRecord::to_capability).collect::<Vec<_>>();
        let mut descriptor =
            AgentDescriptor::new(meta.name.clone(), meta.version.clone(), capabilities);
        descriptor.description = meta.description.clone();
        descriptor.url = meta.url.clone();
        descriptor.provider = meta.provider.clone();
        descriptor.interaction_model = meta.interaction_model;
        descriptor.authentication = meta.authentication.clone();
        descriptor.status = meta.status;
        descriptor
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::AgentMeta;
    use super::CapabilityError;
    use super::CapabilityRegistry;
    use crate::record::CapabilityHandler;
    use crate::record::CapabilityRecord;
    use crate::record::CapabilityRequest;
    use crate::record::HandlerReply;

    struct NoopHandler;

    #[async_trait]
    impl CapabilityHandler for NoopHandler {
        async fn handle(
            &self,
            _request: CapabilityRequest,
        ) -> Result<HandlerReply, agent_uri_core::ProblemDetail> {
            Ok(HandlerReply::Value(json!(null)))
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = CapabilityRegistry::new();
        registry.register(CapabilityRecord::named("echo"), Arc::new(NoopHandler)).unwrap();
        let err = registry
            .register(CapabilityRecord::named("echo"), Arc::new(NoopHandler))
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Duplicate { ref name } if name == "echo"));
    }

    #[test]
    fn listing_preserves_registration_order() {
        let registry = CapabilityRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(CapabilityRecord::named(name), Arc::new(NoopHandler)).unwrap();
        }
        let names: Vec<String> =
            registry.list().into_iter().map(|record| record.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn invalid_input_schema_is_rejected_at_registration() {
        let registry = CapabilityRegistry::new();
        let record = CapabilityRecord::named("bad")
            .with_input_schema(json!({"type": "not-a-type"}));
        let err = registry.register(record, Arc::new(NoopHandler)).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidSchema { .. }));
    }

    #[test]
    fn derived_descriptor_merges_meta_and_capabilities() {
        let registry = CapabilityRegistry::new();
        registry
            .register(
                CapabilityRecord::named("gen-iti").with_description("plan trips").streaming(),
                Arc::new(NoopHandler),
            )
            .unwrap();
        let meta = AgentMeta {
            name: "planner".to_string(),
            version: "1.0.0".to_string(),
            description: Some("Trip planner".to_string()),
            ..AgentMeta::default()
        };
        let descriptor = registry.derive_descriptor(&meta);
        assert_eq!(descriptor.name, "planner");
        assert_eq!(descriptor.capabilities.len(), 1);
        assert_eq!(descriptor.capabilities[0].name, "gen-iti");
        assert_eq!(descriptor.capabilities[0].streaming, Some(true));
    }
}
