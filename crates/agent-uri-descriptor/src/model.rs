// crates/agent-uri-descriptor/src/model.rs
// ============================================================================
// Module: Descriptor Data Model
// Description: Typed model for agent.json descriptors and capabilities.
// Purpose: Provide canonical serde shapes with closed enums and passthrough.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The descriptor is the self-describing document published at an agent's
//! well-known location. Required fields are `name`, `version`, and a
//! non-empty capability list; everything else is optional. Enum fields are
//! closed sets; unknown document members are preserved in `extra` maps so a
//! descriptor survives a parse/serialize round trip untouched.
//! Security posture: descriptor bytes arrive from untrusted servers and are
//! validated before use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Interaction model advertised by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionModel {
    /// Agent-to-agent request/response.
    Agent2agent,
    /// FIPA agent communication language.
    FipaAcl,
    /// Knowledge query and manipulation language.
    Kqml,
    /// Contract-net task allocation.
    ContractNet,
    /// Emergent, unconstrained interaction.
    Emergent,
}

/// Orchestration style an agent participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orchestration {
    /// Delegates subtasks to other agents.
    Delegation,
    /// Composes results from other agents.
    Composition,
    /// Participates in choreographed flows.
    Choreography,
    /// Operates standalone.
    Standalone,
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentStatus {
    /// Fully supported.
    Active,
    /// Still served but scheduled for removal.
    Deprecated,
    /// Unstable preview.
    Experimental,
    /// Pre-release quality.
    Beta,
}

/// Authentication schemes from the closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthScheme {
    /// No authentication.
    None,
    /// Bearer token.
    Bearer,
    /// Static API key.
    ApiKey,
    /// OAuth 2.0 flows.
    OAuth2,
    /// JSON web tokens.
    #[serde(rename = "JWT")]
    Jwt,
    /// Mutual TLS.
    #[serde(rename = "mTLS")]
    Mtls,
}

/// Expected variability of capability output across identical inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputVariability {
    /// Deterministic output.
    None,
    /// Minor variation.
    Low,
    /// Moderate variation.
    Medium,
    /// Highly variable output.
    High,
}

/// Advertised response latency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseLatency {
    /// Sub-second responses.
    Low,
    /// Seconds.
    Medium,
    /// Long-running.
    High,
}

// ============================================================================
// SECTION: Nested Records
// ============================================================================

/// Organization providing the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Organization name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Organization URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Unrecognized members, preserved on round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Authentication requirements advertised by the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    /// Accepted schemes from the closed set.
    #[serde(default)]
    pub schemes: Vec<AuthScheme>,
    /// Scheme-specific opaque details.
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

/// Named skill advertised alongside capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional tag list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Accepted and produced media types for a capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentTypes {
    /// Media types accepted as input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<String>,
    /// Media types produced as output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
}

/// Worked example attached to a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityExample {
    /// Example input document.
    pub input: Value,
    /// Matching output document.
    pub output: Value,
    /// Optional prose description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// SECTION: Capability
// ============================================================================

/// A named function or behavior advertised by an agent.
///
/// # Invariants
/// - `name` is non-empty (enforced by validation, not construction).
/// - Capability names are unique within one descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability name; the invocation key.
    pub name: String,
    /// Optional capability version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque JSON schema for input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    /// Opaque JSON schema for output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// True when identical inputs yield identical outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deterministic: Option<bool>,
    /// Expected spread of outputs across identical inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output_variability: Option<OutputVariability>,
    /// Media types accepted and produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_types: Option<ContentTypes>,
    /// True when invocation requires caller context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_context: Option<bool>,
    /// True when the capability maintains session memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_enabled: Option<bool>,
    /// Advertised latency class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_latency: Option<ResponseLatency>,
    /// True when the capability can stream chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// True when deprecated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    /// Reason for deprecation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_reason: Option<String>,
    /// Worked examples.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<CapabilityExample>,
    /// Unrecognized members, preserved on round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Capability {
    /// Creates a minimal capability with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            input_schema: None,
            output_schema: None,
            is_deterministic: None,
            expected_output_variability: None,
            content_types: None,
            requires_context: None,
            memory_enabled: None,
            response_latency: None,
            streaming: None,
            tags: Vec::new(),
            deprecated: None,
            deprecated_reason: None,
            examples: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Descriptor
// ============================================================================

/// Self-describing agent document published at a well-known location.
///
/// # Invariants
/// - `version` is always stored as a string; numeric input is stringified.
/// - Validators never mutate a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Agent name.
    pub name: String,
    /// Agent version, canonicalized to a string.
    #[serde(deserialize_with = "version_string")]
    pub version: String,
    /// Advertised capabilities, unique by name.
    pub capabilities: Vec<Capability>,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Primary endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Providing organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// Documentation URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    /// Interaction model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_model: Option<InteractionModel>,
    /// Orchestration style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<Orchestration>,
    /// Supported envelope media types, in preference order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envelope_schemas: Vec<String>,
    /// Mapping from supported version to endpoint path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub supported_versions: BTreeMap<String, String>,
    /// Authentication requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
    /// Advertised skills, unique by id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<Skill>,
    /// Mapping from transport tag to absolute endpoint URI.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, String>,
    /// Lifecycle status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    /// Terms of service URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    /// Privacy policy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<String>,
    /// Contact address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// JSON-LD context injected when serializing as JSON-LD.
    #[serde(default, rename = "jsonld_context", skip_serializing_if = "Option::is_none")]
    pub jsonld_context: Option<Value>,
    /// Unrecognized members, preserved on round-trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AgentDescriptor {
    /// Creates a minimal descriptor with the required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            capabilities,
            description: None,
            url: None,
            provider: None,
            documentation_url: None,
            interaction_model: None,
            orchestration: None,
            envelope_schemas: Vec::new(),
            supported_versions: BTreeMap::new(),
            authentication: None,
            skills: Vec::new(),
            endpoints: BTreeMap::new(),
            status: None,
            terms_of_service: None,
            privacy: None,
            contact: None,
            jsonld_context: None,
            extra: BTreeMap::new(),
        }
    }

    /// Returns the capability with the given name, if advertised.
    #[must_use]
    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|capability| capability.name == name)
    }
}

/// Deserializes a version that may arrive as a string or a number.
fn version_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
