// crates/agent-uri-descriptor/src/compat.rs
// ============================================================================
// Module: Agent Card Compatibility
// Description: Mapping between agent descriptors and the AgentCard shape.
// Purpose: Interoperate with the peer ecosystem's card documents.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The "agent-card" external format advertises skills rather than
//! capabilities. Mapping a descriptor to a card turns each capability into a
//! skill (description and tags carried over); mapping a card back synthesizes
//! capabilities with default metadata. The round trip across a card is LOSSY:
//! input/output schemas, streaming flags, content types, examples, endpoints,
//! supported versions, and every capability-level knob other than name,
//! description, and tags are dropped on the way out and cannot be recovered
//! on the way back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::model::AgentDescriptor;
use crate::model::Authentication;
use crate::model::Capability;
use crate::model::Provider;
use crate::parse::DescriptorError;
use crate::validate::IssueCode;
use crate::validate::ValidationIssue;

// ============================================================================
// SECTION: External Formats
// ============================================================================

/// External descriptor formats with a defined mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalFormat {
    /// The peer ecosystem's AgentCard document.
    AgentCard,
}

impl ExternalFormat {
    /// Returns the stable format label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentCard => "agent-card",
        }
    }
}

// ============================================================================
// SECTION: Descriptor -> Card
// ============================================================================

/// Maps a descriptor to an external document.
#[must_use]
pub fn to_external(descriptor: &AgentDescriptor, format: ExternalFormat) -> Value {
    match format {
        ExternalFormat::AgentCard => to_agent_card(descriptor),
    }
}

/// Maps a descriptor to the AgentCard shape.
#[must_use]
pub fn to_agent_card(descriptor: &AgentDescriptor) -> Value {
    let mut card = Map::new();
    card.insert("name".to_string(), Value::String(descriptor.name.clone()));
    card.insert("version".to_string(), Value::String(descriptor.version.clone()));
    if let Some(description) = &descriptor.description {
        card.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(url) = &descriptor.url {
        card.insert("url".to_string(), Value::String(url.clone()));
    }
    if let Some(provider) = &descriptor.provider
        && let Some(organization) = &provider.organization
    {
        card.insert("provider".to_string(), json!({ "organization": organization }));
    }

    let skills: Vec<Value> = descriptor
        .capabilities
        .iter()
        .map(|capability| {
            let mut skill = Map::new();
            skill.insert("id".to_string(), Value::String(capability.name.clone()));
            skill.insert("name".to_string(), Value::String(capability.name.clone()));
            if let Some(description) = &capability.description {
                skill.insert("description".to_string(), Value::String(description.clone()));
            }
            if !capability.tags.is_empty() {
                skill.insert(
                    "tags".to_string(),
                    Value::Array(
                        capability.tags.iter().cloned().map(Value::String).collect(),
                    ),
                );
            }
            Value::Object(skill)
        })
        .collect();
    card.insert("skills".to_string(), Value::Array(skills));

    if let Some(authentication) = &descriptor.authentication {
        let schemes: Vec<Value> = authentication
            .schemes
            .iter()
            .filter_map(|scheme| serde_json::to_value(scheme).ok())
            .collect();
        card.insert("authentication".to_string(), json!({ "schemes": schemes }));
    }
    Value::Object(card)
}

// ============================================================================
// SECTION: Card -> Descriptor
// ============================================================================

/// Maps an external document to a descriptor.
///
/// # Errors
///
/// Returns [`DescriptorError::Validation`] when the card misses required
/// members.
pub fn from_external(
    card: &Value,
    format: ExternalFormat,
) -> Result<AgentDescriptor, DescriptorError> {
    match format {
        ExternalFormat::AgentCard => from_agent_card(card),
    }
}

/// Reconstructs a descriptor from an AgentCard document.
///
/// Capabilities are synthesized from skills with default metadata; the
/// reverse direction of a lossy mapping cannot restore schemas or transport
/// hints.
///
/// # Errors
///
/// Returns [`DescriptorError::Validation`] when `name` or `skills` are
/// missing or empty.
pub fn from_agent_card(card: &Value) -> Result<AgentDescriptor, DescriptorError> {
    let mut issues = Vec::new();
    let name = card.get("name").and_then(Value::as_str).unwrap_or_default();
    if name.is_empty() {
        issues.push(ValidationIssue {
            path: "/name".to_string(),
            code: IssueCode::MissingName,
            message: "card name is required".to_string(),
        });
    }
    let skills = card.get("skills").and_then(Value::as_array).cloned().unwrap_or_default();
    if skills.is_empty() {
        issues.push(ValidationIssue {
            path: "/skills".to_string(),
            code: IssueCode::EmptyCapabilities,
            message: "card must advertise at least one skill".to_string(),
        });
    }
    if !issues.is_empty() {
        return Err(DescriptorError::Validation(issues));
    }

    let version = card
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0")
        .to_string();
    let capabilities: Vec<Capability> = skills
        .iter()
        .filter_map(|skill| {
            let skill_name = skill
                .get("name")
                .or_else(|| skill.get("id"))
                .and_then(Value::as_str)?;
            let mut capability = Capability::named(skill_name);
            capability.description = skill
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            capability.tags = skill
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter().filter_map(Value::as_str).map(str::to_string).collect()
                })
                .unwrap_or_default();
            Some(capability)
        })
        .collect();

    let mut descriptor = AgentDescriptor::new(name, version, capabilities);
    descriptor.description =
        card.get("description").and_then(Value::as_str).map(str::to_string);
    descriptor.url = card.get("url").and_then(Value::as_str).map(str::to_string);
    if let Some(organization) = card
        .get("provider")
        .and_then(|provider| provider.get("organization"))
        .and_then(Value::as_str)
    {
        descriptor.provider = Some(Provider {
            organization: Some(organization.to_string()),
            url: None,
            extra: std::collections::BTreeMap::new(),
        });
    }
    if let Some(schemes) = card
        .get("authentication")
        .and_then(|authentication| authentication.get("schemes"))
        .and_then(Value::as_array)
    {
        let schemes = schemes
            .iter()
            .filter_map(|scheme| serde_json::from_value(scheme.clone()).ok())
            .collect();
        descriptor.authentication = Some(Authentication {
            schemes,
            details: std::collections::BTreeMap::new(),
        });
    }
    Ok(descriptor)
}

// ============================================================================
// SECTION: Compatibility Probe
// ============================================================================

/// Returns true when the descriptor can survive mapping to the format.
///
/// A descriptor is card-compatible when it has at least one capability; the
/// card keeps only name, description, and tags per capability, so richer
/// metadata maps lossily but never fatally.
#[must_use]
pub fn is_format_compatible(descriptor: &AgentDescriptor, format: ExternalFormat) -> bool {
    match format {
        ExternalFormat::AgentCard => {
            !descriptor.name.is_empty() && !descriptor.capabilities.is_empty()
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
