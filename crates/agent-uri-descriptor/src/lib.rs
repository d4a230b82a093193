// crates/agent-uri-descriptor/src/lib.rs
// ============================================================================
// Module: Agent Descriptor Library
// Description: agent.json data model, validation, and format mapping.
// Purpose: Represent, validate, parse, and serialize agent descriptors.
// Dependencies: agent-uri-core, serde, serde_json, reqwest, url, thiserror
// ============================================================================

//! ## Overview
//! This crate owns the `agent.json` document: the typed model, the rule
//! validator with JSON-pointer findings, canonical and JSON-LD serialization,
//! size-capped source loading, and the lossy AgentCard compatibility mapping.
//! Invariants:
//! - Validators never mutate a descriptor.
//! - Unknown document members are preserved on round-trip.
//! - `version` is canonicalized to a string regardless of input type.
//!
//! Security posture: descriptor bytes arrive from untrusted servers; parsing
//! validates before the typed model is produced.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod compat;
pub mod model;
pub mod parse;
pub mod validate;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use compat::ExternalFormat;
pub use compat::from_agent_card;
pub use compat::from_external;
pub use compat::is_format_compatible;
pub use compat::to_agent_card;
pub use compat::to_external;
pub use model::AgentDescriptor;
pub use model::AgentStatus;
pub use model::AuthScheme;
pub use model::Authentication;
pub use model::Capability;
pub use model::CapabilityExample;
pub use model::ContentTypes;
pub use model::InteractionModel;
pub use model::Orchestration;
pub use model::OutputVariability;
pub use model::Provider;
pub use model::ResponseLatency;
pub use model::Skill;
pub use parse::DescriptorError;
pub use parse::Format;
pub use parse::MAX_DESCRIPTOR_BYTES;
pub use parse::fetch_descriptor;
pub use parse::load_descriptor;
pub use parse::parse_descriptor;
pub use parse::serialize_descriptor;
pub use validate::IssueCode;
pub use validate::ValidationIssue;
pub use validate::ValidationOptions;
pub use validate::ValidationReport;
pub use validate::validate_value;
