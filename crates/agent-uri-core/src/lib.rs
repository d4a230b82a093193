// crates/agent-uri-core/src/lib.rs
// ============================================================================
// Module: Agent URI Core Library
// Description: Grammar engine and shared error model for the agent:// protocol.
// Purpose: Parse, normalize, and serialize agent URIs; define failure taxonomy.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate implements the `agent://` URI grammar and the error model
//! shared by every other layer of the stack.
//! Invariants:
//! - A parsed URI round-trips byte-identically after [`AgentUri::normalize`].
//! - Normalization is idempotent.
//! - The host component is never empty.
//! - Every failure category has a stable numeric code and problem type URI.
//!
//! Security posture: all parse input is untrusted; rejections carry the byte
//! offset of the first offending byte.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod clock;
pub mod encoding;
pub mod error;
pub mod parse;
pub mod problem;
pub mod query;
pub mod uri;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use error::ParseError;
pub use error::ParseReason;
pub use problem::ErrorKind;
pub use problem::PROBLEM_JSON;
pub use problem::ProblemDetail;
pub use query::QueryPairs;
pub use query::QueryValue;
pub use uri::AgentUri;
pub use uri::SCHEME;
