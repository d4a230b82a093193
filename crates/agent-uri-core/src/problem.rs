// crates/agent-uri-core/src/problem.rs
// ============================================================================
// Module: Problem Details
// Description: RFC 7807 error envelope and the shared failure taxonomy.
// Purpose: Give every failure a stable kind, numeric code, and wire form.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Failures anywhere in the stack normalize into a [`ProblemDetail`], the
//! RFC 7807 "problem details" shape. Each [`ErrorKind`] carries a stable
//! numeric code (4xxx caller faults, 5xxx system faults), a stable type URI,
//! and an HTTP-compatible status that applies even on non-HTTP transports.
//! Helpers at the bottom wrap and unwrap problems for the HTTP body, duplex
//! frame, and in-process envelopes.
//! Security posture: problem text may echo untrusted server output; callers
//! must not interpolate it into markup without escaping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Media type for HTTP problem bodies.
pub const PROBLEM_JSON: &str = "application/problem+json";

/// Base URI under which stable problem type identifiers live.
pub const PROBLEM_TYPE_BASE: &str = "https://agent-uri.dev/problems/";

/// Environment variable enabling verbose debug context on problems.
pub const DEBUG_ENV_VAR: &str = "AGENT_URI_DEBUG";

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Stable failure categories shared by every component.
///
/// # Invariants
/// - Codes are stable: 4xxx are caller/input faults, 5xxx are system faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Grammar violation in a URI string.
    Parse,
    /// Descriptor failed a validation rule.
    Validation,
    /// No binding registered for a transport tag.
    UnknownTransport,
    /// Capability lookup missed.
    CapabilityNotFound,
    /// Auth provider rejected the request.
    AuthenticationFailed,
    /// Capability forbids the caller.
    PermissionDenied,
    /// Input schema mismatch.
    InvalidInput,
    /// Server or client-side rate gate.
    RateLimited,
    /// Transport-level failure.
    Network,
    /// Deadline exceeded.
    Timeout,
    /// Server returned a failure payload.
    Upstream,
    /// All resolution strategies failed.
    Resolution,
    /// Uncategorized implementation fault.
    Internal,
}

impl ErrorKind {
    /// Returns the stable numeric code for this kind.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Parse => 4001,
            Self::Validation => 4002,
            Self::UnknownTransport => 4003,
            Self::CapabilityNotFound => 4004,
            Self::AuthenticationFailed => 4005,
            Self::PermissionDenied => 4006,
            Self::InvalidInput => 4007,
            Self::RateLimited => 4029,
            Self::Network => 5001,
            Self::Timeout => 5002,
            Self::Upstream => 5003,
            Self::Resolution => 5004,
            Self::Internal => 5005,
        }
    }

    /// Returns the HTTP-compatible status mirrored on all transports.
    #[must_use]
    pub const fn default_status(self) -> u16 {
        match self {
            Self::Parse | Self::Validation | Self::InvalidInput => 400,
            Self::AuthenticationFailed => 401,
            Self::PermissionDenied => 403,
            Self::CapabilityNotFound | Self::Resolution => 404,
            Self::RateLimited => 429,
            Self::UnknownTransport | Self::Internal => 500,
            Self::Upstream | Self::Network => 502,
            Self::Timeout => 504,
        }
    }

    /// Returns the stable kebab-case slug used in problem type URIs.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Parse => "parse-error",
            Self::Validation => "validation-error",
            Self::UnknownTransport => "unknown-transport",
            Self::CapabilityNotFound => "capability-not-found",
            Self::AuthenticationFailed => "authentication-failed",
            Self::PermissionDenied => "permission-denied",
            Self::InvalidInput => "invalid-input",
            Self::RateLimited => "rate-limited",
            Self::Network => "network-error",
            Self::Timeout => "timeout",
            Self::Upstream => "upstream-error",
            Self::Resolution => "resolution-error",
            Self::Internal => "internal-error",
        }
    }

    /// Returns the human-readable title for this kind.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Parse => "URI parse error",
            Self::Validation => "Descriptor validation failed",
            Self::UnknownTransport => "Unknown transport",
            Self::CapabilityNotFound => "Capability not found",
            Self::AuthenticationFailed => "Authentication failed",
            Self::PermissionDenied => "Permission denied",
            Self::InvalidInput => "Invalid input",
            Self::RateLimited => "Rate limited",
            Self::Network => "Network error",
            Self::Timeout => "Timeout",
            Self::Upstream => "Upstream error",
            Self::Resolution => "Resolution failed",
            Self::Internal => "Internal error",
        }
    }

    /// Returns the stable problem type URI for this kind.
    #[must_use]
    pub fn problem_type(self) -> String {
        format!("{PROBLEM_TYPE_BASE}{}", self.slug())
    }

    /// Reverse-maps a problem type URI back to a kind, when recognized.
    #[must_use]
    pub fn from_problem_type(type_uri: &str) -> Option<Self> {
        let slug = type_uri.strip_prefix(PROBLEM_TYPE_BASE)?;
        [
            Self::Parse,
            Self::Validation,
            Self::UnknownTransport,
            Self::CapabilityNotFound,
            Self::AuthenticationFailed,
            Self::PermissionDenied,
            Self::InvalidInput,
            Self::RateLimited,
            Self::Network,
            Self::Timeout,
            Self::Upstream,
            Self::Resolution,
            Self::Internal,
        ]
        .into_iter()
        .find(|kind| kind.slug() == slug)
    }
}

// ============================================================================
// SECTION: Problem Detail
// ============================================================================

/// RFC 7807 problem details envelope.
///
/// # Invariants
/// - `status` mirrors HTTP semantics even on non-HTTP transports.
/// - `extensions` round-trips unknown members verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetail {
    /// Stable identifier URI for the error category.
    #[serde(rename = "type")]
    pub type_uri: String,
    /// Short human-readable summary.
    pub title: String,
    /// HTTP-compatible status code.
    pub status: u16,
    /// Human-readable explanation of this occurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// URI of the failing resource, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Arbitrary extension members.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl ProblemDetail {
    /// Creates a problem for the given kind with its default status/title.
    #[must_use]
    pub fn from_kind(kind: ErrorKind) -> Self {
        let mut problem = Self {
            type_uri: kind.problem_type(),
            title: kind.title().to_string(),
            status: kind.default_status(),
            detail: None,
            instance: None,
            extensions: BTreeMap::new(),
        };
        problem
            .extensions
            .insert("code".to_string(), Value::Number(kind.code().into()));
        problem
    }

    /// Returns the kind encoded in the type URI, when recognized.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_problem_type(&self.type_uri)
    }

    /// Returns a copy with the detail text set.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns a copy with the failing resource URI set.
    #[must_use]
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Returns a copy with one extension member set.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Returns a copy carrying verbose context when `AGENT_URI_DEBUG` is set.
    ///
    /// Without the environment variable the problem is returned unchanged, so
    /// internal context never leaks into production error payloads.
    #[must_use]
    pub fn with_debug_context(self, context: impl Into<String>) -> Self {
        if debug_enabled() {
            self.with_extension("debug_context", Value::String(context.into()))
        } else {
            self
        }
    }
}

/// Returns true when verbose error context is enabled via the environment.
#[must_use]
pub fn debug_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(DEBUG_ENV_VAR)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

// ============================================================================
// SECTION: Transport Envelopes
// ============================================================================

/// Serializes a problem into an `application/problem+json` body.
///
/// # Errors
///
/// Returns the underlying JSON error when serialization fails, which only
/// happens for non-string extension keys introduced via direct mutation.
pub fn encode_http_body(problem: &ProblemDetail) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(problem)
}

/// Parses an `application/problem+json` body.
///
/// Returns `None` when the body is not a recognizable problem document.
#[must_use]
pub fn decode_http_body(body: &[u8]) -> Option<ProblemDetail> {
    serde_json::from_slice(body).ok()
}

/// Wraps a problem into a duplex `error` frame payload.
#[must_use]
pub fn encode_frame_payload(id: &str, problem: &ProblemDetail) -> Value {
    serde_json::json!({
        "type": "error",
        "id": id,
        "problem": problem,
    })
}

/// Extracts a problem from a duplex `error` frame payload.
#[must_use]
pub fn decode_frame_payload(frame: &Value) -> Option<ProblemDetail> {
    if frame.get("type").and_then(Value::as_str) != Some("error") {
        return None;
    }
    frame.get("problem").and_then(|value| serde_json::from_value(value.clone()).ok())
}

/// Wraps a problem into the in-process error envelope.
#[must_use]
pub fn encode_local(problem: &ProblemDetail) -> Value {
    serde_json::json!({ "error": problem })
}

/// Extracts a problem from the in-process error envelope.
#[must_use]
pub fn decode_local(value: &Value) -> Option<ProblemDetail> {
    value.get("error").and_then(|inner| serde_json::from_value(inner.clone()).ok())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use serde_json::Value;
    use serde_json::json;

    use super::ErrorKind;
    use super::ProblemDetail;
    use super::decode_frame_payload;
    use super::decode_http_body;
    use super::encode_frame_payload;
    use super::encode_http_body;

    #[test]
    fn codes_partition_into_caller_and_system_faults() {
        assert_eq!(ErrorKind::Parse.code(), 4001);
        assert_eq!(ErrorKind::RateLimited.code(), 4029);
        assert_eq!(ErrorKind::Network.code(), 5001);
        assert_eq!(ErrorKind::Internal.code(), 5005);
    }

    #[test]
    fn type_uri_round_trips_to_kind() {
        for kind in [ErrorKind::Parse, ErrorKind::Timeout, ErrorKind::CapabilityNotFound] {
            let uri = kind.problem_type();
            assert_eq!(ErrorKind::from_problem_type(&uri), Some(kind));
        }
        assert_eq!(ErrorKind::from_problem_type("https://other.example/x"), None);
    }

    #[test]
    fn http_body_round_trips_with_extensions() {
        let problem = ProblemDetail::from_kind(ErrorKind::Upstream)
            .with_detail("backend returned 500")
            .with_instance("agent://acme.ai/planner")
            .with_extension("attempt", json!(2));
        let body = encode_http_body(&problem).unwrap();
        let parsed = decode_http_body(&body).unwrap();
        assert_eq!(parsed, problem);
        assert_eq!(parsed.extensions.get("attempt"), Some(&json!(2)));
    }

    #[test]
    fn frame_payload_round_trips() {
        let problem = ProblemDetail::from_kind(ErrorKind::InvalidInput).with_detail("bad params");
        let frame = encode_frame_payload("req-9", &problem);
        assert_eq!(frame.get("id").and_then(Value::as_str), Some("req-9"));
        assert_eq!(decode_frame_payload(&frame).unwrap(), problem);
    }

    #[test]
    fn frame_decode_rejects_non_error_frames() {
        let frame = json!({"type": "chunk", "id": "1", "value": 3});
        assert!(decode_frame_payload(&frame).is_none());
    }

    #[test]
    fn unknown_extensions_survive_parsing() {
        let body = br#"{
            "type": "https://agent-uri.dev/problems/upstream-error",
            "title": "Upstream error",
            "status": 502,
            "trace_id": "abc-123"
        }"#;
        let parsed = decode_http_body(body).unwrap();
        assert_eq!(parsed.extensions.get("trace_id"), Some(&json!("abc-123")));
        assert_eq!(parsed.kind(), Some(ErrorKind::Upstream));
    }
}
