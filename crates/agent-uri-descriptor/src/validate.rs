// crates/agent-uri-descriptor/src/validate.rs
// ============================================================================
// Module: Descriptor Validation
// Description: Rule-based validation for agent.json documents.
// Purpose: Enforce required fields, closed enums, and uniqueness rules.
// Dependencies: serde_json, url
// ============================================================================

//! ## Overview
//! Validation runs over the raw JSON document so every finding can carry a
//! JSON-pointer path and a stable code. Rules:
//!
//! - name present and non-empty
//! - version present (string or number)
//! - capabilities present and non-empty, each named, names unique
//! - enum fields restricted to their closed sets
//! - endpoint values absolute URIs whose scheme matches the transport key
//! - supported-version keys shaped like semantic versions
//! - authentication schemes from the closed set
//! - skill ids unique
//!
//! Violations are errors, never warnings. Strict mode additionally reports
//! unrecognized top-level members.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use url::Url;

// ============================================================================
// SECTION: Issue Model
// ============================================================================

/// Stable validation issue codes.
///
/// # Invariants
/// - Wire labels are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    /// `name` missing or empty.
    MissingName,
    /// `version` missing or of the wrong type.
    MissingVersion,
    /// `capabilities` missing, not an array, or empty.
    EmptyCapabilities,
    /// Capability name repeated within the descriptor.
    DuplicateCapability,
    /// Enum field outside its closed set.
    InvalidEnum,
    /// Endpoint value not an absolute URI with the expected scheme.
    EndpointSchemeMismatch,
    /// Supported-versions key not shaped like a semantic version.
    InvalidVersionKey,
    /// Authentication scheme outside the closed set.
    UnknownAuthScheme,
    /// Skill id repeated within the descriptor.
    DuplicateSkillId,
    /// Unrecognized top-level member (strict mode only).
    UnknownField,
}

impl IssueCode {
    /// Returns the stable wire label for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingName => "missing-name",
            Self::MissingVersion => "missing-version",
            Self::EmptyCapabilities => "empty-capabilities",
            Self::DuplicateCapability => "duplicate-capability",
            Self::InvalidEnum => "invalid-enum",
            Self::EndpointSchemeMismatch => "endpoint-scheme-mismatch",
            Self::InvalidVersionKey => "invalid-version-key",
            Self::UnknownAuthScheme => "unknown-auth-scheme",
            Self::DuplicateSkillId => "duplicate-skill-id",
            Self::UnknownField => "unknown-field",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation finding.
///
/// # Invariants
/// - `path` is a JSON pointer into the validated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON-pointer path of the offending member.
    pub path: String,
    /// Stable issue code.
    pub code: IssueCode,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.path, self.message)
    }
}

/// Result of validating a descriptor document.
///
/// # Invariants
/// - `valid` is true exactly when `issues` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Collected findings, in document order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Returns true when no issues were found.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validation behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ValidationOptions {
    /// When true, unrecognized top-level members are reported.
    pub strict: bool,
}

// ============================================================================
// SECTION: Closed Sets
// ============================================================================

/// Allowed interaction model labels.
const INTERACTION_MODELS: &[&str] =
    &["agent2agent", "fipa-acl", "kqml", "contract-net", "emergent"];

/// Allowed orchestration labels.
const ORCHESTRATIONS: &[&str] = &["delegation", "composition", "choreography", "standalone"];

/// Allowed status labels.
const STATUSES: &[&str] = &["active", "deprecated", "experimental", "beta"];

/// Allowed authentication scheme labels.
const AUTH_SCHEMES: &[&str] = &["None", "Bearer", "ApiKey", "OAuth2", "JWT", "mTLS"];

/// Allowed output variability labels.
const VARIABILITIES: &[&str] = &["none", "low", "medium", "high"];

/// Allowed response latency labels.
const LATENCIES: &[&str] = &["low", "medium", "high"];

/// Recognized top-level descriptor members, for strict-mode checks.
const KNOWN_FIELDS: &[&str] = &[
    "name",
    "version",
    "capabilities",
    "description",
    "url",
    "provider",
    "documentation_url",
    "interaction_model",
    "orchestration",
    "envelope_schemas",
    "supported_versions",
    "authentication",
    "skills",
    "endpoints",
    "status",
    "terms_of_service",
    "privacy",
    "contact",
    "jsonld_context",
];

/// Transport tags whose endpoint URL scheme must match exactly.
const SCHEME_BOUND_TAGS: &[&str] =
    &["https", "http", "wss", "ws", "grpc", "matrix", "unix", "local"];

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a raw descriptor document.
#[must_use]
pub fn validate_value(document: &Value, options: ValidationOptions) -> ValidationReport {
    let mut report = ValidationReport::default();
    let Some(root) = document.as_object() else {
        report.issues.push(ValidationIssue {
            path: String::new(),
            code: IssueCode::MissingName,
            message: "descriptor must be a json object".to_string(),
        });
        return report;
    };

    check_name(root, &mut report);
    check_version(root, &mut report);
    check_capabilities(root, &mut report);
    check_enums(root, &mut report);
    check_endpoints(root, &mut report);
    check_supported_versions(root, &mut report);
    check_authentication(root, &mut report);
    check_skills(root, &mut report);
    if options.strict {
        check_unknown_fields(root, &mut report);
    }
    report
}

/// Map alias for the root object.
type Object = serde_json::Map<String, Value>;

fn push(report: &mut ValidationReport, path: String, code: IssueCode, message: &str) {
    report.issues.push(ValidationIssue {
        path,
        code,
        message: message.to_string(),
    });
}

fn check_name(root: &Object, report: &mut ValidationReport) {
    match root.get("name") {
        Some(Value::String(name)) if !name.is_empty() => {}
        Some(Value::String(_)) => {
            push(report, "/name".to_string(), IssueCode::MissingName, "name must not be empty");
        }
        _ => push(report, "/name".to_string(), IssueCode::MissingName, "name is required"),
    }
}

fn check_version(root: &Object, report: &mut ValidationReport) {
    match root.get("version") {
        Some(Value::String(version)) if !version.is_empty() => {}
        Some(Value::Number(_)) => {}
        _ => push(
            report,
            "/version".to_string(),
            IssueCode::MissingVersion,
            "version is required as a string or number",
        ),
    }
}

fn check_capabilities(root: &Object, report: &mut ValidationReport) {
    let Some(Value::Array(capabilities)) = root.get("capabilities") else {
        push(
            report,
            "/capabilities".to_string(),
            IssueCode::EmptyCapabilities,
            "capabilities must be a non-empty array",
        );
        return;
    };
    if capabilities.is_empty() {
        push(
            report,
            "/capabilities".to_string(),
            IssueCode::EmptyCapabilities,
            "capabilities must not be empty",
        );
        return;
    }
    let mut seen: BTreeSet<(String, Option<String>)> = BTreeSet::new();
    for (index, capability) in capabilities.iter().enumerate() {
        let name = capability.get("name").and_then(Value::as_str).unwrap_or_default();
        if name.is_empty() {
            push(
                report,
                format!("/capabilities/{index}/name"),
                IssueCode::MissingName,
                "capability name is required",
            );
            continue;
        }
        let version = capability
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string);
        if !seen.insert((name.to_string(), version)) {
            push(
                report,
                format!("/capabilities/{index}/name"),
                IssueCode::DuplicateCapability,
                "capability names must be unique",
            );
        }
        check_capability_enums(capability, index, report);
    }
}

fn check_capability_enums(capability: &Value, index: usize, report: &mut ValidationReport) {
    let base = format!("/capabilities/{index}");
    check_enum_member(
        capability.get("expected_output_variability"),
        &format!("{base}/expected_output_variability"),
        VARIABILITIES,
        report,
    );
    check_enum_member(
        capability.get("response_latency"),
        &format!("{base}/response_latency"),
        LATENCIES,
        report,
    );
}

fn check_enums(root: &Object, report: &mut ValidationReport) {
    check_enum_member(root.get("interaction_model"), "/interaction_model", INTERACTION_MODELS, report);
    check_enum_member(root.get("orchestration"), "/orchestration", ORCHESTRATIONS, report);
    check_enum_member(root.get("status"), "/status", STATUSES, report);
}

fn check_enum_member(
    value: Option<&Value>,
    path: &str,
    allowed: &[&str],
    report: &mut ValidationReport,
) {
    if let Some(value) = value {
        let ok = value.as_str().is_some_and(|label| allowed.contains(&label));
        if !ok {
            push(
                report,
                path.to_string(),
                IssueCode::InvalidEnum,
                &format!("value must be one of: {}", allowed.join(", ")),
            );
        }
    }
}

fn check_endpoints(root: &Object, report: &mut ValidationReport) {
    let Some(Value::Object(endpoints)) = root.get("endpoints") else {
        return;
    };
    for (tag, value) in endpoints {
        let path = format!("/endpoints/{tag}");
        let Some(text) = value.as_str() else {
            push(report, path, IssueCode::EndpointSchemeMismatch, "endpoint must be a string");
            continue;
        };
        let Ok(parsed) = Url::parse(text) else {
            push(
                report,
                path,
                IssueCode::EndpointSchemeMismatch,
                "endpoint must be an absolute uri",
            );
            continue;
        };
        if SCHEME_BOUND_TAGS.contains(&tag.as_str()) && parsed.scheme() != tag {
            push(
                report,
                path,
                IssueCode::EndpointSchemeMismatch,
                &format!("endpoint scheme must be {tag}"),
            );
        }
    }
}

fn check_supported_versions(root: &Object, report: &mut ValidationReport) {
    let Some(Value::Object(versions)) = root.get("supported_versions") else {
        return;
    };
    for key in versions.keys() {
        if !is_semver_like(key) {
            push(
                report,
                format!("/supported_versions/{key}"),
                IssueCode::InvalidVersionKey,
                "version keys must look like semantic versions",
            );
        }
    }
}

/// Returns true for `MAJOR[.MINOR[.PATCH]][-pre][+build]` shapes.
fn is_semver_like(key: &str) -> bool {
    let core_end = key.find(['-', '+']).unwrap_or(key.len());
    let core = &key[..core_end];
    let mut parts = 0;
    for part in core.split('.') {
        parts += 1;
        if parts > 3 || part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
            return false;
        }
    }
    parts >= 1
}

fn check_authentication(root: &Object, report: &mut ValidationReport) {
    let Some(Value::Object(authentication)) = root.get("authentication") else {
        return;
    };
    let Some(Value::Array(schemes)) = authentication.get("schemes") else {
        return;
    };
    for (index, scheme) in schemes.iter().enumerate() {
        let ok = scheme.as_str().is_some_and(|label| AUTH_SCHEMES.contains(&label));
        if !ok {
            push(
                report,
                format!("/authentication/schemes/{index}"),
                IssueCode::UnknownAuthScheme,
                &format!("scheme must be one of: {}", AUTH_SCHEMES.join(", ")),
            );
        }
    }
}

fn check_skills(root: &Object, report: &mut ValidationReport) {
    let Some(Value::Array(skills)) = root.get("skills") else {
        return;
    };
    let mut seen = BTreeSet::new();
    for (index, skill) in skills.iter().enumerate() {
        if let Some(id) = skill.get("id").and_then(Value::as_str)
            && !seen.insert(id.to_string())
        {
            push(
                report,
                format!("/skills/{index}/id"),
                IssueCode::DuplicateSkillId,
                "skill ids must be unique",
            );
        }
    }
}

fn check_unknown_fields(root: &Object, report: &mut ValidationReport) {
    for key in root.keys() {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            push(
                report,
                format!("/{key}"),
                IssueCode::UnknownField,
                "unrecognized descriptor member",
            );
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use serde_json::json;

    use super::IssueCode;
    use super::ValidationOptions;
    use super::is_semver_like;
    use super::validate_value;

    fn codes(document: &serde_json::Value) -> Vec<IssueCode> {
        validate_value(document, ValidationOptions::default())
            .issues
            .into_iter()
            .map(|issue| issue.code)
            .collect()
    }

    #[test]
    fn minimal_valid_descriptor_passes() {
        let document = json!({
            "name": "echo",
            "version": "1.0.0",
            "capabilities": [{"name": "echo"}],
        });
        assert!(validate_value(&document, ValidationOptions::default()).valid());
    }

    #[test]
    fn missing_required_fields_each_report() {
        let report = validate_value(&json!({}), ValidationOptions::default());
        let codes: Vec<IssueCode> = report.issues.iter().map(|issue| issue.code).collect();
        assert!(codes.contains(&IssueCode::MissingName));
        assert!(codes.contains(&IssueCode::MissingVersion));
        assert!(codes.contains(&IssueCode::EmptyCapabilities));
    }

    #[test]
    fn duplicate_capability_names_rejected() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [{"name": "x"}, {"name": "x"}],
        });
        assert_eq!(codes(&document), vec![IssueCode::DuplicateCapability]);
    }

    #[test]
    fn same_name_different_version_allowed() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [
                {"name": "x", "version": "1"},
                {"name": "x", "version": "2"},
            ],
        });
        assert!(validate_value(&document, ValidationOptions::default()).valid());
    }

    #[test]
    fn enum_violation_is_an_error_with_pointer_path() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [{"name": "x"}],
            "interaction_model": "psychic",
        });
        let report = validate_value(&document, ValidationOptions::default());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, IssueCode::InvalidEnum);
        assert_eq!(report.issues[0].path, "/interaction_model");
    }

    #[test]
    fn endpoint_scheme_must_match_tag() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [{"name": "x"}],
            "endpoints": {
                "https": "https://a.example/agent",
                "wss": "https://a.example/ws",
                "custom": "foo://anything",
            },
        });
        let report = validate_value(&document, ValidationOptions::default());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].path, "/endpoints/wss");
        assert_eq!(report.issues[0].code, IssueCode::EndpointSchemeMismatch);
    }

    #[test]
    fn relative_endpoint_is_rejected() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [{"name": "x"}],
            "endpoints": {"https": "/relative/path"},
        });
        assert_eq!(codes(&document), vec![IssueCode::EndpointSchemeMismatch]);
    }

    #[test]
    fn semver_shapes() {
        assert!(is_semver_like("1"));
        assert!(is_semver_like("1.2"));
        assert!(is_semver_like("1.2.3"));
        assert!(is_semver_like("1.2.3-beta.1"));
        assert!(is_semver_like("1.2.3+build"));
        assert!(!is_semver_like("v1"));
        assert!(!is_semver_like("1.2.3.4"));
        assert!(!is_semver_like(""));
        assert!(!is_semver_like("1..2"));
    }

    #[test]
    fn unknown_auth_scheme_reports_index() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [{"name": "x"}],
            "authentication": {"schemes": ["Bearer", "Voodoo"]},
        });
        let report = validate_value(&document, ValidationOptions::default());
        assert_eq!(report.issues[0].path, "/authentication/schemes/1");
        assert_eq!(report.issues[0].code, IssueCode::UnknownAuthScheme);
    }

    #[test]
    fn duplicate_skill_ids_rejected() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [{"name": "x"}],
            "skills": [
                {"id": "s1", "name": "one"},
                {"id": "s1", "name": "two"},
            ],
        });
        assert_eq!(codes(&document), vec![IssueCode::DuplicateSkillId]);
    }

    #[test]
    fn strict_mode_reports_unknown_members() {
        let document = json!({
            "name": "a", "version": "1",
            "capabilities": [{"name": "x"}],
            "x-extra": 1,
        });
        assert!(validate_value(&document, ValidationOptions::default()).valid());
        let strict = validate_value(
            &document,
            ValidationOptions {
                strict: true,
            },
        );
        assert_eq!(strict.issues[0].code, IssueCode::UnknownField);
        assert_eq!(strict.issues[0].path, "/x-extra");
    }
}
