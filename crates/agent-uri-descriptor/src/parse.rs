// crates/agent-uri-descriptor/src/parse.rs
// ============================================================================
// Module: Descriptor Parsing
// Description: Byte-level parsing, serialization, and source loading.
// Purpose: Turn agent.json bytes into validated descriptors and back.
// Dependencies: agent-uri-core, serde_json, reqwest, thiserror
// ============================================================================

//! ## Overview
//! Parsing first reads the raw JSON document, runs rule validation so every
//! failure carries pointer paths, and only then deserializes into the typed
//! model. Serialization offers a canonical JSON form and a JSON-LD form that
//! injects an `@context`. Loading is size-capped for both files and URLs;
//! descriptor fetches never follow redirects.
//! Security posture: descriptor sources are untrusted; reads fail closed on
//! oversized payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use agent_uri_core::ErrorKind;
use agent_uri_core::ProblemDetail;

use crate::model::AgentDescriptor;
use crate::validate::ValidationIssue;
use crate::validate::ValidationOptions;
use crate::validate::validate_value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard upper bound on descriptor payloads, in bytes.
pub const MAX_DESCRIPTOR_BYTES: usize = 1024 * 1024;

/// Default JSON-LD context injected when the descriptor carries none.
pub const DEFAULT_JSONLD_CONTEXT: &str = "https://agent-uri.dev/context/v1";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Descriptor parsing and loading errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Payload was not valid JSON.
    #[error("descriptor is not valid json: {0}")]
    Json(String),
    /// Document failed one or more validation rules.
    #[error("descriptor failed validation ({} issues)", .0.len())]
    Validation(Vec<ValidationIssue>),
    /// Payload exceeded the size cap.
    #[error("descriptor exceeds size limit ({actual} > {limit})")]
    TooLarge {
        /// Observed payload size.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },
    /// Filesystem read failed.
    #[error("descriptor read failed: {0}")]
    Io(String),
    /// Network fetch failed.
    #[error("descriptor fetch failed: {0}")]
    Fetch(String),
    /// Fetch returned a non-success status.
    #[error("descriptor fetch returned status {0}")]
    FetchStatus(u16),
}

impl DescriptorError {
    /// Returns the problem envelope for this failure.
    ///
    /// Validation failures list each finding in a `violations` extension.
    #[must_use]
    pub fn problem(&self) -> ProblemDetail {
        match self {
            Self::Validation(issues) => {
                let violations: Vec<Value> = issues
                    .iter()
                    .map(|issue| {
                        serde_json::json!({
                            "path": issue.path,
                            "code": issue.code,
                            "message": issue.message,
                        })
                    })
                    .collect();
                ProblemDetail::from_kind(ErrorKind::Validation)
                    .with_detail(self.to_string())
                    .with_extension("violations", Value::Array(violations))
            }
            Self::Json(_) | Self::TooLarge {
                ..
            } => ProblemDetail::from_kind(ErrorKind::Validation).with_detail(self.to_string()),
            Self::Io(_) | Self::Fetch(_) => {
                ProblemDetail::from_kind(ErrorKind::Network).with_detail(self.to_string())
            }
            Self::FetchStatus(_) => {
                ProblemDetail::from_kind(ErrorKind::Upstream).with_detail(self.to_string())
            }
        }
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses and validates descriptor bytes.
///
/// # Errors
///
/// Returns [`DescriptorError::Json`] for malformed JSON and
/// [`DescriptorError::Validation`] with the full issue list when any rule
/// fails.
pub fn parse_descriptor(
    bytes: &[u8],
    options: ValidationOptions,
) -> Result<AgentDescriptor, DescriptorError> {
    if bytes.len() > MAX_DESCRIPTOR_BYTES {
        return Err(DescriptorError::TooLarge {
            actual: bytes.len(),
            limit: MAX_DESCRIPTOR_BYTES,
        });
    }
    let document: Value =
        serde_json::from_slice(bytes).map_err(|err| DescriptorError::Json(err.to_string()))?;
    let report = validate_value(&document, options);
    if !report.valid() {
        return Err(DescriptorError::Validation(report.issues));
    }
    serde_json::from_value(document).map_err(|err| DescriptorError::Json(err.to_string()))
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

/// Output forms for descriptor serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Compact canonical JSON.
    Canonical,
    /// JSON-LD with an injected `@context`.
    JsonLd,
}

/// Serializes a descriptor to bytes in the requested format.
///
/// # Errors
///
/// Returns [`DescriptorError::Json`] when serialization fails.
pub fn serialize_descriptor(
    descriptor: &AgentDescriptor,
    format: Format,
) -> Result<Vec<u8>, DescriptorError> {
    let mut document =
        serde_json::to_value(descriptor).map_err(|err| DescriptorError::Json(err.to_string()))?;
    if format == Format::JsonLd
        && let Some(root) = document.as_object_mut()
    {
        let context = root
            .remove("jsonld_context")
            .unwrap_or_else(|| Value::String(DEFAULT_JSONLD_CONTEXT.to_string()));
        root.insert("@context".to_string(), context);
    }
    serde_json::to_vec(&document).map_err(|err| DescriptorError::Json(err.to_string()))
}

// ============================================================================
// SECTION: Source Loading
// ============================================================================

/// Loads and parses a descriptor from a filesystem path.
///
/// # Errors
///
/// Returns [`DescriptorError`] on read failure, oversized files, or any
/// parse/validation failure.
pub fn load_descriptor(
    path: &Path,
    options: ValidationOptions,
) -> Result<AgentDescriptor, DescriptorError> {
    let metadata = std::fs::metadata(path).map_err(|err| DescriptorError::Io(err.to_string()))?;
    if metadata.len() > MAX_DESCRIPTOR_BYTES as u64 {
        return Err(DescriptorError::TooLarge {
            actual: usize::try_from(metadata.len()).unwrap_or(usize::MAX),
            limit: MAX_DESCRIPTOR_BYTES,
        });
    }
    let bytes = std::fs::read(path).map_err(|err| DescriptorError::Io(err.to_string()))?;
    parse_descriptor(&bytes, options)
}

/// Fetches and parses a descriptor from an absolute URL.
///
/// Redirects are not followed; a redirect status surfaces as
/// [`DescriptorError::FetchStatus`].
///
/// # Errors
///
/// Returns [`DescriptorError`] on transport failure, non-success status,
/// oversized bodies, or any parse/validation failure.
pub async fn fetch_descriptor(
    url: &str,
    options: ValidationOptions,
) -> Result<AgentDescriptor, DescriptorError> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|err| DescriptorError::Fetch(err.to_string()))?;
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|err| DescriptorError::Fetch(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(DescriptorError::FetchStatus(status.as_u16()));
    }
    let mut body = Vec::new();
    let mut response = response;
    while let Some(chunk) =
        response.chunk().await.map_err(|err| DescriptorError::Fetch(err.to_string()))?
    {
        if body.len() + chunk.len() > MAX_DESCRIPTOR_BYTES {
            return Err(DescriptorError::TooLarge {
                actual: body.len() + chunk.len(),
                limit: MAX_DESCRIPTOR_BYTES,
            });
        }
        body.extend_from_slice(&chunk);
    }
    parse_descriptor(&body, options)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
