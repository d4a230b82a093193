// crates/agent-uri-core/src/error.rs
// ============================================================================
// Module: Parse Errors
// Description: Grammar violation errors for agent URI parsing.
// Purpose: Report the byte offset and reason of the first offending input byte.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Parsing rejects non-conforming input with a [`ParseError`] carrying the
//! byte offset of the first bad byte and a closed [`ParseReason`]. Offsets are
//! byte positions into the original input, suitable for caret diagnostics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Parse Error
// ============================================================================

/// Grammar violation encountered while parsing an agent URI.
///
/// # Invariants
/// - `position` is a byte offset into the parsed input, `<=` input length.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid agent uri at byte {position}: {reason}")]
pub struct ParseError {
    /// Byte offset of the first offending byte.
    pub position: usize,
    /// Category of the violation.
    pub reason: ParseReason,
}

impl ParseError {
    /// Creates a parse error at the given byte offset.
    #[must_use]
    pub const fn new(position: usize, reason: ParseReason) -> Self {
        Self {
            position,
            reason,
        }
    }
}

/// Closed set of grammar violation categories.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseReason {
    /// Scheme is not exactly `agent` (case-insensitive).
    #[error("scheme must be \"agent\"")]
    Scheme,
    /// Transport tag is empty or contains a non-grammar character.
    #[error("transport tag must be non-empty alphanumeric or '-'")]
    TransportTag,
    /// The `//` authority introducer is missing.
    #[error("expected \"//\" before the authority")]
    MissingAuthority,
    /// Authority present but the host component is empty.
    #[error("host must not be empty")]
    EmptyHost,
    /// Host contains an unencoded delimiter or stray byte.
    #[error("host contains an unencoded delimiter")]
    HostDelimiter,
    /// Port is missing, non-numeric, or outside 1..=65535.
    #[error("port must be an integer between 1 and 65535")]
    Port,
    /// IPv6 literal is missing its closing bracket.
    #[error("unterminated ip literal")]
    UnclosedIpLiteral,
    /// A percent escape is truncated, non-hex, or decodes to invalid UTF-8.
    #[error("malformed percent escape")]
    Escape,
    /// A path segment between separators is empty.
    #[error("path segments must not be empty")]
    EmptyPathSegment,
}
