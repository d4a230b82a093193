// crates/agent-uri-core/src/uri.rs
// ============================================================================
// Module: Agent URI Value
// Description: Immutable agent URI value with normalization and builders.
// Purpose: Carry decoded components and re-serialize them deterministically.
// Dependencies: serde, crate::encoding, crate::error, crate::parse, crate::query
// ============================================================================

//! ## Overview
//! [`AgentUri`] is an immutable value produced by the parser or by builder
//! operations; every modifier returns a new value. Components are stored
//! decoded, and [`Display`](std::fmt::Display) re-encodes them, so a parsed
//! URI round-trips to a byte-identical string after [`AgentUri::normalize`].
//! Normalization is idempotent and the host is never empty.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::encoding;
use crate::encoding::Component;
use crate::error::ParseError;
use crate::error::ParseReason;
use crate::parse;
use crate::query::QueryPairs;
use crate::query::QueryValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// The fixed URI scheme literal.
pub const SCHEME: &str = "agent";

/// Default port implied by a transport tag, when one exists.
fn default_port(transport: &str) -> Option<u16> {
    match transport {
        "https" | "wss" => Some(443),
        "http" | "ws" => Some(80),
        _ => None,
    }
}

// ============================================================================
// SECTION: Agent URI
// ============================================================================

/// Decoded component bundle used to assemble an [`AgentUri`].
///
/// # Invariants
/// - `host` is non-empty.
#[derive(Debug, Clone)]
pub(crate) struct UriParts {
    /// Optional transport tag as written (case preserved until normalization).
    pub transport: Option<String>,
    /// Optional decoded userinfo.
    pub userinfo: Option<String>,
    /// Decoded host (DNS name, bracketed IP literal, or `did:` identifier).
    pub host: String,
    /// Optional port in 1..=65535.
    pub port: Option<u16>,
    /// Decoded, non-empty path segments.
    pub path: Vec<String>,
    /// True when the path carried a trailing `/`.
    pub trailing_slash: bool,
    /// Ordered decoded query pairs.
    pub query: QueryPairs,
    /// True when a `?` was present with no pairs.
    pub empty_query: bool,
    /// Decoded fragment; `Some(String::new())` for a bare trailing `#`.
    pub fragment: Option<String>,
}

/// Immutable agent URI value.
///
/// # Invariants
/// - `host` is never empty.
/// - Path segments are non-empty strings; a trailing `/` is tracked
///   separately so pre-normalization inputs survive serialization.
/// - Values never mutate; builder operations return new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentUri {
    /// Optional transport tag.
    transport: Option<String>,
    /// Optional decoded userinfo.
    userinfo: Option<String>,
    /// Decoded host.
    host: String,
    /// Optional port.
    port: Option<u16>,
    /// Decoded path segments.
    path: Vec<String>,
    /// Trailing slash marker.
    trailing_slash: bool,
    /// Ordered decoded query pairs.
    query: QueryPairs,
    /// Empty-query (`?` with nothing after it) marker.
    empty_query: bool,
    /// Decoded fragment.
    fragment: Option<String>,
}

impl AgentUri {
    /// Parses an agent URI from a string.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] with the offset of the first bad byte.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse::parse_uri(input)
    }

    /// Returns true when `input` parses as an agent URI.
    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    pub(crate) fn from_parts(parts: UriParts) -> Self {
        Self {
            transport: parts.transport,
            userinfo: parts.userinfo,
            host: parts.host,
            port: parts.port,
            path: parts.path,
            trailing_slash: parts.trailing_slash,
            query: parts.query,
            empty_query: parts.empty_query,
            fragment: parts.fragment,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Returns the fixed scheme literal.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        SCHEME
    }

    /// Returns the transport tag, if present.
    #[must_use]
    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }

    /// Returns the decoded userinfo, if present.
    #[must_use]
    pub fn userinfo(&self) -> Option<&str> {
        self.userinfo.as_deref()
    }

    /// Returns the decoded host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns true when the host is an opaque `did:` identifier.
    #[must_use]
    pub fn is_did_host(&self) -> bool {
        self.host.len() >= 4 && self.host[..4].eq_ignore_ascii_case("did:")
    }

    /// Returns the port, if present.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the decoded path segments in order.
    #[must_use]
    pub fn path_segments(&self) -> &[String] {
        &self.path
    }

    /// Returns the decoded path joined with `/`, without a leading slash.
    #[must_use]
    pub fn path(&self) -> String {
        self.path.join("/")
    }

    /// Returns true when a trailing `/` was present on the path.
    #[must_use]
    pub const fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// Returns the ordered query pairs.
    #[must_use]
    pub const fn query(&self) -> &QueryPairs {
        &self.query
    }

    /// Returns the decoded fragment, if present (may be empty pre-normalize).
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Returns the encoded authority (`[userinfo@]host[:port]`).
    #[must_use]
    pub fn authority(&self) -> String {
        let mut out = String::new();
        if let Some(userinfo) = &self.userinfo {
            out.push_str(&encoding::encode(Component::Userinfo, userinfo));
            out.push('@');
        }
        out.push_str(&self.encoded_host());
        if let Some(port) = self.port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out
    }

    /// Serializes the URI to its string form.
    #[must_use]
    pub fn to_uri_string(&self) -> String {
        self.to_string()
    }

    // ------------------------------------------------------------------
    // Normalization
    // ------------------------------------------------------------------

    /// Returns the normalized form of this URI.
    ///
    /// Lowercases the transport tag and DNS hosts (for `did:` hosts only the
    /// `did` prefix and method name), removes default ports implied by the
    /// transport, drops an empty query marker and an empty fragment, and
    /// removes a trailing path `/` when no query and no fragment remain.
    /// Normalization is idempotent.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let transport = self.transport.as_ref().map(|tag| tag.to_ascii_lowercase());
        let host = Self::normalize_host(&self.host);
        let port = match (&transport, self.port) {
            (Some(tag), Some(port)) if default_port(tag) == Some(port) => None,
            (_, port) => port,
        };
        let fragment = match &self.fragment {
            Some(text) if text.is_empty() => None,
            other => other.clone(),
        };
        let trailing_slash =
            self.trailing_slash && !(self.query.is_empty() && fragment.is_none());
        Self {
            transport,
            userinfo: self.userinfo.clone(),
            host,
            port,
            path: self.path.clone(),
            trailing_slash,
            query: self.query.clone(),
            empty_query: false,
            fragment,
        }
    }

    /// Lowercases a host according to its shape.
    fn normalize_host(host: &str) -> String {
        if host.starts_with('[') {
            return host.to_ascii_lowercase();
        }
        if host.len() >= 4 && host[..4].eq_ignore_ascii_case("did:") {
            // Lowercase `did` and the method name; method-specific ids are
            // case-sensitive and must survive untouched.
            let mut pieces = host.splitn(3, ':');
            let prefix = pieces.next().unwrap_or_default();
            let method = pieces.next().unwrap_or_default();
            let rest = pieces.next();
            let mut out = prefix.to_ascii_lowercase();
            out.push(':');
            out.push_str(&method.to_ascii_lowercase());
            if let Some(rest) = rest {
                out.push(':');
                out.push_str(rest);
            }
            return out;
        }
        host.to_ascii_lowercase()
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    /// Returns a new value with the given transport tag.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the tag violates the transport grammar.
    pub fn with_transport(&self, transport: Option<&str>) -> Result<Self, ParseError> {
        if let Some(tag) = transport {
            let valid = !tag.is_empty()
                && tag.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-');
            if !valid {
                return Err(ParseError::new(0, ParseReason::TransportTag));
            }
        }
        let mut next = self.clone();
        next.transport = transport.map(str::to_string);
        Ok(next)
    }

    /// Returns a new value with the path replaced by the given segments.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when a segment is empty.
    pub fn with_path<I, S>(&self, segments: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = Vec::new();
        for segment in segments {
            let segment = segment.into();
            if segment.is_empty() {
                return Err(ParseError::new(0, ParseReason::EmptyPathSegment));
            }
            path.push(segment);
        }
        let mut next = self.clone();
        next.path = path;
        next.trailing_slash = false;
        Ok(next)
    }

    /// Returns a new value with one segment appended to the path.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the segment is empty.
    pub fn with_appended_segment(&self, segment: impl Into<String>) -> Result<Self, ParseError> {
        let segment = segment.into();
        if segment.is_empty() {
            return Err(ParseError::new(0, ParseReason::EmptyPathSegment));
        }
        let mut next = self.clone();
        next.path.push(segment);
        next.trailing_slash = false;
        Ok(next)
    }

    /// Returns a new value with a query pair appended.
    #[must_use]
    pub fn with_query_param(&self, key: impl Into<String>, value: QueryValue) -> Self {
        let mut next = self.clone();
        next.query.append(key, value);
        next.empty_query = false;
        next
    }

    /// Returns a new value with the fragment replaced.
    #[must_use]
    pub fn with_fragment(&self, fragment: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.fragment = Some(fragment.into());
        next
    }

    /// Returns a new value without a fragment.
    #[must_use]
    pub fn without_fragment(&self) -> Self {
        let mut next = self.clone();
        next.fragment = None;
        next
    }

    // ------------------------------------------------------------------
    // Serialization helpers
    // ------------------------------------------------------------------

    /// Encodes the host according to its shape.
    fn encoded_host(&self) -> String {
        if self.host.starts_with('[') {
            return self.host.clone();
        }
        if self.is_did_host() {
            // Encode around the method delimiters so colons stay literal.
            return self
                .host
                .split(':')
                .map(|piece| encoding::encode(Component::Host, piece))
                .collect::<Vec<String>>()
                .join(":");
        }
        encoding::encode(Component::Host, &self.host)
    }
}

impl fmt::Display for AgentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SCHEME)?;
        if let Some(transport) = &self.transport {
            write!(f, "+{transport}")?;
        }
        f.write_str("://")?;
        f.write_str(&self.authority())?;
        for segment in &self.path {
            f.write_str("/")?;
            f.write_str(&encoding::encode(Component::PathSegment, segment))?;
        }
        if self.trailing_slash {
            f.write_str("/")?;
        }
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        } else if self.empty_query {
            f.write_str("?")?;
        }
        if let Some(fragment) = &self.fragment {
            f.write_str("#")?;
            f.write_str(&encoding::encode(Component::Fragment, fragment))?;
        }
        Ok(())
    }
}

impl FromStr for AgentUri {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl Serialize for AgentUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AgentUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
