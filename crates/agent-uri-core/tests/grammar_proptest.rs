// crates/agent-uri-core/tests/grammar_proptest.rs
// ============================================================================
// Module: Grammar Property Tests
// Description: Property-based round-trip and idempotence coverage.
// Purpose: Verify parse/normalize/serialize laws over generated inputs.
// Dependencies: agent-uri-core, proptest
// ============================================================================

//! ## Overview
//! Generates grammar-conformant URIs and checks the two serialization laws:
//! normalize-then-serialize is a fixed point of reparsing, and normalization
//! is idempotent. Also checks that arbitrary prefixes of valid URIs never
//! panic the parser.

#![allow(clippy::unwrap_used, reason = "Property bodies assert via unwrap for clarity.")]

use agent_uri_core::AgentUri;
use proptest::prelude::*;

// ============================================================================
// SECTION: Strategies
// ============================================================================

/// Alphanumeric characters allowed in DNS labels.
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a DNS label of 1..=12 alphanumeric characters.
fn dns_label() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(ALPHANUMERIC.to_vec()), 1..=12)
        .prop_map(|bytes| bytes.into_iter().map(char::from).collect())
}

/// Generates a host of 1..=4 DNS labels.
fn host() -> impl Strategy<Value = String> {
    prop::collection::vec(dns_label(), 1..=4).prop_map(|labels| labels.join("."))
}

/// Generates an optional transport tag.
fn transport() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec![
        "https".to_string(),
        "wss".to_string(),
        "ws".to_string(),
        "local".to_string(),
        "unix".to_string(),
        "grpc".to_string(),
    ]))
}

/// Generates a path segment containing unreserved and space characters.
fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9 ._~-]{1,10}"
}

/// Generates a query key or value, including characters that need escaping.
fn query_text() -> impl Strategy<Value = String> {
    "[a-z0-9 =&._-]{0,10}"
}

/// Generates a full agent URI string from components.
fn uri_string() -> impl Strategy<Value = String> {
    (
        transport(),
        host(),
        prop::option::of(1..=65_535u32),
        prop::collection::vec(segment(), 0..=4),
        prop::collection::vec((query_text(), query_text()), 0..=3),
        prop::option::of(query_text()),
    )
        .prop_map(|(transport, host, port, segments, pairs, fragment)| {
            let mut out = String::from("agent");
            if let Some(tag) = transport {
                out.push('+');
                out.push_str(&tag);
            }
            out.push_str("://");
            out.push_str(&host);
            if let Some(port) = port {
                out.push(':');
                out.push_str(&port.to_string());
            }
            for segment in &segments {
                out.push('/');
                out.push_str(&percent_encode_lenient(segment));
            }
            for (index, (key, value)) in pairs.iter().enumerate() {
                out.push(if index == 0 { '?' } else { '&' });
                out.push_str(&percent_encode_lenient(key));
                out.push('=');
                out.push_str(&percent_encode_lenient(value));
            }
            if let Some(fragment) = fragment {
                out.push('#');
                out.push_str(&percent_encode_lenient(&fragment));
            }
            out
        })
}

/// Escapes the bytes that would collide with URI structure.
fn percent_encode_lenient(text: &str) -> String {
    let mut out = String::new();
    for byte in text.bytes() {
        match byte {
            b' ' => out.push_str("%20"),
            b'=' => out.push_str("%3D"),
            b'&' => out.push_str("%26"),
            b'#' => out.push_str("%23"),
            b'/' => out.push_str("%2F"),
            b'?' => out.push_str("%3F"),
            other => out.push(char::from(other)),
        }
    }
    out
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// Normalized serialization is a fixed point of parse + normalize.
    #[test]
    fn parse_round_trip_is_stable(input in uri_string()) {
        let first = AgentUri::parse(&input).unwrap().normalize();
        let rendered = first.to_string();
        let second = AgentUri::parse(&rendered).unwrap().normalize();
        prop_assert_eq!(&second, &first);
        prop_assert_eq!(second.to_string(), rendered);
    }

    /// Normalization is idempotent.
    #[test]
    fn normalize_is_idempotent(input in uri_string()) {
        let normalized = AgentUri::parse(&input).unwrap().normalize();
        prop_assert_eq!(normalized.normalize(), normalized);
    }

    /// Query pair order survives the round trip.
    #[test]
    fn query_order_is_preserved(input in uri_string()) {
        let uri = AgentUri::parse(&input).unwrap();
        let keys: Vec<String> =
            uri.query().iter().map(|(key, _)| key.to_string()).collect();
        let reparsed = AgentUri::parse(&uri.normalize().to_string()).unwrap();
        let round: Vec<String> =
            reparsed.query().iter().map(|(key, _)| key.to_string()).collect();
        prop_assert_eq!(round, keys);
    }

    /// Truncating a valid URI never panics the parser.
    #[test]
    fn truncated_input_never_panics(input in uri_string(), cut in 0usize..64) {
        let cut = cut.min(input.len());
        if input.is_char_boundary(cut) {
            let _ = AgentUri::parse(&input[..cut]);
        }
    }
}
