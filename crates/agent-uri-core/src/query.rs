// crates/agent-uri-core/src/query.rs
// ============================================================================
// Module: Query Multimap
// Description: Insertion-ordered query parameters for agent URIs.
// Purpose: Preserve key order, repeated keys, and the bare/empty distinction.
// Dependencies: serde, crate::encoding
// ============================================================================

//! ## Overview
//! Agent URI queries are ordered multimaps: keys may repeat and their order is
//! significant on round-trip. A key written without `=` is distinguishable
//! from a key written as `key=`, so the three states "absent", "present with
//! no value", and "present with empty value" never collapse into each other.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::encoding;
use crate::encoding::Component;

// ============================================================================
// SECTION: Query Value
// ============================================================================

/// Decoded value attached to a query key.
///
/// # Invariants
/// - `Bare` serializes without `=`; `Value(String::new())` serializes as `key=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryValue {
    /// Key present without `=` (e.g. `?flag`).
    Bare,
    /// Key present with a (possibly empty) decoded value.
    Value(String),
}

impl QueryValue {
    /// Returns the decoded value text, treating a bare key as empty.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bare => "",
            Self::Value(text) => text.as_str(),
        }
    }
}

// ============================================================================
// SECTION: Query Pairs
// ============================================================================

/// Insertion-ordered multimap of decoded query parameters.
///
/// # Invariants
/// - Pair order matches the order keys appeared in the parsed string or the
///   order of builder insertions.
/// - Keys and values are stored decoded; encoding happens on serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPairs {
    /// Ordered `(key, value)` pairs.
    pairs: Vec<(String, QueryValue)>,
}

impl QueryPairs {
    /// Creates an empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pairs: Vec::new(),
        }
    }

    /// Returns true when no pairs are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the number of pairs, counting repeated keys individually.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Appends a key/value pair, preserving existing entries for the key.
    pub fn append(&mut self, key: impl Into<String>, value: QueryValue) {
        self.pairs.push((key.into(), value));
    }

    /// Returns the first value for `key`, if any.
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&QueryValue> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns every value recorded for `key`, in insertion order.
    #[must_use]
    pub fn all(&self, key: &str) -> Vec<&QueryValue> {
        self.pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v).collect()
    }

    /// Iterates pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parses a raw (still encoded) query string into ordered pairs.
    ///
    /// Empty `&`-separated chunks are skipped. `offset` is the byte position
    /// of the query string within the full URI and is used to report escape
    /// errors at their absolute position.
    ///
    /// # Errors
    ///
    /// Returns the absolute byte offset of the first malformed escape.
    pub fn parse(raw: &str, offset: usize) -> Result<Self, usize> {
        let mut pairs = Vec::new();
        let mut chunk_start = 0;
        for chunk in raw.split('&') {
            let absolute = offset + chunk_start;
            chunk_start += chunk.len() + 1;
            if chunk.is_empty() {
                continue;
            }
            match chunk.split_once('=') {
                Some((key, value)) => {
                    let key = encoding::decode(key).map_err(|err| absolute + err.offset)?;
                    let value = encoding::decode(value)
                        .map_err(|err| absolute + key.len() + 1 + err.offset)?;
                    pairs.push((key, QueryValue::Value(value)));
                }
                None => {
                    let key = encoding::decode(chunk).map_err(|err| absolute + err.offset)?;
                    pairs.push((key, QueryValue::Bare));
                }
            }
        }
        Ok(Self {
            pairs,
        })
    }
}

impl fmt::Display for QueryPairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.pairs.iter().enumerate() {
            if index > 0 {
                f.write_str("&")?;
            }
            f.write_str(&encoding::encode(Component::Query, key))?;
            match value {
                QueryValue::Bare => {}
                QueryValue::Value(text) => {
                    f.write_str("=")?;
                    f.write_str(&encoding::encode(Component::Query, text))?;
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a QueryPairs {
    type IntoIter = std::slice::Iter<'a, (String, QueryValue)>;
    type Item = &'a (String, QueryValue);

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
