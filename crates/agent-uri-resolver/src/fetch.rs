// crates/agent-uri-resolver/src/fetch.rs
// ============================================================================
// Module: Descriptor Fetching
// Description: Fetcher contract and reqwest-backed implementation.
// Purpose: Issue plain and conditional GETs with strict response limits.
// Dependencies: async-trait, reqwest, thiserror
// ============================================================================

//! ## Overview
//! The resolver talks to the network only through [`DescriptorFetcher`], so
//! tests and alternative stacks can substitute the HTTP layer. The reqwest
//! implementation sends `If-None-Match`/`If-Modified-Since` when validators
//! are supplied, never follows redirects unless configured to, and caps body
//! reads at the descriptor size limit.
//! Security posture: response bytes are untrusted; reads fail closed on
//! oversized bodies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use agent_uri_descriptor::MAX_DESCRIPTOR_BYTES;

// ============================================================================
// SECTION: Wire Records
// ============================================================================

/// Validators for a conditional request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditional {
    /// Entity tag for `If-None-Match`.
    pub etag: Option<String>,
    /// Verbatim Last-Modified value for `If-Modified-Since`.
    pub last_modified: Option<String>,
}

/// Parsed subset of `Cache-Control` directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    /// `max-age` in seconds, when present.
    pub max_age: Option<u64>,
    /// True when `no-store` is present.
    pub no_store: bool,
    /// True when `no-cache` is present.
    pub no_cache: bool,
}

/// A fetched document with caching metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    /// HTTP status code (2xx).
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Entity tag header, when present.
    pub etag: Option<String>,
    /// Last-Modified header, kept verbatim.
    pub last_modified: Option<String>,
    /// Parsed cache directives.
    pub cache: CacheDirectives,
}

/// Outcome of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Success with a body.
    Document(FetchedDocument),
    /// Conditional request matched; the cached body is still valid.
    NotModified {
        /// Refreshed cache directives from the 304 response.
        cache: CacheDirectives,
    },
    /// Any other status (miss, redirect, server error).
    Status(u16),
}

/// Fetch failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request exceeded its deadline.
    #[error("descriptor fetch timed out")]
    Timeout,
    /// Connection or protocol failure.
    #[error("descriptor fetch failed: {0}")]
    Network(String),
    /// Response body exceeded the size cap.
    #[error("descriptor response exceeds size limit")]
    TooLarge,
}

// ============================================================================
// SECTION: Fetcher Contract
// ============================================================================

/// Network access used by the resolver.
#[async_trait]
pub trait DescriptorFetcher: Send + Sync {
    /// Issues a GET for `url`, conditionally when validators are given.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure; non-success statuses are
    /// data, not errors.
    async fn fetch(
        &self,
        url: &str,
        conditional: Option<&Conditional>,
    ) -> Result<FetchOutcome, FetchError>;
}

// ============================================================================
// SECTION: HTTP Fetcher
// ============================================================================

/// Configuration for the reqwest-backed fetcher.
///
/// # Invariants
/// - `follow_redirects` defaults to false for descriptor fetches.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct HttpFetcherConfig {
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Whether redirects are followed.
    pub follow_redirects: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            follow_redirects: false,
            user_agent: "agent-uri/0.1".to_string(),
        }
    }
}

/// Descriptor fetcher backed by a reqwest client.
pub struct HttpFetcher {
    /// Shared HTTP client.
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] when the client cannot be constructed.
    pub fn new(config: &HttpFetcherConfig) -> Result<Self, FetchError> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(redirect)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Ok(Self {
            client,
        })
    }
}

#[async_trait]
impl DescriptorFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        conditional: Option<&Conditional>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(conditional) = conditional {
            if let Some(etag) = &conditional.etag {
                request = request.header(reqwest::header::IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &conditional.last_modified {
                request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
            }
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let cache = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .map(parse_cache_control)
            .unwrap_or_default();

        if status == 304 {
            return Ok(FetchOutcome::NotModified {
                cache,
            });
        }
        if !(200..300).contains(&status) {
            return Ok(FetchOutcome::Status(status));
        }

        let etag = header_string(&response, reqwest::header::ETAG);
        let last_modified = header_string(&response, reqwest::header::LAST_MODIFIED);
        let body = read_limited(response).await?;
        Ok(FetchOutcome::Document(FetchedDocument {
            status,
            body,
            etag,
            last_modified,
            cache,
        }))
    }
}

/// Extracts a header as an owned string.
fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

/// Reads a response body while enforcing the descriptor size cap.
async fn read_limited(mut response: reqwest::Response) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| FetchError::Network(err.to_string()))?
    {
        if body.len() + chunk.len() > MAX_DESCRIPTOR_BYTES {
            return Err(FetchError::TooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Parses the `Cache-Control` directives the resolver honors.
#[must_use]
pub fn parse_cache_control(header: &str) -> CacheDirectives {
    let mut directives = CacheDirectives::default();
    for token in header.split(',') {
        let token = token.trim();
        if token.eq_ignore_ascii_case("no-store") {
            directives.no_store = true;
        } else if token.eq_ignore_ascii_case("no-cache") {
            directives.no_cache = true;
        } else if let Some(value) = token
            .strip_prefix("max-age=")
            .or_else(|| token.strip_prefix("MAX-AGE="))
        {
            directives.max_age = value.trim().parse::<u64>().ok();
        }
    }
    directives
}

// ============================================================================
// SECTION: Tests
// ============================================================================
