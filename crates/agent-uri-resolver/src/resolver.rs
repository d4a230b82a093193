// crates/agent-uri-resolver/src/resolver.rs
// ============================================================================
// Module: Agent Resolver
// Description: Ordered well-known resolution with HTTP-compliant caching.
// Purpose: Map an agent URI to an endpoint and, when available, a descriptor.
// Dependencies: agent-uri-core, agent-uri-descriptor, serde, tokio, thiserror
// ============================================================================

//! ## Overview
//! Resolution walks a fixed strategy ladder and halts on the first success:
//!
//! 1. explicit transport tag: synthesize the endpoint directly
//! 2. subdomain heuristic: `https://<host>/.well-known/agent.json`
//! 3. registry: `https://<host>/.well-known/agents.json` + name lookup
//! 4. single agent: `https://<host>/.well-known/agent.json`
//! 5. path-based: `https://<host>/<first-segment>/agent.json`
//! 6. explicit transport with no descriptor: direct fallback
//!
//! Every fetch goes through the cache: fresh entries are served without a
//! network call, stale entries revalidate with `If-None-Match` /
//! `If-Modified-Since`, and a 304 refreshes the expiry without rewriting the
//! body. Concurrent revalidation probes for one URL are collapsed into a
//! single network call.
//! Security posture: descriptor bytes and registry documents are untrusted;
//! a cache entry that stops parsing is evicted and refetched once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use agent_uri_core::AgentUri;
use agent_uri_core::Clock;
use agent_uri_core::ErrorKind;
use agent_uri_core::ProblemDetail;
use agent_uri_core::SystemClock;
use agent_uri_descriptor::AgentDescriptor;
use agent_uri_descriptor::DescriptorError;
use agent_uri_descriptor::ValidationOptions;
use agent_uri_descriptor::parse_descriptor;

use crate::cache::CacheProvider;
use crate::cache::CachedEntry;
use crate::cache::MemoryCache;
use crate::fetch::CacheDirectives;
use crate::fetch::Conditional;
use crate::fetch::DescriptorFetcher;
use crate::fetch::FetchError;
use crate::fetch::FetchOutcome;

// ============================================================================
// SECTION: Result Model
// ============================================================================

/// Strategy that produced a resolution.
///
/// # Invariants
/// - Wire labels are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMethod {
    /// Endpoint synthesized from an explicit transport tag.
    Explicit,
    /// Well-known descriptor found via the subdomain heuristic.
    SubdomainWellKnown,
    /// Descriptor located through the agents.json registry.
    MultiAgentRegistry,
    /// Well-known descriptor at the host root.
    SingleAgentWellKnown,
    /// Descriptor found under the first path segment.
    PathBased,
    /// Explicit transport with no descriptor available.
    DirectFallback,
}

/// Cache provenance attached to a resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Entity tag of the served document.
    pub etag: Option<String>,
    /// Last-Modified of the served document.
    pub last_modified: Option<String>,
    /// Epoch seconds when the cached document goes stale.
    pub expires_at: Option<u64>,
    /// True when the body was served from cache (including after a 304).
    pub from_cache: bool,
}

/// Outcome of a successful resolution.
///
/// # Invariants
/// - `endpoint` is a fully qualified wire address.
/// - `descriptor` is `None` only for `explicit` and `direct-fallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Descriptor, when one was located.
    pub descriptor: Option<AgentDescriptor>,
    /// Fully qualified endpoint address.
    pub endpoint: String,
    /// Transport tag selecting a binding.
    pub transport_tag: String,
    /// Strategy that produced this result.
    pub resolution_method: ResolutionMethod,
    /// Cache provenance of the descriptor document.
    pub cache_metadata: CacheMetadata,
}

/// Caller-supplied resolution switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Force a descriptor lookup even for explicit-transport URIs.
    pub want_descriptor: bool,
    /// Caller asserts the host is an agent host (enables the subdomain
    /// strategy regardless of label count).
    pub agent_host: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Resolution failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// No strategy produced a descriptor and no explicit transport was given.
    #[error("no resolution strategy produced a descriptor for {uri}")]
    NotFound {
        /// The URI that failed to resolve.
        uri: String,
    },
    /// Deadline exceeded.
    #[error("resolution timed out")]
    Timeout,
    /// Transport-level failure on every applicable strategy.
    #[error("network failure during resolution: {0}")]
    Network(String),
    /// A descriptor was fetched but failed validation.
    #[error("resolved descriptor is invalid: {0}")]
    Validation(#[source] DescriptorError),
    /// The URI names a transport with no known scheme mapping.
    #[error("unknown transport tag: {tag}")]
    UnknownTransport {
        /// The unrecognized tag.
        tag: String,
    },
    /// Uncategorized implementation fault.
    #[error("internal resolver fault: {0}")]
    Internal(String),
}

impl ResolverError {
    /// Returns the problem envelope for this failure.
    #[must_use]
    pub fn problem(&self) -> ProblemDetail {
        let kind = match self {
            Self::NotFound {
                ..
            } => ErrorKind::Resolution,
            Self::Timeout => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Network,
            Self::Validation(_) => ErrorKind::Validation,
            Self::UnknownTransport {
                ..
            } => ErrorKind::UnknownTransport,
            Self::Internal(_) => ErrorKind::Internal,
        };
        ProblemDetail::from_kind(kind).with_detail(self.to_string())
    }
}

// ============================================================================
// SECTION: Registry Document
// ============================================================================

/// The `agents.json` registry document.
///
/// # Invariants
/// - Unknown top-level members round-trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentsIndex {
    /// Mapping from agent name to absolute descriptor URL.
    #[serde(default)]
    pub agents: BTreeMap<String, String>,
    /// Unknown members, preserved but ignored.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Resolver behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResolverConfig {
    /// Default cache lifetime when the server sends no cache headers.
    pub cache_ttl_default_s: u64,
    /// Overall deadline for one resolution.
    pub timeout_ms: u64,
    /// Descriptor validation options.
    pub validation: ValidationOptions,
    /// Use `http://` for well-known fetches. Local development only.
    pub insecure_http: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_default_s: 300,
            timeout_ms: 10_000,
            validation: ValidationOptions::default(),
            insecure_http: false,
        }
    }
}

// ============================================================================
// SECTION: Transport Scheme Table
// ============================================================================

/// Maps a transport tag to its URL scheme.
#[must_use]
pub fn scheme_for_tag(tag: &str) -> Option<&'static str> {
    match tag {
        "https" => Some("https"),
        "wss" => Some("wss"),
        "ws" => Some("ws"),
        "http" => Some("http"),
        "local" => Some("local"),
        "unix" => Some("unix"),
        "matrix" => Some("matrix"),
        "grpc" => Some("grpc"),
        _ => None,
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Internal success record from the strategy ladder.
struct Found {
    /// Located descriptor.
    descriptor: AgentDescriptor,
    /// Strategy label.
    method: ResolutionMethod,
    /// Cache provenance.
    meta: CacheMetadata,
}

/// Resolver mapping agent URIs to endpoints and descriptors.
///
/// # Invariants
/// - The cache is shared across calls and internally synchronized.
/// - Revalidation probes are de-duplicated per URL.
pub struct AgentResolver {
    /// Network access.
    fetcher: Arc<dyn DescriptorFetcher>,
    /// Shared response cache.
    cache: Arc<dyn CacheProvider>,
    /// Behavior switches.
    config: ResolverConfig,
    /// Injectable time source.
    clock: Arc<dyn Clock>,
    /// Per-URL probe gates for single-flight revalidation.
    probes: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl AgentResolver {
    /// Creates a resolver over the given fetcher, cache, and clock.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn DescriptorFetcher>,
        cache: Arc<dyn CacheProvider>,
        config: ResolverConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            config,
            clock,
            probes: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a resolver with an in-memory cache and the system clock.
    #[must_use]
    pub fn with_cache_size(
        fetcher: Arc<dyn DescriptorFetcher>,
        config: ResolverConfig,
        cache_max_entries: usize,
    ) -> Self {
        Self::new(
            fetcher,
            Arc::new(MemoryCache::new(cache_max_entries)),
            config,
            Arc::new(SystemClock),
        )
    }

    /// Clears every cached document.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Clears the cached document for one URL.
    pub async fn clear_cache_url(&self, url: &str) {
        self.cache.remove(url).await;
    }

    /// Resolves a URI with default options.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError`] when no strategy succeeds.
    pub async fn resolve(&self, uri: &AgentUri) -> Result<ResolutionResult, ResolverError> {
        self.resolve_with(uri, ResolveRequest::default()).await
    }

    /// Resolves a URI with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError`] when no strategy succeeds or the deadline
    /// fires.
    pub async fn resolve_with(
        &self,
        uri: &AgentUri,
        request: ResolveRequest,
    ) -> Result<ResolutionResult, ResolverError> {
        let deadline = Duration::from_millis(self.config.timeout_ms);
        tokio::time::timeout(deadline, self.resolve_inner(uri, request))
            .await
            .map_err(|_| ResolverError::Timeout)?
    }

    async fn resolve_inner(
        &self,
        uri: &AgentUri,
        request: ResolveRequest,
    ) -> Result<ResolutionResult, ResolverError> {
        let uri = uri.normalize();
        let mut network_errors: Vec<String> = Vec::new();

        if let Some(tag) = uri.transport() {
            let tag = tag.to_string();
            if !request.want_descriptor {
                let endpoint = self.explicit_endpoint(&uri, &tag, None)?;
                return Ok(ResolutionResult {
                    descriptor: None,
                    endpoint,
                    transport_tag: tag,
                    resolution_method: ResolutionMethod::Explicit,
                    cache_metadata: CacheMetadata::default(),
                });
            }
            return match self.ladder(&uri, request, &mut network_errors).await? {
                Some(found) => {
                    let endpoint =
                        self.explicit_endpoint(&uri, &tag, Some(&found.descriptor))?;
                    Ok(ResolutionResult {
                        descriptor: Some(found.descriptor),
                        endpoint,
                        transport_tag: tag,
                        resolution_method: found.method,
                        cache_metadata: found.meta,
                    })
                }
                None => {
                    let endpoint = self.explicit_endpoint(&uri, &tag, None)?;
                    Ok(ResolutionResult {
                        descriptor: None,
                        endpoint,
                        transport_tag: tag,
                        resolution_method: ResolutionMethod::DirectFallback,
                        cache_metadata: CacheMetadata::default(),
                    })
                }
            };
        }

        match self.ladder(&uri, request, &mut network_errors).await? {
            Some(found) => {
                let (endpoint, transport_tag) = endpoint_from_descriptor(&uri, &found.descriptor);
                Ok(ResolutionResult {
                    descriptor: Some(found.descriptor),
                    endpoint,
                    transport_tag,
                    resolution_method: found.method,
                    cache_metadata: found.meta,
                })
            }
            None => match network_errors.into_iter().next() {
                Some(first) => Err(ResolverError::Network(first)),
                None => Err(ResolverError::NotFound {
                    uri: uri.to_string(),
                }),
            },
        }
    }

    /// Walks strategies 2..=5 in order, halting on the first success.
    async fn ladder(
        &self,
        uri: &AgentUri,
        request: ResolveRequest,
        network_errors: &mut Vec<String>,
    ) -> Result<Option<Found>, ResolverError> {
        // Opaque DID hosts have no HTTPS well-known surface to probe.
        if uri.is_did_host() {
            return Ok(None);
        }
        let authority = web_authority(uri);
        let scheme = if self.config.insecure_http { "http" } else { "https" };
        let well_known = format!("{scheme}://{authority}/.well-known/agent.json");

        // Strategy 2: subdomain heuristic.
        let subdomain_eligible = request.agent_host || uri.host().split('.').count() >= 3;
        let mut well_known_missed = false;
        if subdomain_eligible {
            if let Some((descriptor, meta)) =
                self.fetch_descriptor_doc(&well_known, network_errors).await?
            {
                return Ok(Some(Found {
                    descriptor,
                    method: ResolutionMethod::SubdomainWellKnown,
                    meta,
                }));
            }
            well_known_missed = true;
        }

        // Strategy 3: multi-agent registry.
        let registry_url = format!("{scheme}://{authority}/.well-known/agents.json");
        if let Some((body, _)) = self.cached_fetch(&registry_url, network_errors).await?
            && let Ok(index) = serde_json::from_slice::<AgentsIndex>(&body)
        {
            let first_segment = uri.path_segments().first().map(String::as_str);
            let target = first_segment
                .and_then(|segment| index.agents.get(segment))
                .or_else(|| index.agents.get(""));
            if let Some(target) = target
                && let Some((descriptor, meta)) =
                    self.fetch_descriptor_doc(target, network_errors).await?
            {
                return Ok(Some(Found {
                    descriptor,
                    method: ResolutionMethod::MultiAgentRegistry,
                    meta,
                }));
            }
        }

        // Strategy 4: single-agent well-known (skip the refetch when the
        // subdomain probe already missed the same URL).
        if !well_known_missed
            && let Some((descriptor, meta)) =
                self.fetch_descriptor_doc(&well_known, network_errors).await?
        {
            return Ok(Some(Found {
                descriptor,
                method: ResolutionMethod::SingleAgentWellKnown,
                meta,
            }));
        }

        // Strategy 5: path-based descriptor.
        if let Some(first_segment) = uri.path_segments().first() {
            let path_url = format!("{scheme}://{authority}/{first_segment}/agent.json");
            if let Some((descriptor, meta)) =
                self.fetch_descriptor_doc(&path_url, network_errors).await?
            {
                return Ok(Some(Found {
                    descriptor,
                    method: ResolutionMethod::PathBased,
                    meta,
                }));
            }
        }

        Ok(None)
    }

    /// Fetches and parses a descriptor document through the cache.
    ///
    /// A cache entry that stops parsing is treated as poisoned: it is
    /// evicted and the URL is fetched once more from the network.
    async fn fetch_descriptor_doc(
        &self,
        url: &str,
        network_errors: &mut Vec<String>,
    ) -> Result<Option<(AgentDescriptor, CacheMetadata)>, ResolverError> {
        let Some((body, meta)) = self.cached_fetch(url, network_errors).await? else {
            return Ok(None);
        };
        match parse_descriptor(&body, self.config.validation) {
            Ok(descriptor) => Ok(Some((descriptor, meta))),
            Err(_) if meta.from_cache => {
                self.cache.remove(url).await;
                let Some((body, meta)) = self.cached_fetch(url, network_errors).await? else {
                    return Ok(None);
                };
                match parse_descriptor(&body, self.config.validation) {
                    Ok(descriptor) => Ok(Some((descriptor, meta))),
                    Err(err) => Err(ResolverError::Validation(err)),
                }
            }
            Err(err) => Err(ResolverError::Validation(err)),
        }
    }

    /// Serves a URL from cache, revalidating or fetching as needed.
    async fn cached_fetch(
        &self,
        url: &str,
        network_errors: &mut Vec<String>,
    ) -> Result<Option<(Vec<u8>, CacheMetadata)>, ResolverError> {
        let now = self.clock.now_epoch_secs();
        if let Some(entry) = self.cache.get(url).await
            && entry.is_fresh(now)
        {
            return Ok(Some((entry.body.clone(), metadata(&entry, true))));
        }

        // Single probe per URL: concurrent callers wait, then re-check the
        // cache, which the winning probe has refreshed.
        let gate = self.probe_gate(url).await;
        let _guard = gate.lock().await;
        let now = self.clock.now_epoch_secs();
        let cached = self.cache.get(url).await;
        if let Some(entry) = &cached
            && entry.is_fresh(now)
        {
            return Ok(Some((entry.body.clone(), metadata(entry, true))));
        }

        let conditional = cached.as_ref().map(|entry| Conditional {
            etag: entry.etag.clone(),
            last_modified: entry.last_modified.clone(),
        });
        let outcome = match self.fetcher.fetch(url, conditional.as_ref()).await {
            Ok(outcome) => outcome,
            Err(FetchError::Timeout) => return Err(ResolverError::Timeout),
            Err(err) => {
                network_errors.push(err.to_string());
                return Ok(None);
            }
        };

        match outcome {
            FetchOutcome::NotModified {
                cache,
            } => {
                let Some(mut entry) = cached else {
                    // A 304 without a cached body cannot be served.
                    network_errors.push("conditional response without cached body".to_string());
                    return Ok(None);
                };
                entry.expires_at_epoch = self.expiry(now, cache);
                self.cache.put(url, entry.clone()).await;
                Ok(Some((entry.body.clone(), metadata(&entry, true))))
            }
            FetchOutcome::Document(document) => {
                let entry = CachedEntry {
                    body: document.body,
                    etag: document.etag,
                    last_modified: document.last_modified,
                    stored_at_epoch: now,
                    expires_at_epoch: self.expiry(now, document.cache),
                };
                if !document.cache.no_store {
                    self.cache.put(url, entry.clone()).await;
                }
                Ok(Some((entry.body.clone(), metadata(&entry, false))))
            }
            FetchOutcome::Status(_) => {
                if cached.is_some() {
                    self.cache.remove(url).await;
                }
                Ok(None)
            }
        }
    }

    /// Computes the expiry epoch for a response stored at `now`.
    fn expiry(&self, now: u64, cache: CacheDirectives) -> Option<u64> {
        if cache.no_cache {
            return Some(now);
        }
        Some(now + cache.max_age.unwrap_or(self.config.cache_ttl_default_s))
    }

    /// Returns the single-flight gate for a URL.
    async fn probe_gate(&self, url: &str) -> Arc<Mutex<()>> {
        let mut probes = self.probes.lock().await;
        if let Some(gate) = probes.get(url).and_then(Weak::upgrade) {
            return gate;
        }
        let gate = Arc::new(Mutex::new(()));
        probes.insert(url.to_string(), Arc::downgrade(&gate));
        probes.retain(|_, weak| weak.strong_count() > 0);
        gate
    }

    /// Synthesizes the endpoint for an explicit transport tag.
    fn explicit_endpoint(
        &self,
        uri: &AgentUri,
        tag: &str,
        descriptor: Option<&AgentDescriptor>,
    ) -> Result<String, ResolverError> {
        if let Some(scheme) = scheme_for_tag(tag) {
            let path = join_path(uri);
            return Ok(format!("{scheme}://{}{path}", uri.authority()));
        }
        if let Some(endpoint) = descriptor.and_then(|descriptor| descriptor.endpoints.get(tag)) {
            return Ok(endpoint.clone());
        }
        Err(ResolverError::UnknownTransport {
            tag: tag.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the cache metadata view of an entry.
fn metadata(entry: &CachedEntry, from_cache: bool) -> CacheMetadata {
    CacheMetadata {
        etag: entry.etag.clone(),
        last_modified: entry.last_modified.clone(),
        expires_at: entry.expires_at_epoch,
        from_cache,
    }
}

/// Returns `host[:port]` for well-known URL construction.
fn web_authority(uri: &AgentUri) -> String {
    match uri.port() {
        Some(port) => format!("{}:{port}", uri.host()),
        None => uri.host().to_string(),
    }
}

/// Returns the URI path with a leading slash, or an empty string.
fn join_path(uri: &AgentUri) -> String {
    if uri.path_segments().is_empty() {
        String::new()
    } else {
        format!("/{}", uri.path())
    }
}

/// Chooses the endpoint and transport tag advertised by a descriptor.
fn endpoint_from_descriptor(uri: &AgentUri, descriptor: &AgentDescriptor) -> (String, String) {
    if let Some(endpoint) = descriptor.endpoints.get("https") {
        return (endpoint.clone(), "https".to_string());
    }
    if let Some((tag, endpoint)) = descriptor.endpoints.iter().next() {
        return (endpoint.clone(), tag.clone());
    }
    if let Some(url) = &descriptor.url {
        let tag = url::Url::parse(url)
            .map(|parsed| parsed.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());
        return (url.clone(), tag);
    }
    let path = join_path(uri);
    (format!("https://{}{path}", web_authority(uri)), "https".to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use agent_uri_core::AgentUri;
    use agent_uri_descriptor::AgentDescriptor;
    use agent_uri_descriptor::Capability;

    use super::endpoint_from_descriptor;
    use super::scheme_for_tag;
    use super::web_authority;

    #[test]
    fn scheme_table_is_identity_for_known_tags() {
        for tag in ["https", "wss", "ws", "http", "local", "unix", "matrix", "grpc"] {
            assert_eq!(scheme_for_tag(tag), Some(tag));
        }
        assert_eq!(scheme_for_tag("carrier-pigeon"), None);
    }

    #[test]
    fn authority_includes_port_when_present() {
        let uri = AgentUri::parse("agent://acme.ai:8443/x").unwrap();
        assert_eq!(web_authority(&uri), "acme.ai:8443");
    }

    #[test]
    fn descriptor_endpoint_prefers_https_entry() {
        let uri = AgentUri::parse("agent://acme.ai/planner").unwrap();
        let mut descriptor =
            AgentDescriptor::new("planner", "1", vec![Capability::named("plan")]);
        descriptor
            .endpoints
            .insert("wss".to_string(), "wss://acme.ai/planner".to_string());
        descriptor
            .endpoints
            .insert("https".to_string(), "https://acme.ai/planner".to_string());
        let (endpoint, tag) = endpoint_from_descriptor(&uri, &descriptor);
        assert_eq!(endpoint, "https://acme.ai/planner");
        assert_eq!(tag, "https");
    }

    #[test]
    fn descriptor_endpoint_falls_back_to_synthesized_https() {
        let uri = AgentUri::parse("agent://acme.ai/planner/gen-iti").unwrap();
        let descriptor = AgentDescriptor::new("planner", "1", vec![Capability::named("plan")]);
        let (endpoint, tag) = endpoint_from_descriptor(&uri, &descriptor);
        assert_eq!(endpoint, "https://acme.ai/planner/gen-iti");
        assert_eq!(tag, "https");
    }
}
