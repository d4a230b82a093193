// crates/agent-uri-resolver/tests/common/mod.rs
// ============================================================================
// Module: Resolver Test Fixtures
// Description: Scripted fetcher and descriptor builders for resolver tests.
// Purpose: Drive the strategy ladder and cache without a real network.
// Dependencies: agent-uri-resolver, agent-uri-descriptor, tokio
// ============================================================================

//! ## Overview
//! [`ScriptedFetcher`] answers fetches from a routing table and records every
//! call (with whether it was conditional), so tests can assert exactly which
//! strategy URLs were probed and how often the network was touched.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    dead_code,
    reason = "Test-only fixtures; not every helper is used by every suite."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use agent_uri_resolver::CacheDirectives;
use agent_uri_resolver::Conditional;
use agent_uri_resolver::DescriptorFetcher;
use agent_uri_resolver::FetchError;
use agent_uri_resolver::FetchOutcome;
use agent_uri_resolver::FetchedDocument;
use async_trait::async_trait;
use serde_json::json;

/// One scripted route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Body served on an unconditional hit.
    pub body: Vec<u8>,
    /// Entity tag attached to the response.
    pub etag: Option<String>,
    /// Last-Modified attached to the response.
    pub last_modified: Option<String>,
    /// Cache directives attached to the response.
    pub cache: CacheDirectives,
    /// Serve 304 when the conditional validators match.
    pub revalidates: bool,
}

impl Route {
    /// A plain JSON document route with no caching headers.
    pub fn json(value: &serde_json::Value) -> Self {
        Self {
            body: serde_json::to_vec(value).unwrap(),
            etag: None,
            last_modified: None,
            cache: CacheDirectives::default(),
            revalidates: false,
        }
    }

    /// Adds an ETag and enables 304 revalidation.
    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self.revalidates = true;
        self
    }

    /// Adds a max-age directive.
    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.cache.max_age = Some(seconds);
        self
    }

    /// Marks the response `no-cache`.
    pub fn no_cache(mut self) -> Self {
        self.cache.no_cache = true;
        self
    }
}

/// Recorded fetch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Requested URL.
    pub url: String,
    /// True when validators were attached.
    pub conditional: bool,
}

/// Table-driven fetcher with call recording.
#[derive(Default)]
pub struct ScriptedFetcher {
    /// Routing table keyed by absolute URL.
    routes: Mutex<HashMap<String, Route>>,
    /// Every call observed, in order.
    calls: Mutex<Vec<Call>>,
    /// Artificial delay before answering, to widen race windows.
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    /// Creates an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher that sleeps before each response.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Installs a route.
    pub fn route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    /// Removes a route, turning further fetches into 404s.
    pub fn unroute(&self, url: &str) {
        self.routes.lock().unwrap().remove(url);
    }

    /// Returns the recorded calls.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Returns how many network calls were made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DescriptorFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        url: &str,
        conditional: Option<&Conditional>,
    ) -> Result<FetchOutcome, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            conditional: conditional.is_some(),
        });
        let Some(route) = self.routes.lock().unwrap().get(url).cloned() else {
            return Ok(FetchOutcome::Status(404));
        };
        if route.revalidates
            && let Some(conditional) = conditional
            && conditional.etag == route.etag
        {
            return Ok(FetchOutcome::NotModified {
                cache: route.cache,
            });
        }
        Ok(FetchOutcome::Document(FetchedDocument {
            status: 200,
            body: route.body,
            etag: route.etag,
            last_modified: route.last_modified,
            cache: route.cache,
        }))
    }
}

/// A minimal valid descriptor document advertising one capability.
pub fn descriptor_doc(name: &str, capability: &str) -> serde_json::Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "capabilities": [{"name": capability}],
    })
}

/// Shares a fetcher as the trait object the resolver expects.
pub fn shared(fetcher: ScriptedFetcher) -> Arc<ScriptedFetcher> {
    Arc::new(fetcher)
}
