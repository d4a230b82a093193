// crates/agent-uri-resolver/src/lib.rs
// ============================================================================
// Module: Agent Resolver Library
// Description: Ordered resolution and HTTP caching for agent:// URIs.
// Purpose: Map agent URIs to endpoints and descriptors with typed failures.
// Dependencies: agent-uri-core, agent-uri-descriptor, reqwest, tokio
// ============================================================================

//! ## Overview
//! This crate turns an [`agent_uri_core::AgentUri`] into a concrete endpoint
//! plus, when discoverable, a validated descriptor. It owns the well-known
//! strategy ladder, the cache provider contract with its bounded in-memory
//! implementation, and the conditional-request machinery.
//! Invariants:
//! - Lower-numbered strategies win when several would succeed.
//! - A fresh cache entry is served without a network call; a stale entry
//!   revalidates; a 304 never returns stale descriptor bytes.
//!
//! Security posture: all fetched documents are untrusted input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod fetch;
pub mod resolver;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CacheProvider;
pub use cache::CachedEntry;
pub use cache::MemoryCache;
pub use fetch::CacheDirectives;
pub use fetch::Conditional;
pub use fetch::DescriptorFetcher;
pub use fetch::FetchError;
pub use fetch::FetchOutcome;
pub use fetch::FetchedDocument;
pub use fetch::HttpFetcher;
pub use fetch::HttpFetcherConfig;
pub use resolver::AgentResolver;
pub use resolver::AgentsIndex;
pub use resolver::CacheMetadata;
pub use resolver::ResolutionMethod;
pub use resolver::ResolutionResult;
pub use resolver::ResolveRequest;
pub use resolver::ResolverConfig;
pub use resolver::ResolverError;
pub use resolver::scheme_for_tag;
