// crates/agent-uri-transport/src/lib.rs
// ============================================================================
// Module: Agent Transport Library
// Description: Transport registry and bindings for the agent:// protocol.
// Purpose: Provide the uniform invoke/stream contract and its bindings.
// Dependencies: agent-uri-core, reqwest, tokio, futures
// ============================================================================

//! ## Overview
//! This crate defines the uniform capability interface every transport
//! binding implements, the process-wide tag registry, and three bindings:
//! request/response over HTTP, full-duplex streaming over framed
//! connections, and in-process dispatch. Failures normalize into the shared
//! problem envelope so a server problem reaches the caller unchanged across
//! any binding.
//! Invariants:
//! - Registration is idempotent by tag; re-registering replaces.
//! - Chunk sequences are finite and restartable exactly once.
//! - Dropping a stream consumer stops the producer within one more chunk.
//!
//! Security posture: response bytes and inbound frames are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod contract;
pub mod duplex;
pub mod error;
pub mod http;
pub mod local;
pub mod registry;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::ApiKeyAuth;
pub use auth::AuthProvider;
pub use auth::BearerTokenAuth;
pub use contract::ChunkSequence;
pub use contract::ChunkStream;
pub use contract::StreamChunk;
pub use contract::Transport;
pub use contract::TransportRequest;
pub use contract::TransportResponse;
pub use duplex::ConnectionPhase;
pub use duplex::DuplexConfig;
pub use duplex::DuplexTransport;
pub use duplex::Frame;
pub use duplex::FrameConnector;
pub use duplex::FrameKind;
pub use duplex::FrameLink;
pub use error::TransportError;
pub use http::HttpTransport;
pub use http::HttpTransportConfig;
pub use local::LocalAgent;
pub use local::LocalCall;
pub use local::LocalReply;
pub use local::LocalTransport;
pub use local::LocalTransportConfig;
pub use registry::TransportFactory;
pub use registry::TransportRegistry;
pub use telemetry::NoopTelemetry;
pub use telemetry::TelemetrySink;
pub use telemetry::TransportMetricEvent;
pub use telemetry::TransportOperation;
pub use telemetry::TransportOutcome;
