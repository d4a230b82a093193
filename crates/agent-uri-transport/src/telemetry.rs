// crates/agent-uri-transport/src/telemetry.rs
// ============================================================================
// Module: Transport Telemetry
// Description: Observability hooks for binding operations.
// Purpose: Provide metric events without a hard backend dependency.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Bindings emit one [`TransportMetricEvent`] per invoke/stream operation to
//! a configured [`TelemetrySink`]. The interface is intentionally
//! dependency-light so hosts can plug in Prometheus or OpenTelemetry without
//! redesign; the default sink drops events.
//! Security posture: events carry labels and sizes only, never payloads or
//! credentials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Binding operation classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TransportOperation {
    /// Single request/response invocation.
    Invoke,
    /// Streaming invocation.
    Stream,
}

impl TransportOperation {
    /// Returns a stable label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invoke => "invoke",
            Self::Stream => "stream",
        }
    }
}

/// Operation outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TransportOutcome {
    /// Operation succeeded.
    Ok,
    /// Operation failed.
    Error,
    /// Operation hit its deadline.
    Timeout,
}

impl TransportOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// One binding operation measurement.
#[derive(Debug, Clone)]
pub struct TransportMetricEvent {
    /// Protocol tag of the binding.
    pub tag: String,
    /// Operation performed.
    pub operation: TransportOperation,
    /// Observed outcome.
    pub outcome: TransportOutcome,
    /// Wall time spent in the operation.
    pub latency: Duration,
    /// HTTP-compatible status when available.
    pub status: Option<u16>,
}

/// Receiver for transport metric events.
pub trait TelemetrySink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &TransportMetricEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: &TransportMetricEvent) {}
}
