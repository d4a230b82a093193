// crates/agent-uri-transport/src/error.rs
// ============================================================================
// Module: Transport Errors
// Description: Failure taxonomy for transport bindings.
// Purpose: Normalize binding failures into the shared problem envelope.
// Dependencies: agent-uri-core, thiserror
// ============================================================================

//! ## Overview
//! Every binding maps its failures into [`TransportError`]. A server-supplied
//! problem document travels inside [`TransportError::Invocation`] untouched,
//! so `type`, `title`, `status`, and `detail` reach the caller exactly as the
//! server sent them; binding specifics enter the problem's extensions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use agent_uri_core::ErrorKind;
use agent_uri_core::ProblemDetail;

// ============================================================================
// SECTION: Transport Error
// ============================================================================

/// Failures surfaced by transport bindings and the registry.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Invocation` carries the server problem verbatim.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No binding registered for the requested tag.
    #[error("no transport binding registered for tag: {tag}")]
    UnknownTransport {
        /// The unrecognized tag.
        tag: String,
    },
    /// The server reported a failure payload.
    #[error("invocation failed: {}", problem.title)]
    Invocation {
        /// Problem details, preserved verbatim when server-supplied.
        problem: ProblemDetail,
    },
    /// Connection or protocol-level failure.
    #[error("transport network failure: {0}")]
    Network(String),
    /// Deadline exceeded.
    #[error("transport operation timed out after {elapsed_ms} ms")]
    Timeout {
        /// Elapsed time when the deadline fired.
        elapsed_ms: u64,
    },
    /// The peer violated the wire protocol.
    #[error("transport protocol violation: {0}")]
    Protocol(String),
    /// The connection is closed; the in-flight operation was not replayed.
    #[error("transport connection closed")]
    Closed,
    /// The request was malformed before any wire activity.
    #[error("invalid transport request: {0}")]
    InvalidRequest(String),
    /// The stream already used its single restart.
    #[error("stream cannot be restarted again")]
    NotRestartable,
    /// Uncategorized implementation fault.
    #[error("internal transport fault: {0}")]
    Internal(String),
}

impl TransportError {
    /// Creates an invocation error from a problem envelope.
    #[must_use]
    pub const fn invocation(problem: ProblemDetail) -> Self {
        Self::Invocation {
            problem,
        }
    }

    /// Returns the problem envelope for this failure.
    ///
    /// Server-supplied problems pass through unchanged; other variants
    /// synthesize one from their error kind.
    #[must_use]
    pub fn problem(&self) -> ProblemDetail {
        match self {
            Self::Invocation {
                problem,
            } => problem.clone(),
            Self::UnknownTransport {
                ..
            } => ProblemDetail::from_kind(ErrorKind::UnknownTransport).with_detail(self.to_string()),
            Self::Network(_) | Self::Closed => {
                ProblemDetail::from_kind(ErrorKind::Network).with_detail(self.to_string())
            }
            Self::Timeout {
                ..
            } => ProblemDetail::from_kind(ErrorKind::Timeout).with_detail(self.to_string()),
            Self::Protocol(_) => {
                ProblemDetail::from_kind(ErrorKind::Upstream).with_detail(self.to_string())
            }
            Self::InvalidRequest(_) => {
                ProblemDetail::from_kind(ErrorKind::InvalidInput).with_detail(self.to_string())
            }
            Self::NotRestartable | Self::Internal(_) => {
                ProblemDetail::from_kind(ErrorKind::Internal).with_detail(self.to_string())
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use agent_uri_core::ErrorKind;
    use agent_uri_core::ProblemDetail;

    use super::TransportError;

    #[test]
    fn server_problem_passes_through_unchanged() {
        let problem = ProblemDetail::from_kind(ErrorKind::RateLimited)
            .with_detail("slow down")
            .with_instance("agent://acme.ai/planner");
        let err = TransportError::invocation(problem.clone());
        assert_eq!(err.problem(), problem);
    }

    #[test]
    fn synthesized_problems_carry_kinds() {
        let err = TransportError::Timeout {
            elapsed_ms: 1_500,
        };
        assert_eq!(err.problem().kind(), Some(ErrorKind::Timeout));
        let err = TransportError::UnknownTransport {
            tag: "x".to_string(),
        };
        assert_eq!(err.problem().kind(), Some(ErrorKind::UnknownTransport));
    }
}
