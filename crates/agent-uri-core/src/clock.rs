// crates/agent-uri-core/src/clock.rs
// ============================================================================
// Module: Clock Abstraction
// Description: Injectable time source for caches and session stores.
// Purpose: Keep TTL arithmetic deterministic and replayable in tests.
// Dependencies: std
// ============================================================================

//! ## Overview
//! No component reads wall-clock time directly; anything that needs "now"
//! takes a [`Clock`]. Production code uses [`SystemClock`]; tests use
//! [`ManualClock`] and advance it explicitly, which keeps cache-expiry and
//! session-eviction behavior deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

// ============================================================================
// SECTION: Clock Trait
// ============================================================================

/// Injectable source of epoch time.
pub trait Clock: Send + Sync {
    /// Returns the duration since the Unix epoch.
    fn now(&self) -> Duration;

    /// Returns whole seconds since the Unix epoch.
    fn now_epoch_secs(&self) -> u64 {
        self.now().as_secs()
    }
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
    }
}

/// Manually advanced time source for tests.
///
/// # Invariants
/// - Time never moves backwards through `advance`.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current simulated offset from the epoch.
    now: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a manual clock starting at the given epoch offset.
    #[must_use]
    pub fn starting_at(epoch: Duration) -> Self {
        Self {
            now: Mutex::new(epoch),
        }
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or(Duration::ZERO)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
