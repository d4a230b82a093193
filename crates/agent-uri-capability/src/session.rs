// crates/agent-uri-capability/src/session.rs
// ============================================================================
// Module: Session Store
// Description: Pluggable per-session context storage with serialization.
// Purpose: Carry handler context across calls and serialize same-session work.
// Dependencies: async-trait, serde_json, tokio
// ============================================================================

//! ## Overview
//! A session is a correlation token letting a capability keep state across
//! consecutive calls. The store hands out leases: a lease holds the
//! per-session lock, so two calls with the same session id never run their
//! handlers concurrently, while calls with different ids proceed in
//! parallel. The in-memory store is LRU-bounded; only the map itself is
//! locked for insert and evict, never for the duration of a handler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Exclusive access to one session for the duration of a handler call.
///
/// # Invariants
/// - While a lease is alive, no other lease for the same id exists.
pub struct SessionLease {
    /// Context saved by the previous call in this session.
    pub context: Option<Value>,
    /// Held per-session lock.
    _guard: OwnedMutexGuard<()>,
}

/// Pluggable session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Acquires the session lock and returns the stored context.
    ///
    /// Creates the session when absent. Blocks while another lease for the
    /// same id is alive.
    async fn lease(&self, session_id: &str) -> SessionLease;

    /// Stores context under the session id.
    async fn save(&self, session_id: &str, context: Value);

    /// Removes one session.
    async fn remove(&self, session_id: &str);

    /// Removes every session.
    async fn clear(&self);
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// One session slot.
struct Slot {
    /// Per-session lock serializing handler invocations.
    lock: Arc<Mutex<()>>,
    /// Stored context.
    context: Option<Value>,
    /// Monotonic recency stamp for LRU eviction.
    last_access: u64,
}

/// Map state behind the store-level lock.
#[derive(Default)]
struct StoreState {
    /// Slots keyed by session id.
    slots: HashMap<String, Slot>,
    /// Monotonic counter driving recency stamps.
    ticks: u64,
}

/// Bounded in-memory session store with LRU eviction.
///
/// # Invariants
/// - Holds at most `max_sessions` sessions; eviction skips leased sessions.
pub struct MemorySessionStore {
    /// Slot map behind the store-level lock.
    state: Mutex<StoreState>,
    /// Maximum number of retained sessions.
    max_sessions: usize,
}

impl MemorySessionStore {
    /// Creates a store bounded to `max_sessions`.
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Returns the number of live sessions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.slots.len()
    }

    /// Returns true when no sessions are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.slots.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn lease(&self, session_id: &str) -> SessionLease {
        let lock = {
            let mut state = self.state.lock().await;
            state.ticks += 1;
            let ticks = state.ticks;
            if !state.slots.contains_key(session_id) && state.slots.len() >= self.max_sessions {
                // Evict the least recently used unleased session.
                let victim = state
                    .slots
                    .iter()
                    .filter(|(_, slot)| slot.lock.try_lock().is_ok())
                    .min_by_key(|(_, slot)| slot.last_access)
                    .map(|(id, _)| id.clone());
                if let Some(victim) = victim {
                    state.slots.remove(&victim);
                }
            }
            let slot = state.slots.entry(session_id.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(Mutex::new(())),
                context: None,
                last_access: 0,
            });
            slot.last_access = ticks;
            Arc::clone(&slot.lock)
        };

        // Acquire the per-session lock outside the store lock, then read the
        // context the previous holder may have saved.
        let guard = lock.lock_owned().await;
        let context = {
            let state = self.state.lock().await;
            state.slots.get(session_id).and_then(|slot| slot.context.clone())
        };
        SessionLease {
            context,
            _guard: guard,
        }
    }

    async fn save(&self, session_id: &str, context: Value) {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.slots.get_mut(session_id) {
            slot.context = Some(context);
        }
    }

    async fn remove(&self, session_id: &str) {
        self.state.lock().await.slots.remove(session_id);
    }

    async fn clear(&self) {
        self.state.lock().await.slots.clear();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
