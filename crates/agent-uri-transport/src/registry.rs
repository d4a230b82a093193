// crates/agent-uri-transport/src/registry.rs
// ============================================================================
// Module: Transport Registry
// Description: Process-wide mapping from protocol tag to binding factory.
// Purpose: Route invocations to bindings with idempotent registration.
// Dependencies: crate::contract, crate::error
// ============================================================================

//! ## Overview
//! The registry maps a transport tag to a constructor for its binding.
//! Registration is idempotent by tag: re-registering replaces the previous
//! entry and drops its cached instance. Lookup constructs the binding once
//! and hands out shared handles; instances are owned by the registry.
//! The process-wide registry is one of exactly two process-scoped singletons
//! in the stack and is resettable through [`TransportRegistry::clear`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::RwLock;

use crate::contract::Transport;
use crate::error::TransportError;

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Constructor producing a binding instance.
pub type TransportFactory =
    Arc<dyn Fn() -> Result<Arc<dyn Transport>, TransportError> + Send + Sync>;

/// Registry slot pairing a factory with its lazily built instance.
struct Entry {
    /// Binding constructor.
    factory: TransportFactory,
    /// Instance built on first lookup.
    instance: Mutex<Option<Arc<dyn Transport>>>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Mapping from protocol tag to transport binding.
///
/// # Invariants
/// - Tags are unique; re-registration replaces the previous entry.
/// - Lookups share one instance per tag until the entry is replaced.
#[derive(Default)]
pub struct TransportRegistry {
    /// Entries keyed by protocol tag.
    entries: RwLock<BTreeMap<String, Arc<Entry>>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<TransportRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Registers a factory for a tag, replacing any previous entry.
    pub fn register(&self, tag: impl Into<String>, factory: TransportFactory) {
        let entry = Arc::new(Entry {
            factory,
            instance: Mutex::new(None),
        });
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(tag.into(), entry);
        }
    }

    /// Registers an already constructed binding for a tag.
    pub fn register_instance(&self, tag: impl Into<String>, transport: Arc<dyn Transport>) {
        let factory: TransportFactory = {
            let transport = Arc::clone(&transport);
            Arc::new(move || Ok(Arc::clone(&transport)))
        };
        self.register(tag, factory);
    }

    /// Returns the binding for a tag, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnknownTransport`] for unregistered tags and
    /// any factory error verbatim.
    pub fn get(&self, tag: &str) -> Result<Arc<dyn Transport>, TransportError> {
        let entry = {
            let entries = self.entries.read().map_err(|_| {
                TransportError::Internal("transport registry lock poisoned".to_string())
            })?;
            entries.get(tag).cloned()
        };
        let Some(entry) = entry else {
            return Err(TransportError::UnknownTransport {
                tag: tag.to_string(),
            });
        };
        let mut instance = entry.instance.lock().map_err(|_| {
            TransportError::Internal("transport registry entry lock poisoned".to_string())
        })?;
        if let Some(existing) = instance.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let built = (entry.factory)()?;
        *instance = Some(Arc::clone(&built));
        Ok(built)
    }

    /// Returns true when a binding is registered for the tag.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.read().map(|entries| entries.contains_key(tag)).unwrap_or(false)
    }

    /// Returns the registered tags in sorted order.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes every entry. Intended for tests.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::TransportRegistry;
    use crate::contract::ChunkSequence;
    use crate::contract::Transport;
    use crate::contract::TransportRequest;
    use crate::contract::TransportResponse;
    use crate::error::TransportError;

    struct FakeTransport {
        tag: &'static str,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn protocol_tag(&self) -> &str {
            self.tag
        }

        async fn invoke(
            &self,
            _request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Closed)
        }

        async fn stream(
            &self,
            _request: TransportRequest,
        ) -> Result<ChunkSequence, TransportError> {
            Err(TransportError::Closed)
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn lookup_misses_with_unknown_transport() {
        let registry = TransportRegistry::new();
        let err = registry.get("wss").unwrap_err();
        assert!(matches!(err, TransportError::UnknownTransport { ref tag } if tag == "wss"));
    }

    #[test]
    fn factory_runs_once_per_entry() {
        let registry = TransportRegistry::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        registry.register(
            "https",
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FakeTransport {
                    tag: "https",
                }) as Arc<dyn Transport>)
            }),
        );
        let first = registry.get("https").unwrap();
        let second = registry.get("https").unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn reregistration_replaces_the_entry() {
        let registry = TransportRegistry::new();
        registry.register_instance(
            "local",
            Arc::new(FakeTransport {
                tag: "first",
            }),
        );
        let first = registry.get("local").unwrap();
        assert_eq!(first.protocol_tag(), "first");
        registry.register_instance(
            "local",
            Arc::new(FakeTransport {
                tag: "second",
            }),
        );
        let second = registry.get("local").unwrap();
        assert_eq!(second.protocol_tag(), "second");
    }

    #[test]
    fn clear_resets_for_tests() {
        let registry = TransportRegistry::new();
        registry.register_instance(
            "https",
            Arc::new(FakeTransport {
                tag: "https",
            }),
        );
        assert!(registry.contains("https"));
        registry.clear();
        assert!(!registry.contains("https"));
        assert!(registry.tags().is_empty());
    }
}
