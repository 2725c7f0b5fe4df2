//! Registry of live handles that follow configuration changes.
//!
//! Factories register every engine and diagnostic handle they hand out. After
//! a new configuration is promoted, [`HandleRegistry::notify`] reinitializes
//! each handle that is still alive. Handles are held weakly, so dropping the
//! last `Arc` unregisters a handle without any explicit call.

use std::sync::{Arc, Mutex, Weak};

use crate::config::ConfigId;
use crate::error::{SzError, SzResult};
use crate::service::Reinitialize;

/// Identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

struct Entry {
    id: HandleId,
    kind: &'static str,
    handle: Weak<dyn Reinitialize>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: Vec<Entry>,
    current: Option<ConfigId>,
}

/// Registry of reinitializable handles.
#[derive(Default)]
pub struct HandleRegistry {
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live_handles", &self.live_handles())
            .field("current", &self.current_config_id())
            .finish()
    }
}

fn lock_err() -> SzError {
    SzError::internal("poisoned lock: handle registry")
}

impl HandleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a handle. `kind` is only used in log output.
    pub fn register<T: Reinitialize + 'static>(&self, kind: &'static str, handle: &Arc<T>) -> SzResult<HandleId> {
        let weak: Weak<dyn Reinitialize> = Arc::downgrade(handle) as Weak<dyn Reinitialize>;
        let mut state = self.state.lock().map_err(|_| lock_err())?;
        state.entries.retain(|e| e.handle.strong_count() > 0);
        let id = HandleId(state.next_id);
        state.next_id += 1;
        state.entries.push(Entry { id, kind, handle: weak });
        tracing::debug!(kind, handle = id.0, "registered handle");
        Ok(id)
    }

    /// Number of registered handles that are still alive.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.entries.iter().filter(|e| e.handle.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Last configuration id broadcast through [`HandleRegistry::notify`].
    #[must_use]
    pub fn current_config_id(&self) -> Option<ConfigId> {
        self.state.lock().ok().and_then(|s| s.current)
    }

    /// Reinitializes every live handle against `config_id`.
    ///
    /// Every live handle is attempted even if an earlier one fails; the first
    /// failure is returned. On success returns how many handles were
    /// reinitialized.
    pub async fn notify(&self, config_id: ConfigId) -> SzResult<usize> {
        let live: Vec<(HandleId, &'static str, Arc<dyn Reinitialize>)> = {
            let mut state = self.state.lock().map_err(|_| lock_err())?;
            state.entries.retain(|e| e.handle.strong_count() > 0);
            state.current = Some(config_id);
            state
                .entries
                .iter()
                .filter_map(|e| e.handle.upgrade().map(|h| (e.id, e.kind, h)))
                .collect()
        };

        let mut first_err = None;
        let mut count = 0usize;
        for (id, kind, handle) in live {
            match handle.reinitialize(config_id).await {
                Ok(()) => count += 1,
                Err(err) => {
                    tracing::error!(kind, handle = id.0, config_id = %config_id, error = %err, "reinitialize failed");
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => {
                tracing::info!(config_id = %config_id, handles = count, "reinitialized handles");
                Ok(count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicI64, Ordering};

    use async_trait::async_trait;

    use crate::error::EngineError;

    #[derive(Default)]
    struct Probe {
        seen: AtomicI64,
        fail: bool,
    }

    #[async_trait]
    impl Reinitialize for Probe {
        async fn reinitialize(&self, config_id: ConfigId) -> SzResult<()> {
            if self.fail {
                return Err(EngineError::NotFound {
                    message: "no such config".to_string(),
                }
                .into());
            }
            self.seen.store(config_id.get(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notify_reaches_live_handles() {
        let registry = HandleRegistry::new();
        let a = Arc::new(Probe::default());
        let b = Arc::new(Probe::default());
        registry.register("engine", &a).unwrap();
        registry.register("diagnostic", &b).unwrap();

        let count = registry.notify(ConfigId::new(42)).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(a.seen.load(Ordering::SeqCst), 42);
        assert_eq!(b.seen.load(Ordering::SeqCst), 42);
        assert_eq!(registry.current_config_id(), Some(ConfigId::new(42)));
    }

    #[tokio::test]
    async fn test_dropped_handles_are_pruned() {
        let registry = HandleRegistry::new();
        let kept = Arc::new(Probe::default());
        registry.register("engine", &kept).unwrap();
        {
            let dropped = Arc::new(Probe::default());
            registry.register("engine", &dropped).unwrap();
            assert_eq!(registry.live_handles(), 2);
        }
        assert_eq!(registry.live_handles(), 1);
        assert_eq!(registry.notify(ConfigId::new(7)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_skip_other_handles() {
        let registry = HandleRegistry::new();
        let failing = Arc::new(Probe {
            fail: true,
            ..Probe::default()
        });
        let healthy = Arc::new(Probe::default());
        registry.register("engine", &failing).unwrap();
        registry.register("engine", &healthy).unwrap();

        assert!(registry.notify(ConfigId::new(9)).await.is_err());
        assert_eq!(healthy.seen.load(Ordering::SeqCst), 9);
    }
}
