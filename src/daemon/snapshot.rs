//! The active configuration and plugin registry, swapped as one unit.

use std::sync::{Arc, PoisonError, RwLock};

use crate::config::AppConfig;
use crate::plugins::PluginRegistry;

/// One consistent `{config, registry}` pair.
#[derive(Debug)]
pub struct RuntimeSnapshot {
    /// Configuration in effect.
    pub config: Arc<AppConfig>,
    /// Plugins built for that configuration.
    pub registry: Arc<PluginRegistry>,
}

impl RuntimeSnapshot {
    /// Pair a config with its registry.
    pub fn new(config: AppConfig, registry: PluginRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }
}

/// Holder of the active snapshot.
///
/// Readers clone the `Arc` under a short read lock and keep using it for the
/// whole event even after a newer snapshot is installed.
#[derive(Debug)]
pub struct SharedRuntime {
    active: RwLock<Arc<RuntimeSnapshot>>,
}

impl SharedRuntime {
    /// Start with `snapshot` active.
    pub fn new(snapshot: RuntimeSnapshot) -> Self {
        Self {
            active: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot active right now.
    pub fn current(&self) -> Arc<RuntimeSnapshot> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the active snapshot for all subsequent readers.
    pub fn install(&self, snapshot: RuntimeSnapshot) {
        let next = Arc::new(snapshot);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}
