//! Id-keyed plugin registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::Plugin;

/// Lookup of an id that no registered plugin carries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("plugin '{id}' is not registered")]
pub struct PluginNotFound {
    /// The id that was requested.
    pub id: String,
}

/// Plugins keyed by id, iterated in id order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("ids", &self.all_ids())
            .finish()
    }
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. An existing plugin with the same id is replaced.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.id().to_owned(), plugin);
    }

    /// Resolve a plugin by id.
    ///
    /// # Errors
    ///
    /// Returns [`PluginNotFound`] when no plugin has this id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Plugin>, PluginNotFound> {
        self.plugins
            .get(id)
            .cloned()
            .ok_or_else(|| PluginNotFound { id: id.to_owned() })
    }

    /// Whether a plugin with this id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// All registered ids, sorted.
    pub fn all_ids(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// All registered plugins, in id order.
    pub fn all(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins.values().cloned().collect()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
