//! Text transformation plugins.
//!
//! A plugin is a named, stateless-per-call text mapping. Built-in plugins are
//! compiled in; external plugins are subprocesses described by JSON manifests
//! in the plugins directory. All of them land in one [`PluginRegistry`],
//! rebuilt from scratch on every configuration reload.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::AppConfig;
use crate::providers::LlmProvider;

pub mod every_second_upper;
pub mod external;
pub mod llm_rewrite;
pub mod random_bold;
pub mod registry;

pub use registry::{PluginNotFound, PluginRegistry};

/// Per-invocation facts handed to every transform call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginContext {
    /// Chat the message belongs to.
    pub chat_id: i64,
    /// Message being transformed.
    pub message_id: i64,
    /// Whether the result will only be logged, not committed.
    pub dry_run: bool,
}

/// Errors a plugin reports instead of returning bad output.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The transformation could not produce a result.
    #[error("{0}")]
    Failed(String),
    /// Spawning or talking to an external plugin process failed.
    #[error("plugin process I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// An external plugin did not finish in time.
    #[error("plugin timed out after {0}s")]
    Timeout(u64),
}

/// A named text transformation.
///
/// Implementations must be `Send + Sync`: one instance serves every chat
/// concurrently. A failing transform must not leave shared state modified.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identifier referenced from chat plugin orders.
    fn id(&self) -> &str;

    /// Human-readable name for listings.
    fn title(&self) -> &str;

    /// Transform `text`, returning the new text.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when no trustworthy output can be produced.
    async fn transform(&self, text: &str, context: PluginContext) -> Result<String, PluginError>;
}

/// Register the compiled-in plugins.
pub fn build_builtin_registry(config: &AppConfig, provider: Arc<dyn LlmProvider>) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(llm_rewrite::LlmRewritePlugin::new(
        provider,
        config.llm.clone(),
    )));
    registry.register(Arc::new(random_bold::RandomBoldPlugin::default()));
    registry.register(Arc::new(every_second_upper::EverySecondUpperPlugin));
    registry
}

/// Build the full registry for a configuration snapshot.
///
/// Built-ins first, then external manifests from `config.plugins_dir` (or
/// `default_plugins_dir`). A manifest reusing a built-in id replaces it.
pub fn build_registry(
    config: &AppConfig,
    provider: Arc<dyn LlmProvider>,
    default_plugins_dir: &Path,
) -> PluginRegistry {
    let mut registry = build_builtin_registry(config, provider);
    let plugins_dir = config.plugins_dir.as_deref().unwrap_or(default_plugins_dir);
    let loaded = external::load_external_plugins(&mut registry, plugins_dir);
    info!(
        plugins = registry.len(),
        external = loaded,
        "plugin registry built"
    );
    registry
}
