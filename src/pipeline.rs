//! Ordered plugin chain execution.

use tracing::debug;

use crate::plugins::{PluginContext, PluginError, PluginRegistry};

/// Whether the chain changed the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Final text differs from the input.
    Changed,
    /// Final text equals the input.
    NoOp,
}

/// Result of a completed chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRun {
    /// Output of the last plugin (the input when the chain is empty).
    pub text: String,
    /// Comparison against the input.
    pub outcome: PipelineOutcome,
}

impl PipelineRun {
    /// Whether the run produced different text.
    pub fn changed(&self) -> bool {
        self.outcome == PipelineOutcome::Changed
    }
}

/// A chain aborted; no partial text is returned.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The plugin order names an id the registry does not have.
    #[error("plugin '{plugin_id}' is not registered")]
    UnknownPlugin {
        /// Missing id.
        plugin_id: String,
    },
    /// A plugin's transform failed.
    #[error("plugin '{plugin_id}' failed: {source}")]
    PluginFailed {
        /// Failing plugin.
        plugin_id: String,
        /// Underlying plugin error.
        #[source]
        source: PluginError,
    },
}

impl PipelineError {
    /// Id of the plugin that stopped the chain.
    pub fn plugin_id(&self) -> &str {
        match self {
            Self::UnknownPlugin { plugin_id } | Self::PluginFailed { plugin_id, .. } => plugin_id,
        }
    }
}

/// Runs plugin chains against one registry.
#[derive(Debug, Clone, Copy)]
pub struct PluginPipeline<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> PluginPipeline<'a> {
    /// Pipeline resolving ids against `registry`.
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Feed `text` through `plugin_ids` in order.
    ///
    /// Each plugin receives the previous plugin's output. Ids may repeat.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] naming the first unknown or failing plugin.
    pub async fn run(
        &self,
        text: &str,
        plugin_ids: &[String],
        context: PluginContext,
    ) -> Result<PipelineRun, PipelineError> {
        let mut current = text.to_owned();
        for plugin_id in plugin_ids {
            let plugin = self
                .registry
                .get(plugin_id)
                .map_err(|_| PipelineError::UnknownPlugin {
                    plugin_id: plugin_id.clone(),
                })?;
            current = plugin
                .transform(&current, context)
                .await
                .map_err(|source| PipelineError::PluginFailed {
                    plugin_id: plugin_id.clone(),
                    source,
                })?;
            debug!(plugin_id = %plugin_id, chat_id = context.chat_id, "plugin applied");
        }

        let outcome = if current == text {
            PipelineOutcome::NoOp
        } else {
            PipelineOutcome::Changed
        };
        Ok(PipelineRun {
            text: current,
            outcome,
        })
    }
}
