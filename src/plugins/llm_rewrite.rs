//! Rewrites message text through the configured LLM prompt.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::LlmConfig;
use crate::providers::{LlmProvider, LlmRequest};

use super::{Plugin, PluginContext, PluginError};

/// Plugin id referenced from chat plugin orders.
pub const LLM_REWRITE_ID: &str = "llm_rewrite";

/// Sends the text to an [`LlmProvider`] with the active prompt.
///
/// The prompt and model come from the [`LlmConfig`] captured when the
/// registry was built, so a reload swaps them together with the registry.
pub struct LlmRewritePlugin {
    provider: Arc<dyn LlmProvider>,
    llm: LlmConfig,
}

impl std::fmt::Debug for LlmRewritePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRewritePlugin")
            .field("model", &self.llm.model)
            .field("active_prompt", &self.llm.active_prompt)
            .finish_non_exhaustive()
    }
}

impl LlmRewritePlugin {
    /// Create the plugin for one configuration snapshot.
    pub fn new(provider: Arc<dyn LlmProvider>, llm: LlmConfig) -> Self {
        Self { provider, llm }
    }

    fn request_for(&self, text: &str, chat_id: i64) -> LlmRequest {
        let prompt = self.llm.active_prompt();
        LlmRequest {
            text: text.to_owned(),
            chat_id,
            system_prompt: prompt.system_prompt,
            user_prompt_template: prompt.user_prompt_template,
            temperature: prompt.temperature,
            model: self.llm.model.clone(),
            api_style: self.llm.api_style,
        }
    }
}

#[async_trait]
impl Plugin for LlmRewritePlugin {
    fn id(&self) -> &str {
        LLM_REWRITE_ID
    }

    fn title(&self) -> &str {
        "LLM rewrite (DeepSeek)"
    }

    async fn transform(&self, text: &str, context: PluginContext) -> Result<String, PluginError> {
        debug!(
            chat_id = context.chat_id,
            message_id = context.message_id,
            prompt = %self.llm.active_prompt,
            "llm rewrite requested"
        );
        Ok(self.provider.rewrite(self.request_for(text, context.chat_id)).await)
    }
}

/// Run `text` through `llm_rewrite` without touching any chat.
///
/// Used by `fancifier test-llm`. The input is trimmed; blank input is refused.
///
/// # Errors
///
/// Returns [`PluginError::Failed`] for blank input.
pub async fn preview_llm_response(
    text: &str,
    chat_id: i64,
    provider: Arc<dyn LlmProvider>,
    llm: LlmConfig,
) -> Result<String, PluginError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PluginError::Failed("text must not be empty".to_owned()));
    }
    let plugin = LlmRewritePlugin::new(provider, llm);
    let context = PluginContext {
        chat_id,
        message_id: 0,
        dry_run: true,
    };
    plugin.transform(trimmed, context).await
}
