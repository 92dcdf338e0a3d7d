//! Random bold letters in Telegram MarkdownV2.

use async_trait::async_trait;
use rand::Rng;

use crate::telegram::markdown::escape_markdown_v2;

use super::{Plugin, PluginContext, PluginError};

/// Default chance for each letter to be wrapped in bold markers.
pub const DEFAULT_PROBABILITY: f64 = 0.18;

/// Escapes the text for MarkdownV2, then bolds random letters.
#[derive(Debug, Clone, Copy)]
pub struct RandomBoldPlugin {
    probability: f64,
}

impl RandomBoldPlugin {
    /// Create the plugin with a per-letter probability, clamped to `0.0..=1.0`.
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { probability }
    }

    /// Configured per-letter probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl Default for RandomBoldPlugin {
    fn default() -> Self {
        Self::new(DEFAULT_PROBABILITY)
    }
}

/// Escape `text` and wrap letters in `*…*` with the given probability.
pub fn embolden<R: Rng + ?Sized>(text: &str, probability: f64, rng: &mut R) -> String {
    let escaped = escape_markdown_v2(text);
    let mut out = String::with_capacity(escaped.len());
    for ch in escaped.chars() {
        if ch.is_alphabetic() && rng.gen::<f64>() < probability {
            out.push('*');
            out.push(ch);
            out.push('*');
        } else {
            out.push(ch);
        }
    }
    out
}

#[async_trait]
impl Plugin for RandomBoldPlugin {
    fn id(&self) -> &str {
        "random_bold"
    }

    fn title(&self) -> &str {
        "Random bold letters (MarkdownV2)"
    }

    async fn transform(&self, text: &str, _context: PluginContext) -> Result<String, PluginError> {
        Ok(embolden(text, self.probability, &mut rand::thread_rng()))
    }
}
