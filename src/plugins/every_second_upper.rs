//! Alternating-case plugin.

use async_trait::async_trait;

use super::{Plugin, PluginContext, PluginError};

/// Lower-cases odd letters and upper-cases even ones, counting letters only.
///
/// `"привет"` becomes `"пРиВеТ"`. Non-letters pass through and do not
/// advance the letter counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EverySecondUpperPlugin;

/// Apply the alternating case mapping.
pub fn alternate_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut upper = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if upper {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            upper = !upper;
        } else {
            out.push(ch);
        }
    }
    out
}

#[async_trait]
impl Plugin for EverySecondUpperPlugin {
    fn id(&self) -> &str {
        "every_second_upper"
    }

    fn title(&self) -> &str {
        "Every second letter upper-case"
    }

    async fn transform(&self, text: &str, _context: PluginContext) -> Result<String, PluginError> {
        Ok(alternate_case(text))
    }
}
