//! LLM provider abstraction used by the `llm_rewrite` plugin.
//!
//! A provider turns an [`LlmRequest`] into rewritten text. Providers never
//! fail into the plugin pipeline: on any transport, credential or parse
//! problem they log and hand back the original text.
//!
//! One provider is implemented:
//! - [`deepseek::DeepSeekProvider`]: DeepSeek / OpenAI-compatible HTTP API

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod deepseek;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Wire dialect spoken by an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    /// `POST /chat/completions` with a `messages` array.
    #[default]
    ChatCompletions,
    /// `POST /responses` with `instructions` and `input`.
    Responses,
}

/// Everything a provider needs to rewrite one message.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    /// Text to rewrite.
    pub text: String,
    /// Chat the text came from.
    pub chat_id: i64,
    /// System prompt.
    pub system_prompt: String,
    /// User prompt; `{text}` is replaced by the message text.
    pub user_prompt_template: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Model identifier. Empty means the provider's default.
    pub model: String,
    /// Endpoint dialect.
    pub api_style: ApiStyle,
}

impl LlmRequest {
    /// Render the user prompt for this request.
    ///
    /// Templates without a `{text}` placeholder get the text appended after a
    /// blank line.
    pub fn user_prompt(&self) -> String {
        render_user_prompt(&self.user_prompt_template, &self.text)
    }
}

/// Substitute `text` into a user prompt template.
pub fn render_user_prompt(template: &str, text: &str) -> String {
    if template.contains("{text}") {
        template.replace("{text}", text)
    } else if template.trim().is_empty() {
        text.to_owned()
    } else {
        format!("{template}\n\n{text}")
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised inside providers before they fall back to the input text.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream provider responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Provider cannot serve requests with the current credentials.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `ProviderError::Request` on transport failure, `ProviderError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

fn sanitize_http_error_body(raw: &str) -> String {
    const MAX_ERROR_BODY_CHARS: usize = 256;

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [r"sk-[A-Za-z0-9_\-]{16,}", r"Bearer\s+[A-Za-z0-9._\-]{16,}"] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Rewrites message text with a language model.
///
/// `rewrite` is infallible by contract: implementations log failures and
/// return `request.text` unchanged.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Rewrite the request text, or return it unchanged on failure.
    async fn rewrite(&self, request: LlmRequest) -> String;
}
