//! DeepSeek provider over the OpenAI-compatible HTTP API.
//!
//! Supports both the `/chat/completions` and `/responses` dialects, picked
//! per request through [`ApiStyle`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::credentials::Credentials;

use super::{check_http_response, ApiStyle, LlmProvider, LlmRequest, ProviderError};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
/// Default model when neither config nor environment names one.
pub const DEFAULT_MODEL: &str = "deepseek-chat";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `/chat/completions` request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct ChatCompletionsRequest {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// System + user messages.
    pub messages: Vec<ChatMessage>,
}

/// A message in chat-completions format.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Text content.
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// `/responses` request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct ResponsesRequest {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// System-level instructions.
    pub instructions: String,
    /// Rendered user prompt.
    pub input: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(default)]
    content: Vec<ResponsesContentPart>,
}

#[derive(Debug, Deserialize)]
struct ResponsesContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build a chat-completions body for `request`.
#[doc(hidden)]
pub fn build_chat_request(model: &str, request: &LlmRequest) -> ChatCompletionsRequest {
    ChatCompletionsRequest {
        model: model.to_owned(),
        temperature: request.temperature,
        messages: vec![
            ChatMessage {
                role: "system".to_owned(),
                content: Some(request.system_prompt.clone()),
            },
            ChatMessage {
                role: "user".to_owned(),
                content: Some(request.user_prompt()),
            },
        ],
    }
}

/// Build a responses body for `request`.
#[doc(hidden)]
pub fn build_responses_request(model: &str, request: &LlmRequest) -> ResponsesRequest {
    ResponsesRequest {
        model: model.to_owned(),
        temperature: request.temperature,
        instructions: request.system_prompt.clone(),
        input: request.user_prompt(),
    }
}

/// Extract the assistant text from a chat-completions body.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body is not valid JSON or has no
/// `choices[0].message.content`.
#[doc(hidden)]
pub fn parse_chat_response(body: &str) -> Result<String, ProviderError> {
    let resp: ChatCompletionsResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::Parse("missing choices[0].message.content".to_owned()))
}

/// Extract the output text from a responses body.
///
/// Prefers the top-level `output_text` convenience field, else joins every
/// `output_text` content part.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body is not valid JSON or carries no
/// output text.
#[doc(hidden)]
pub fn parse_responses_response(body: &str) -> Result<String, ProviderError> {
    let resp: ResponsesResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if let Some(text) = resp.output_text {
        return Ok(text);
    }
    let parts: Vec<String> = resp
        .output
        .into_iter()
        .flat_map(|item| item.content)
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text)
        .collect();
    if parts.is_empty() {
        return Err(ProviderError::Parse("response has no output_text".to_owned()));
    }
    Ok(parts.concat())
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Connection settings for [`DeepSeekProvider`].
#[derive(Clone, Default)]
pub struct DeepSeekSettings {
    /// Bearer token. `None` disables the provider.
    pub api_key: Option<String>,
    /// API base URL without the endpoint path.
    pub base_url: String,
    /// Model used when a request leaves `model` empty.
    pub default_model: String,
}

impl std::fmt::Debug for DeepSeekSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepSeekSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl DeepSeekSettings {
    /// Read settings from `DEEPSEEK_API_KEY`, `DEEPSEEK_BASE_URL` and
    /// `DEEPSEEK_MODEL`.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            api_key: credentials
                .get("DEEPSEEK_API_KEY")
                .filter(|key| !key.trim().is_empty())
                .map(str::to_owned),
            base_url: credentials
                .get("DEEPSEEK_BASE_URL")
                .unwrap_or(DEFAULT_BASE_URL)
                .to_owned(),
            default_model: credentials
                .get("DEEPSEEK_MODEL")
                .unwrap_or(DEFAULT_MODEL)
                .to_owned(),
        }
    }
}

/// DeepSeek / OpenAI-compatible rewrite provider.
#[derive(Debug, Clone)]
pub struct DeepSeekProvider {
    settings: DeepSeekSettings,
    client: reqwest::Client,
}

impl DeepSeekProvider {
    /// Create a provider with a 20 second request timeout.
    pub fn new(settings: DeepSeekSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });
        Self { settings, client }
    }

    fn endpoint(&self, style: ApiStyle) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        match style {
            ApiStyle::ChatCompletions => format!("{base}/chat/completions"),
            ApiStyle::Responses => format!("{base}/responses"),
        }
    }

    /// Perform the HTTP call, surfacing every failure.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on missing key, transport, status or parse failure.
    pub async fn try_rewrite(&self, request: &LlmRequest) -> Result<String, ProviderError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable("DEEPSEEK_API_KEY is not set".to_owned()))?;

        let model = if request.model.trim().is_empty() {
            self.settings.default_model.as_str()
        } else {
            request.model.as_str()
        };

        let builder = self
            .client
            .post(self.endpoint(request.api_style))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {api_key}"));
        let builder = match request.api_style {
            ApiStyle::ChatCompletions => builder.json(&build_chat_request(model, request)),
            ApiStyle::Responses => builder.json(&build_responses_request(model, request)),
        };

        debug!(chat_id = request.chat_id, model, style = ?request.api_style, "sending llm rewrite request");
        let response = builder.send().await?;
        let payload = check_http_response(response).await?;
        match request.api_style {
            ApiStyle::ChatCompletions => parse_chat_response(&payload),
            ApiStyle::Responses => parse_responses_response(&payload),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for DeepSeekProvider {
    async fn rewrite(&self, request: LlmRequest) -> String {
        match self.try_rewrite(&request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
            Ok(_) => {
                warn!(chat_id = request.chat_id, "llm returned empty text, keeping original");
                request.text
            }
            Err(ProviderError::Unavailable(reason)) => {
                info!(chat_id = request.chat_id, reason = %reason, "llm rewrite skipped, keeping original");
                request.text
            }
            Err(e) => {
                warn!(chat_id = request.chat_id, error = %e, "llm rewrite failed, keeping original");
                request.text
            }
        }
    }
}
