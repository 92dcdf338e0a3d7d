//! Transport boundary: outgoing-message events in, message edits out.
//!
//! The daemon only depends on this shape. The Telegram implementation lives
//! in [`crate::telegram`]; tests drive the daemon with in-memory transports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A message the controlling user just sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Conversation the message was sent to, when known.
    pub chat_id: Option<i64>,
    /// Message identifier within the chat, when known.
    pub message_id: Option<i64>,
    /// Raw message text.
    pub text: String,
    /// Send time reported by the platform.
    pub timestamp: DateTime<Utc>,
}

impl OutgoingMessage {
    /// Build an event with both identifiers present.
    pub fn new(chat_id: i64, message_id: i64, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            chat_id: Some(chat_id),
            message_id: Some(message_id),
            text: text.into(),
            timestamp,
        }
    }
}

/// How the edited text should be rendered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    /// Telegram MarkdownV2 entities.
    MarkdownV2,
    /// Telegram HTML entities.
    Html,
    /// No formatting; text is shown verbatim.
    Plain,
}

impl FormatHint {
    /// Map a configured `parse_mode` string to a hint.
    ///
    /// Unknown values render as plain text.
    pub fn from_parse_mode(parse_mode: &str) -> Self {
        match parse_mode.trim().to_ascii_lowercase().as_str() {
            "markdown_v2" | "markdownv2" | "md" | "markdown" => Self::MarkdownV2,
            "html" => Self::Html,
            _ => Self::Plain,
        }
    }
}

/// Errors returned by a transport's edit operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The platform rejected the edit.
    #[error("edit rejected by platform: {0}")]
    Rejected(String),
    /// Network or session failure while talking to the platform.
    #[error("transport failure: {0}")]
    Network(String),
    /// The identifiers cannot be represented by the platform.
    #[error("invalid message identifier: {0}")]
    InvalidId(i64),
}

/// The edit side of the chat platform.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Replace the text of a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the platform refuses the edit or the
    /// request cannot be delivered. Callers treat this as a lost edit.
    async fn edit(
        &self,
        chat_id: i64,
        message_id: i64,
        new_text: &str,
        format: FormatHint,
    ) -> Result<(), TransportError>;
}
