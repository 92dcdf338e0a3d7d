//! User-facing application errors.

/// An error whose message is safe to show to the person running the CLI.
///
/// Internal details go to the log; the message here says what to fix.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl AppError {
    /// Create an error with a user-facing message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error with a user-facing message and an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::from(source.into())),
        }
    }

    /// The message to print for the user.
    pub fn user_message(&self) -> &str {
        &self.message
    }
}
