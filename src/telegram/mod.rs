//! Telegram adapter: edit transport and channel-post dispatcher.
//!
//! The bot must be an administrator of the channel with the right to edit
//! messages. Every text post in the channel is handed to the daemon as an
//! outgoing-message event; edits go back through [`TelegramTransport`].

use async_trait::async_trait;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

use crate::daemon::DaemonHandle;
use crate::error::AppError;
use crate::transport::{FormatHint, OutgoingMessage, Transport, TransportError};

pub mod markdown;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// [`Transport`] backed by the Bot API `editMessageText` call.
#[derive(Debug, Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a bot client.
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn parse_mode_for(format: FormatHint) -> Option<ParseMode> {
    match format {
        FormatHint::MarkdownV2 => Some(ParseMode::MarkdownV2),
        FormatHint::Html => Some(ParseMode::Html),
        FormatHint::Plain => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Telegram refused the markup itself; nothing was applied.
fn is_cant_parse_entities_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::CantParseEntities(_)))
}

fn classify(error: RequestError) -> TransportError {
    match error {
        RequestError::Api(api) => TransportError::Rejected(api.to_string()),
        other => TransportError::Network(other.to_string()),
    }
}

/// Convert a platform-neutral message id to Telegram's 32-bit id.
///
/// # Errors
///
/// Returns [`TransportError::InvalidId`] when the id does not fit.
pub fn telegram_message_id(message_id: i64) -> Result<MessageId, TransportError> {
    i32::try_from(message_id)
        .map(MessageId)
        .map_err(|_| TransportError::InvalidId(message_id))
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn edit(
        &self,
        chat_id: i64,
        message_id: i64,
        new_text: &str,
        format: FormatHint,
    ) -> Result<(), TransportError> {
        let chat = ChatId(chat_id);
        let message = telegram_message_id(message_id)?;

        if let Some(mode) = parse_mode_for(format) {
            match self
                .bot
                .edit_message_text(chat, message, new_text)
                .parse_mode(mode)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if is_message_not_modified_error(&e) => return Ok(()),
                Err(e) if is_cant_parse_entities_error(&e) => {
                    warn!(
                        chat_id,
                        message_id,
                        error = %e,
                        "telegram could not parse the markup, retrying as plain text"
                    );
                }
                // The request may have been applied; a second edit could
                // overwrite it with raw markup.
                Err(e) => return Err(classify(e)),
            }
        }

        match self.bot.edit_message_text(chat, message, new_text).await {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Check the token against `getMe`, returning the bot's username.
///
/// # Errors
///
/// Returns [`AppError`] when Telegram rejects the token or is unreachable.
pub async fn verify_bot(bot: &Bot) -> Result<String, AppError> {
    let me = bot.get_me().await.map_err(|e| {
        AppError::with_source(
            "Telegram did not accept the bot token. Check FANCIFIER_TELEGRAM_TOKEN.",
            e,
        )
    })?;
    let username = me.username().to_owned();
    info!(bot = %username, "telegram bot authorized");
    Ok(username)
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Receive channel posts and submit them to the daemon until Ctrl+C.
pub async fn run_dispatcher(bot: Bot, handle: DaemonHandle) {
    let handler =
        dptree::entry().branch(Update::filter_channel_post().endpoint(handle_channel_post));

    info!("telegram dispatcher starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![handle])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram dispatcher stopped");
}

/// Map a Telegram message to a daemon event. Non-text messages yield `None`.
pub fn outgoing_from_message(msg: &Message) -> Option<OutgoingMessage> {
    let text = msg.text()?;
    Some(OutgoingMessage::new(
        msg.chat.id.0,
        i64::from(msg.id.0),
        text,
        msg.date,
    ))
}

async fn handle_channel_post(msg: Message, handle: DaemonHandle) -> ResponseResult<()> {
    let Some(event) = outgoing_from_message(&msg) else {
        debug!(chat_id = msg.chat.id.0, "non-text channel post, ignoring");
        return Ok(());
    };
    debug!(
        chat_id = msg.chat.id.0,
        message_id = msg.id.0,
        "channel post received"
    );
    // Detached; the daemon tracks the task for shutdown.
    drop(handle.submit(event));
    Ok(())
}
