//! Freshness check run before any message edit.
//!
//! A message may only be edited while it is still the newest outgoing
//! message of its chat and was sent recently. The check is a pure function of
//! its inputs so the daemon can call it under the chat lock without I/O.

use chrono::{DateTime, TimeZone, Utc};

/// Default maximum message age, in seconds, before edits are refused.
pub const DEFAULT_MAX_AGE_SECS: u64 = 10;

/// Reason reported when the chat has no recorded last message.
pub const REASON_NO_REFERENCE: &str = "no prior last-message reference";
/// Reason reported when a newer outgoing message exists in the chat.
pub const REASON_SUPERSEDED: &str = "message superseded";
/// Reason reported when the message is older than the allowed window.
pub const REASON_TOO_OLD: &str = "message too old";

/// Outcome of a safeguard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeguardResult {
    /// Whether editing is still allowed.
    pub ok: bool,
    /// Why editing was refused. Empty when `ok` is true.
    pub reason: String,
}

impl SafeguardResult {
    fn allow() -> Self {
        Self {
            ok: true,
            reason: String::new(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
        }
    }
}

/// Decide whether `candidate_id` may still be edited, using the current time.
///
/// See [`evaluate_at`] for the rules.
pub fn evaluate<Tz: TimeZone>(
    candidate_id: i64,
    last_known_id: Option<i64>,
    message_timestamp: &DateTime<Tz>,
    max_age_secs: u64,
) -> SafeguardResult {
    evaluate_at(
        Utc::now(),
        candidate_id,
        last_known_id,
        message_timestamp,
        max_age_secs,
    )
}

/// Decide whether `candidate_id` may still be edited at instant `now`.
///
/// Rules are checked in order and the first failure wins:
/// 1. no last-known message id for the chat;
/// 2. the candidate is not the last-known message;
/// 3. the message is older than `max_age_secs`.
///
/// The timestamp is converted to UTC before comparing, whatever zone it
/// arrived in.
pub fn evaluate_at<Tz: TimeZone>(
    now: DateTime<Utc>,
    candidate_id: i64,
    last_known_id: Option<i64>,
    message_timestamp: &DateTime<Tz>,
    max_age_secs: u64,
) -> SafeguardResult {
    let Some(last_known_id) = last_known_id else {
        return SafeguardResult::deny(REASON_NO_REFERENCE);
    };
    if candidate_id != last_known_id {
        return SafeguardResult::deny(REASON_SUPERSEDED);
    }

    let sent_at = message_timestamp.with_timezone(&Utc);
    let age_ms = now.signed_duration_since(sent_at).num_milliseconds();
    let max_age_ms = i64::try_from(max_age_secs)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    if age_ms > max_age_ms {
        return SafeguardResult::deny(REASON_TOO_OLD);
    }

    SafeguardResult::allow()
}
