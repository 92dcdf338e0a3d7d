//! Per-chat runtime state: edit locks and the last message seen.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide state keyed by chat id.
///
/// Entries are created lazily and live for the whole process. The std
/// mutexes guard only map access and are never held across an await.
#[derive(Debug, Default)]
pub struct ChatStates {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    last_seen: Mutex<HashMap<i64, i64>>,
}

impl ChatStates {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The chat's edit lock, created on first use.
    ///
    /// Every caller for the same chat gets the same mutex.
    pub fn lock_for(&self, chat_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(chat_id).or_default())
    }

    /// Mark `message_id` as the newest message seen in the chat.
    pub fn record_last_seen(&self, chat_id: i64, message_id: i64) {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chat_id, message_id);
    }

    /// Newest message seen in the chat, if any.
    pub fn last_seen(&self, chat_id: i64) -> Option<i64> {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat_id)
            .copied()
    }

    /// Number of chats that have an edit lock.
    pub fn tracked_chats(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
