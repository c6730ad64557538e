//! Per-conversation synced-range tracking.
//!
//! Every transition is an explicit call; nothing here runs on a timer.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Unsynced,
    Syncing,
    Synced,
}

/// The window of a conversation a client holds without gaps.
///
/// Once `Synced`: `synced_from <= synced_to <= total_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSyncState {
    /// Index of the oldest held message (0 = first message ever)
    pub synced_from: u64,
    /// One past the newest held message
    pub synced_to: u64,
    /// Authoritative message count as last reported
    pub total_count: u64,
    pub phase: SyncPhase,
    /// A backward page request is outstanding
    pub is_loading_more: bool,
}

impl ConversationSyncState {
    pub fn has_more_before(&self) -> bool {
        self.synced_from > 0
    }

    /// The tail is behind the authoritative head (missed live messages).
    pub fn has_more_after(&self) -> bool {
        self.synced_to < self.total_count
    }

    pub fn loaded(&self) -> u64 {
        self.synced_to.saturating_sub(self.synced_from)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationSyncTracker {
    states: HashMap<String, ConversationSyncState>,
}

impl ConversationSyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark that the initial load for `conversation_id` has been requested.
    pub fn begin_sync(&mut self, conversation_id: &str) {
        let state = self.states.entry(conversation_id.to_string()).or_default();
        state.phase = SyncPhase::Syncing;
        debug!(conversation = %conversation_id, "Sync started");
    }

    /// Replace the stored range with a fresh authoritative snapshot.
    pub fn set_sync(&mut self, conversation_id: &str, from: u64, to: u64, total_count: u64) {
        self.states.insert(
            conversation_id.to_string(),
            ConversationSyncState {
                synced_from: from,
                synced_to: to,
                total_count,
                phase: SyncPhase::Synced,
                is_loading_more: false,
            },
        );
        debug!(
            conversation = %conversation_id,
            from,
            to,
            total = total_count,
            "Sync range set"
        );
    }

    /// Extend coverage toward the past. Never moves `synced_from` forward.
    pub fn extend_from(&mut self, conversation_id: &str, new_from: u64) {
        match self.states.get_mut(conversation_id) {
            Some(state) => state.synced_from = state.synced_from.min(new_from),
            None => trace!(conversation = %conversation_id, "extend_from on unknown conversation"),
        }
    }

    /// Extend coverage toward the present after a live message.
    pub fn extend_to(&mut self, conversation_id: &str, new_to: u64, new_total_count: u64) {
        match self.states.get_mut(conversation_id) {
            Some(state) => {
                state.synced_to = new_to;
                state.total_count = new_total_count;
            }
            None => trace!(conversation = %conversation_id, "extend_to on unknown conversation"),
        }
    }

    pub fn has_more_before(&self, conversation_id: &str) -> bool {
        self.states
            .get(conversation_id)
            .is_some_and(ConversationSyncState::has_more_before)
    }

    pub fn has_more_after(&self, conversation_id: &str) -> bool {
        self.states
            .get(conversation_id)
            .is_some_and(ConversationSyncState::has_more_after)
    }

    pub fn set_loading_more(&mut self, conversation_id: &str, loading: bool) {
        match self.states.get_mut(conversation_id) {
            Some(state) => state.is_loading_more = loading,
            None => trace!(conversation = %conversation_id, "set_loading_more on unknown conversation"),
        }
    }

    pub fn is_loading_more(&self, conversation_id: &str) -> bool {
        self.states
            .get(conversation_id)
            .is_some_and(|state| state.is_loading_more)
    }

    pub fn get(&self, conversation_id: &str) -> Option<&ConversationSyncState> {
        self.states.get(conversation_id)
    }

    pub fn remove(&mut self, conversation_id: &str) -> Option<ConversationSyncState> {
        self.states.remove(conversation_id)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
