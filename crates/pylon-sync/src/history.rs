//! Routing of `history_result` into a client's message lists.
//!
//! A result that echoes `loadBefore` answers a backward page request and is
//! prepended; one without it is an initial load (or a full refresh) and
//! replaces the list. Mixing the two up duplicates or loses messages.
//!
//! A backward page is only accepted while its request is outstanding and
//! the window still starts at its `loadBefore`; a repeated or stale page
//! would otherwise splice messages into the wrong place.

use std::collections::HashMap;

use tracing::{debug, warn};

use pylon_shared::protocol::{HistoryRequest, HistoryResult};

use crate::tracker::ConversationSyncTracker;

/// How a `history_result` was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryApply {
    /// Initial load: the list was replaced.
    Replaced { loaded: u64 },
    /// Backward page: messages were prepended.
    Prepended { loaded: u64 },
    /// Backward page that no longer matches the window; dropped.
    Ignored,
}

/// Client-side message lists plus the sync window for each conversation.
#[derive(Debug, Clone)]
pub struct ConversationHistory<M> {
    tracker: ConversationSyncTracker,
    messages: HashMap<String, Vec<M>>,
}

impl<M> Default for ConversationHistory<M> {
    fn default() -> Self {
        Self {
            tracker: ConversationSyncTracker::new(),
            messages: HashMap::new(),
        }
    }
}

impl<M> ConversationHistory<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker(&self) -> &ConversationSyncTracker {
        &self.tracker
    }

    pub fn messages(&self, conversation_id: &str) -> &[M] {
        self.messages
            .get(conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Request for the newest page of a conversation.
    pub fn request_initial(&mut self, conversation_id: &str) -> HistoryRequest {
        self.tracker.begin_sync(conversation_id);
        HistoryRequest {
            conversation_id: conversation_id.to_string(),
            load_before: None,
        }
    }

    /// Request for the page preceding the loaded window, or `None` while a
    /// page is already outstanding or nothing older exists.
    pub fn request_older(&mut self, conversation_id: &str) -> Option<HistoryRequest> {
        if self.tracker.is_loading_more(conversation_id) {
            debug!(conversation = %conversation_id, "Older page already in flight");
            return None;
        }
        let state = self.tracker.get(conversation_id)?;
        if !state.has_more_before() {
            return None;
        }
        let load_before = state.synced_from;

        self.tracker.set_loading_more(conversation_id, true);
        Some(HistoryRequest {
            conversation_id: conversation_id.to_string(),
            load_before: Some(load_before),
        })
    }

    pub fn apply(&mut self, result: HistoryResult<M>) -> HistoryApply {
        let conversation_id = result.conversation_id;
        let loaded = result.messages.len() as u64;

        match result.load_before {
            Some(load_before) => {
                let pending = self
                    .tracker
                    .get(&conversation_id)
                    .filter(|state| state.is_loading_more)
                    .map(|state| state.synced_from);
                if pending != Some(load_before) {
                    debug!(
                        conversation = %conversation_id,
                        load_before,
                        pending = ?pending,
                        "Ignoring page that does not answer the outstanding request"
                    );
                    return HistoryApply::Ignored;
                }

                let new_from = load_before.saturating_sub(loaded);
                if loaded > load_before {
                    warn!(
                        conversation = %conversation_id,
                        load_before,
                        loaded,
                        "Page larger than its boundary, clamping to 0"
                    );
                }
                self.tracker.extend_from(&conversation_id, new_from);
                self.tracker.set_loading_more(&conversation_id, false);

                let list = self.messages.entry(conversation_id.clone()).or_default();
                list.splice(0..0, result.messages);

                debug!(conversation = %conversation_id, loaded, new_from, "Prepended history page");
                HistoryApply::Prepended { loaded }
            }
            None => {
                let total = result.total_count;
                let from = total.saturating_sub(loaded);
                self.tracker.set_sync(&conversation_id, from, total, total);
                self.messages.insert(conversation_id.clone(), result.messages);

                debug!(conversation = %conversation_id, loaded, total, "Loaded history");
                HistoryApply::Replaced { loaded }
            }
        }
    }

    /// Append a message that arrived in real time.
    pub fn push_live(&mut self, conversation_id: &str, message: M) {
        if let Some(state) = self.tracker.get(conversation_id).copied() {
            self.tracker
                .extend_to(conversation_id, state.synced_to + 1, state.total_count + 1);
        }
        self.messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }

    /// Forget a conversation entirely.
    pub fn remove(&mut self, conversation_id: &str) {
        self.tracker.remove(conversation_id);
        self.messages.remove(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(conversation: &str, range: std::ops::Range<u64>, total: u64, load_before: Option<u64>) -> HistoryResult<u64> {
        HistoryResult {
            conversation_id: conversation.to_string(),
            messages: range.collect(),
            total_count: total,
            load_before,
        }
    }

    #[test]
    fn test_initial_load_replaces() {
        let mut history = ConversationHistory::new();
        history.push_live("c", 999);

        let req = history.request_initial("c");
        assert_eq!(req.load_before, None);

        let applied = history.apply(page("c", 80..100, 100, None));
        assert_eq!(applied, HistoryApply::Replaced { loaded: 20 });
        assert_eq!(history.messages("c"), (80..100).collect::<Vec<_>>().as_slice());

        let state = history.tracker().get("c").unwrap();
        assert_eq!((state.synced_from, state.synced_to, state.total_count), (80, 100, 100));
    }

    #[test]
    fn test_backward_pages_reach_zero() {
        let mut history = ConversationHistory::new();
        history.apply(page("c", 80..100, 100, None));

        let req = history.request_older("c").unwrap();
        assert_eq!(req.load_before, Some(80));
        assert!(history.request_older("c").is_none(), "duplicate request while loading");

        let applied = history.apply(page("c", 60..80, 100, Some(80)));
        assert_eq!(applied, HistoryApply::Prepended { loaded: 20 });
        assert_eq!(history.tracker().get("c").unwrap().synced_from, 60);
        assert!(!history.tracker().is_loading_more("c"));

        let req = history.request_older("c").unwrap();
        assert_eq!(req.load_before, Some(60));
        history.apply(page("c", 0..60, 100, Some(60)));

        let state = history.tracker().get("c").unwrap();
        assert_eq!(state.synced_from, 0);
        assert_eq!(state.synced_to, 100);
        assert!(!history.tracker().has_more_before("c"));
        assert!(history.request_older("c").is_none());
        assert_eq!(history.messages("c"), (0..100).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn test_prepend_adjusts_only_from() {
        let mut history = ConversationHistory::new();
        history.apply(page("c", 90..100, 100, None));
        history.request_older("c").unwrap();
        history.apply(page("c", 85..90, 120, Some(90)));

        let state = history.tracker().get("c").unwrap();
        assert_eq!(state.synced_from, 85);
        assert_eq!(state.synced_to, 100);
        assert_eq!(state.total_count, 100);
    }

    #[test]
    fn test_oversized_page_clamps_to_zero() {
        let mut history = ConversationHistory::new();
        history.apply(page("c", 10..20, 20, None));
        history.request_older("c").unwrap();
        history.apply(page("c", 0..15, 20, Some(10)));
        assert_eq!(history.tracker().get("c").unwrap().synced_from, 0);
    }

    #[test]
    fn test_live_messages_extend_to() {
        let mut history = ConversationHistory::new();
        history.apply(page("c", 0..100, 100, None));
        for n in 100..103 {
            history.push_live("c", n);
        }
        let state = history.tracker().get("c").unwrap();
        assert_eq!(state.synced_to, 103);
        assert_eq!(state.total_count, 103);
        assert_eq!(history.messages("c").len(), 103);
    }

    #[test]
    fn test_empty_initial_load() {
        let mut history: ConversationHistory<u64> = ConversationHistory::new();
        history.apply(page("c", 0..0, 0, None));
        assert!(!history.tracker().has_more_before("c"));
        assert!(history.messages("c").is_empty());

        history.remove("c");
        assert!(history.tracker().get("c").is_none());
    }

    #[test]
    fn test_repeated_page_applied_once() {
        let mut history = ConversationHistory::new();
        history.apply(page("c", 80..100, 100, None));
        history.request_older("c").unwrap();

        assert_eq!(
            history.apply(page("c", 60..80, 100, Some(80))),
            HistoryApply::Prepended { loaded: 20 }
        );
        assert_eq!(history.apply(page("c", 60..80, 100, Some(80))), HistoryApply::Ignored);

        let state = history.tracker().get("c").unwrap();
        assert_eq!((state.synced_from, state.synced_to), (60, 100));
        assert_eq!(history.messages("c"), (60..100).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn test_stale_page_after_refresh_ignored() {
        let mut history = ConversationHistory::new();
        history.apply(page("c", 80..100, 100, None));
        let req = history.request_older("c").unwrap();
        assert_eq!(req.load_before, Some(80));

        // refresh lands before the older page does
        history.apply(page("c", 90..110, 110, None));
        assert_eq!(history.apply(page("c", 60..80, 110, Some(80))), HistoryApply::Ignored);

        let state = history.tracker().get("c").unwrap();
        assert_eq!((state.synced_from, state.synced_to), (90, 110));
        assert_eq!(history.messages("c"), (90..110).collect::<Vec<_>>().as_slice());
        assert_eq!(state.loaded(), history.messages("c").len() as u64);

        // the window is contiguous again, so paging resumes from 90
        assert_eq!(history.request_older("c").unwrap().load_before, Some(90));
    }

    #[test]
    fn test_page_for_unknown_conversation_ignored() {
        let mut history: ConversationHistory<u64> = ConversationHistory::new();
        assert_eq!(history.apply(page("ghost", 0..10, 10, Some(10))), HistoryApply::Ignored);
        assert!(history.tracker().get("ghost").is_none());
        assert!(history.messages("ghost").is_empty());
    }
}
