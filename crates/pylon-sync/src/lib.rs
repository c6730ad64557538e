//! # pylon-sync
//!
//! Keeps a client's partial copy of each conversation's message log
//! reconciled with the authoritative one.
//!
//! [`ConversationSyncTracker`] holds the contiguous `[synced_from,
//! synced_to)` window per conversation; [`ConversationHistory`] routes
//! `history_result` messages (initial load vs. backward page) into the
//! message list and the tracker; [`paginate`] builds those results on the
//! source-of-truth side.

pub mod history;
pub mod page;
pub mod tracker;

pub use history::{ConversationHistory, HistoryApply};
pub use page::{paginate, HistoryBudget};
pub use tracker::{ConversationSyncState, ConversationSyncTracker, SyncPhase};
