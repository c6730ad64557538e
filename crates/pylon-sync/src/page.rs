//! Source-of-truth side of history sync: cutting pages out of the
//! authoritative log.

use serde::Serialize;

use pylon_shared::constants::{HISTORY_PAGE_MESSAGES, MAX_MESSAGE_SIZE};
use pylon_shared::protocol::HistoryResult;

/// Upper bounds for one page. The serialized size of the messages is
/// counted against `max_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryBudget {
    pub max_messages: usize,
    pub max_bytes: usize,
}

impl Default for HistoryBudget {
    fn default() -> Self {
        Self {
            max_messages: HISTORY_PAGE_MESSAGES,
            max_bytes: MAX_MESSAGE_SIZE,
        }
    }
}

/// Build the `history_result` answering a request.
///
/// Returns the messages immediately preceding `load_before` (the newest
/// messages when it is `None`), oldest first. At least one message is
/// returned whenever any precede the boundary, even if it alone exceeds the
/// byte budget. A `load_before` past the end of the log is clamped, and the
/// clamped value is what gets echoed.
pub fn paginate<M>(
    conversation_id: &str,
    log: &[M],
    load_before: Option<u64>,
    budget: HistoryBudget,
) -> Result<HistoryResult<M>, serde_json::Error>
where
    M: Serialize + Clone,
{
    let total = log.len();
    let end = load_before.map_or(total, |lb| (lb.min(total as u64)) as usize);

    let mut start = end;
    let mut bytes = 0usize;
    while start > 0 && end - start < budget.max_messages {
        let size = serde_json::to_vec(&log[start - 1])?.len();
        if start < end && bytes + size > budget.max_bytes {
            break;
        }
        bytes += size;
        start -= 1;
    }

    Ok(HistoryResult {
        conversation_id: conversation_id.to_string(),
        messages: log[start..end].to_vec(),
        total_count: total as u64,
        load_before: load_before.map(|_| end as u64),
    })
}
