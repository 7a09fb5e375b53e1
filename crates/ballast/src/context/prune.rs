//! History pruning: drop the oldest droppable messages until a token budget
//! is met.
//!
//! Two classes of message are never dropped: system messages, and the recent
//! tail of the conversation. The tail is defined by counting user messages
//! backwards from the end; once `min_recent_turns` user messages have been
//! seen, everything from that user message onward is protected. Within the
//! droppable set, older messages go first.

use crate::HistoryMessage;
use crate::MessageRole;
use crate::context::estimator::{estimate_history_tokens, estimate_message_tokens};

/// Options for [`prune_history`].
#[derive(Clone, Copy, Debug)]
pub struct PruneOptions {
    /// Number of most-recent user turns to protect, along with every message
    /// that follows the earliest of them.
    pub min_recent_turns: usize,
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self { min_recent_turns: 4 }
    }
}

/// Result of a pruning pass.
#[derive(Clone, Debug)]
pub struct PruneOutcome {
    /// Surviving messages in their original relative order.
    pub messages: Vec<HistoryMessage>,
    /// Number of messages dropped.
    pub pruned_count: usize,
    /// Estimated tokens before pruning.
    pub tokens_before: usize,
    /// Estimated tokens after pruning.
    pub tokens_after: usize,
}

/// Prune `messages` down to `budget_tokens`.
///
/// System messages and the protected recent tail always survive. When the
/// protected set alone exceeds the budget, the input is returned intact and
/// the caller sees the overrun through `tokens_after`. Messages of equal
/// protection are dropped oldest-first.
pub fn prune_history(
    messages: &[HistoryMessage],
    budget_tokens: usize,
    options: &PruneOptions,
) -> PruneOutcome {
    let tokens_before = estimate_history_tokens(messages);
    if tokens_before <= budget_tokens {
        return PruneOutcome {
            messages: messages.to_vec(),
            pruned_count: 0,
            tokens_before,
            tokens_after: tokens_before,
        };
    }

    // Find the protection boundary: walk from the tail counting user
    // messages. Every index at or after the min_recent_turns-th user message
    // (counted from the end) is protected. If the history has fewer user
    // messages than that, the boundary stays at 0 and the whole history is
    // protected.
    let boundary = if options.min_recent_turns == 0 {
        messages.len()
    } else {
        let mut users_seen = 0usize;
        let mut boundary = 0usize;
        for (idx, msg) in messages.iter().enumerate().rev() {
            if msg.role == MessageRole::User {
                users_seen += 1;
                if users_seen == options.min_recent_turns {
                    boundary = idx;
                    break;
                }
            }
        }
        boundary
    };

    let protected =
        |idx: usize, msg: &HistoryMessage| msg.role == MessageRole::System || idx >= boundary;

    // Droppable indices in original (oldest-first) order.
    let pruneable: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(idx, msg)| !protected(*idx, msg))
        .map(|(idx, _)| idx)
        .collect();

    let mut running = tokens_before;
    let mut dropped = vec![false; messages.len()];
    for idx in pruneable {
        if running <= budget_tokens {
            break;
        }
        running -= estimate_message_tokens(&messages[idx]);
        dropped[idx] = true;
    }

    let survivors: Vec<HistoryMessage> = messages
        .iter()
        .enumerate()
        .filter(|(idx, _)| !dropped[*idx])
        .map(|(_, msg)| msg.clone())
        .collect();

    let pruned_count = dropped.iter().filter(|d| **d).count();
    let tokens_after = estimate_history_tokens(&survivors);

    PruneOutcome {
        messages: survivors,
        pruned_count,
        tokens_before,
        tokens_after,
    }
}
