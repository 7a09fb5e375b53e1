//! Character-based token estimation for history messages.
//!
//! The estimator is deliberately crude: a 4-chars-per-token heuristic with a
//! small per-message overhead for role framing. It exists to make budgeting
//! decisions, not to bill anyone, so determinism and monotonicity matter more
//! than accuracy. Every other context module builds on these two functions.

use crate::{HistoryMessage, MessageContent};

/// Characters per token. Provider tokenizers average 3-4 chars per token for
/// English text; 4 keeps the estimate conservative on the low side.
pub const CHARS_PER_TOKEN: usize = 4;

/// Flat character overhead per message for role framing and separators.
pub const MESSAGE_OVERHEAD_CHARS: usize = 10;

/// Flat character charge for a non-text content part (images, tool refs).
pub const NON_TEXT_PART_CHARS: usize = 100;

/// Count the effective characters of a message's content.
///
/// Plain strings count their length. Structured content sums the text length
/// of `text` parts and charges [`NON_TEXT_PART_CHARS`] for every other part.
pub fn content_chars(content: &MessageContent) -> usize {
    match content {
        MessageContent::Text(s) => s.len(),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| {
                if p.is_text() {
                    p.text.as_ref().map_or(0, |t| t.len())
                } else {
                    NON_TEXT_PART_CHARS
                }
            })
            .sum(),
    }
}

/// Estimate the token count of a single message.
///
/// `ceil((chars + overhead) / 4)`. Pure and deterministic: the same message
/// always yields the same estimate.
pub fn estimate_message_tokens(message: &HistoryMessage) -> usize {
    (content_chars(&message.content) + MESSAGE_OVERHEAD_CHARS).div_ceil(CHARS_PER_TOKEN)
}

/// Estimate the total token count of a message history. Empty history is 0.
pub fn estimate_history_tokens(messages: &[HistoryMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
