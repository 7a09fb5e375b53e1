//! Context window management: estimation, budgeting, pruning, truncation,
//! and the discipline orchestrator.
//!
//! The context window is the scarcest resource in any LLM agent. This module
//! provides layered, purely computational strategies for staying inside it:
//!
//! 1. **[`estimator`]** — the 4-chars-per-token heuristic everything else is
//!    built on. Pure and deterministic.
//! 2. **[`budget`]** — splits a window across five categories (system prompt,
//!    hot state, history, tool results, output reserve) and reports
//!    violations.
//! 3. **[`hot_state`]** — the small must-survive document with its own token
//!    cap and minimal fallback.
//! 4. **[`prune`]** — drops the oldest droppable history, protecting system
//!    messages and the recent user turns.
//! 5. **[`truncate`]** — head/tail truncation of tool results with
//!    JSON-aware cut points and proportional multi-item budgeting.
//! 6. **[`discipline`]** — [`enforce_context_discipline`] composes the above
//!    into one decision and reports every action taken.
//!
//! None of these functions perform I/O or take locks; they are safe to call
//! from any point in a request path.

pub mod budget;
pub mod discipline;
pub mod estimator;
pub mod hot_state;
pub mod prune;
pub mod truncate;

// Re-export commonly used items at the module level.
pub use budget::{
    BudgetAllocation, BudgetCategory, BudgetRatioOverrides, BudgetViolation, allocate_budget,
    check_budget,
};
pub use discipline::{DisciplineOutcome, DisciplineRequest, enforce_context_discipline};
pub use estimator::{CHARS_PER_TOKEN, estimate_history_tokens, estimate_message_tokens};
pub use hot_state::{HotState, RiskLevel};
pub use prune::{PruneOptions, PruneOutcome, prune_history};
pub use truncate::{
    TruncateOptions, TruncatedToolResult, truncate_tool_result, truncate_tool_results,
};
