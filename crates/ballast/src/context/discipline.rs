//! The context discipline orchestrator: one call that shapes an outbound
//! payload to fit the context window.
//!
//! Composes the budgeter, the tool-result truncator, and the history pruner
//! into a single decision, and reports every adjustment it made (or the fact
//! that none were needed) as human-readable actions. The system prompt is
//! never modified here: an oversized prompt is reported so the owning layer
//! can shrink it.

use tracing::{debug, warn};

use crate::HistoryMessage;
use crate::context::budget::{
    BudgetAllocation, BudgetRatioOverrides, BudgetUsage, allocate_budget, check_budget,
};
use crate::context::estimator::{CHARS_PER_TOKEN, estimate_history_tokens};
use crate::context::hot_state::HotState;
use crate::context::prune::{PruneOptions, prune_history};
use crate::context::truncate::{TruncateOptions, TruncatedToolResult, truncate_tool_results};

/// Inputs to [`enforce_context_discipline`].
#[derive(Clone, Debug)]
pub struct DisciplineRequest {
    /// Provider context window in tokens.
    pub context_window: usize,
    pub system_prompt: String,
    pub hot_state: Option<HotState>,
    pub messages: Vec<HistoryMessage>,
    pub tool_results: Vec<String>,
    pub budget_overrides: Option<BudgetRatioOverrides>,
    /// Recent user turns protected from pruning. `None` takes the default.
    pub min_recent_turns: Option<usize>,
}

impl DisciplineRequest {
    pub fn new(context_window: usize, system_prompt: impl Into<String>) -> Self {
        Self {
            context_window,
            system_prompt: system_prompt.into(),
            hot_state: None,
            messages: Vec::new(),
            tool_results: Vec::new(),
            budget_overrides: None,
            min_recent_turns: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<HistoryMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tool_results(mut self, results: Vec<String>) -> Self {
        self.tool_results = results;
        self
    }

    pub fn with_hot_state(mut self, hot_state: HotState) -> Self {
        self.hot_state = Some(hot_state);
        self
    }
}

/// The shaped payload plus a log of what was done.
#[derive(Clone, Debug)]
pub struct DisciplineOutcome {
    pub system_prompt: String,
    pub messages: Vec<HistoryMessage>,
    pub tool_results: Vec<TruncatedToolResult>,
    pub budget: BudgetAllocation,
    /// Human-readable record of every adjustment and residual violation.
    pub actions: Vec<String>,
}

/// Shape an outbound payload to fit its context window.
///
/// Fails only on invalid configuration (zero window, bad ratios). All other
/// overruns are handled by truncation/pruning or reported as actions.
pub fn enforce_context_discipline(
    request: DisciplineRequest,
) -> Result<DisciplineOutcome, String> {
    let budget = allocate_budget(request.context_window, request.budget_overrides.as_ref())?;
    let mut actions = Vec::new();

    // System prompt and hot state are measured, never modified. An overrun
    // here is the prompt owner's problem to fix.
    let sys_tokens = request.system_prompt.len() / CHARS_PER_TOKEN;
    let hot_tokens = request
        .hot_state
        .as_ref()
        .map(|h| h.render().len() / CHARS_PER_TOKEN)
        .unwrap_or(0);
    let fixed_budget = budget.system_prompt + budget.hot_state;
    if sys_tokens + hot_tokens > fixed_budget {
        actions.push(format!(
            "system prompt + hot state use {} tokens, over the {} allocated; \
             not truncated here, the prompt owner must shrink it",
            sys_tokens + hot_tokens,
            fixed_budget,
        ));
    }

    // Tool results: truncate against the category budget, in characters.
    let tool_budget_chars = budget.tool_results * CHARS_PER_TOKEN;
    let tool_results = truncate_tool_results(
        &request.tool_results,
        tool_budget_chars,
        &TruncateOptions::default(),
    );
    let truncated_count = tool_results.iter().filter(|r| r.was_truncated).count();
    if truncated_count > 0 {
        actions.push(format!(
            "truncated {truncated_count} of {} tool results to fit {tool_budget_chars} chars",
            tool_results.len(),
        ));
    }

    // History: prune oldest-first against the history budget.
    let prune_opts = PruneOptions {
        min_recent_turns: request
            .min_recent_turns
            .unwrap_or(PruneOptions::default().min_recent_turns),
    };
    let pruned = prune_history(&request.messages, budget.history, &prune_opts);
    if pruned.pruned_count > 0 {
        actions.push(format!(
            "pruned {} of {} history messages ({} -> {} tokens)",
            pruned.pruned_count,
            request.messages.len(),
            pruned.tokens_before,
            pruned.tokens_after,
        ));
    }

    // Re-check everything and surface what is still over.
    let usage = BudgetUsage {
        system_prompt: sys_tokens,
        hot_state: hot_tokens,
        history: pruned.tokens_after,
        tool_results: tool_results
            .iter()
            .map(|r| r.content.len())
            .sum::<usize>()
            / CHARS_PER_TOKEN,
        output_reserve: 0,
    };
    for violation in check_budget(&budget, &usage) {
        warn!(
            category = violation.category.as_str(),
            over_by = violation.over_by,
            "context category still over budget after discipline pass"
        );
        actions.push(format!(
            "warning: {} still over budget by {} tokens ({} > {})",
            violation.category, violation.over_by, violation.actual, violation.allocated,
        ));
    }

    if actions.is_empty() {
        actions.push("All context within budget — no adjustments needed".to_string());
    }
    debug!(actions = actions.len(), "context discipline pass complete");

    Ok(DisciplineOutcome {
        system_prompt: request.system_prompt,
        messages: pruned.messages,
        tool_results,
        budget,
        actions,
    })
}
