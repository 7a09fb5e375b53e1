//! Context window budgeting across named categories.
//!
//! A context window is split into five categories: the system prompt, the hot
//! state document, conversation history, tool results, and a reserve for the
//! model's output. Allocation is ratio-based with validated inputs; checking
//! reports one violation per category that exceeds its allocation.

use serde::{Deserialize, Serialize};

/// Tolerance when validating that ratios sum to at most 1.0.
const RATIO_SUM_TOLERANCE: f64 = 1e-9;

/// Default ratios: 20% system prompt, 0% hot state, 50% history,
/// 15% tool results, 15% output reserve.
pub const DEFAULT_RATIOS: BudgetRatios = BudgetRatios {
    system_prompt: 0.20,
    hot_state: 0.00,
    history: 0.50,
    tool_results: 0.15,
    output_reserve: 0.15,
};

/// The five budget categories.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
    SystemPrompt,
    HotState,
    History,
    ToolResults,
    OutputReserve,
}

impl BudgetCategory {
    pub const ALL: [BudgetCategory; 5] = [
        BudgetCategory::SystemPrompt,
        BudgetCategory::HotState,
        BudgetCategory::History,
        BudgetCategory::ToolResults,
        BudgetCategory::OutputReserve,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BudgetCategory::SystemPrompt => "system_prompt",
            BudgetCategory::HotState => "hot_state",
            BudgetCategory::History => "history",
            BudgetCategory::ToolResults => "tool_results",
            BudgetCategory::OutputReserve => "output_reserve",
        }
    }
}

impl std::fmt::Display for BudgetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full set of category ratios.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BudgetRatios {
    pub system_prompt: f64,
    pub hot_state: f64,
    pub history: f64,
    pub tool_results: f64,
    pub output_reserve: f64,
}

impl Default for BudgetRatios {
    fn default() -> Self {
        DEFAULT_RATIOS
    }
}

impl BudgetRatios {
    fn get(&self, category: BudgetCategory) -> f64 {
        match category {
            BudgetCategory::SystemPrompt => self.system_prompt,
            BudgetCategory::HotState => self.hot_state,
            BudgetCategory::History => self.history,
            BudgetCategory::ToolResults => self.tool_results,
            BudgetCategory::OutputReserve => self.output_reserve,
        }
    }
}

/// Partial ratio overrides. Categories left as `None` take the default ratio.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BudgetRatioOverrides {
    pub system_prompt: Option<f64>,
    pub hot_state: Option<f64>,
    pub history: Option<f64>,
    pub tool_results: Option<f64>,
    pub output_reserve: Option<f64>,
}

impl BudgetRatioOverrides {
    /// Merge overrides onto the defaults.
    fn resolve(&self) -> BudgetRatios {
        BudgetRatios {
            system_prompt: self.system_prompt.unwrap_or(DEFAULT_RATIOS.system_prompt),
            hot_state: self.hot_state.unwrap_or(DEFAULT_RATIOS.hot_state),
            history: self.history.unwrap_or(DEFAULT_RATIOS.history),
            tool_results: self.tool_results.unwrap_or(DEFAULT_RATIOS.tool_results),
            output_reserve: self.output_reserve.unwrap_or(DEFAULT_RATIOS.output_reserve),
        }
    }
}

/// Token allocation per category for a given context window.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BudgetAllocation {
    pub system_prompt: usize,
    pub hot_state: usize,
    pub history: usize,
    pub tool_results: usize,
    pub output_reserve: usize,
}

impl BudgetAllocation {
    pub fn get(&self, category: BudgetCategory) -> usize {
        match category {
            BudgetCategory::SystemPrompt => self.system_prompt,
            BudgetCategory::HotState => self.hot_state,
            BudgetCategory::History => self.history,
            BudgetCategory::ToolResults => self.tool_results,
            BudgetCategory::OutputReserve => self.output_reserve,
        }
    }
}

/// Actual token usage per category. Categories not measured count as 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BudgetUsage {
    pub system_prompt: usize,
    pub hot_state: usize,
    pub history: usize,
    pub tool_results: usize,
    pub output_reserve: usize,
}

impl BudgetUsage {
    pub fn get(&self, category: BudgetCategory) -> usize {
        match category {
            BudgetCategory::SystemPrompt => self.system_prompt,
            BudgetCategory::HotState => self.hot_state,
            BudgetCategory::History => self.history,
            BudgetCategory::ToolResults => self.tool_results,
            BudgetCategory::OutputReserve => self.output_reserve,
        }
    }
}

/// One category exceeding its allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BudgetViolation {
    pub category: BudgetCategory,
    pub allocated: usize,
    pub actual: usize,
    pub over_by: usize,
}

/// Allocate a context window across the five categories.
///
/// The window must be positive. Each supplied ratio must be finite and
/// non-negative, and the resolved ratios must sum to at most 1.0 (within a
/// small tolerance). Each allocation is `floor(window * ratio)`.
pub fn allocate_budget(
    context_window: usize,
    overrides: Option<&BudgetRatioOverrides>,
) -> Result<BudgetAllocation, String> {
    if context_window == 0 {
        return Err("context window must be positive".into());
    }

    let ratios = overrides.copied().unwrap_or_default().resolve();

    let mut sum = 0.0;
    for category in BudgetCategory::ALL {
        let ratio = ratios.get(category);
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(format!(
                "budget ratio for {category} must be a non-negative finite number, got {ratio}"
            ));
        }
        sum += ratio;
    }
    if sum > 1.0 + RATIO_SUM_TOLERANCE {
        return Err(format!("budget ratios sum to {sum}, must be <= 1.0"));
    }

    let alloc = |ratio: f64| (context_window as f64 * ratio).floor() as usize;
    Ok(BudgetAllocation {
        system_prompt: alloc(ratios.system_prompt),
        hot_state: alloc(ratios.hot_state),
        history: alloc(ratios.history),
        tool_results: alloc(ratios.tool_results),
        output_reserve: alloc(ratios.output_reserve),
    })
}

/// Check actual usage against an allocation.
///
/// Returns one violation per category where `actual > allocated`. Exact
/// equality is within budget.
pub fn check_budget(allocation: &BudgetAllocation, actual: &BudgetUsage) -> Vec<BudgetViolation> {
    BudgetCategory::ALL
        .into_iter()
        .filter_map(|category| {
            let allocated = allocation.get(category);
            let used = actual.get(category);
            (used > allocated).then_some(BudgetViolation {
                category,
                allocated,
                actual: used,
                over_by: used - allocated,
            })
        })
        .collect()
}
