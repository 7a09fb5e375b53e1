//! Session auto-compaction guard: decide *when* to compact, never *how*.
//!
//! Compaction (replacing a prefix of the conversation with a summary) is
//! expensive and disruptive, so the guard gates it behind four checks:
//! token metrics must exist, usage must cross the threshold ratio, a
//! rate-limit interval must have elapsed, and tokens must have grown since
//! the last compaction (which is what stops a restart loop from compacting
//! the same session forever). The decide-and-record variant runs the
//! decision and the rate-limit write under one store lock acquisition, so
//! two processes can never both decide to compact the same session.
//!
//! The interval check compares caller-supplied wall-clock values because
//! they must persist across restarts; a host clock that moves backwards
//! makes `now - last_at` negative, which reads as "rate-limited" and fails
//! safe.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::HistoryMessage;
use crate::context::estimator::estimate_message_tokens;
use crate::session::store::SessionStore;

/// Safety multiplier applied to message token estimates when checking
/// whether a single message can be summarized in one pass.
const SUMMARY_ESTIMATE_MULTIPLIER: f64 = 1.2;

/// Fraction of the context window a single message may occupy before it
/// blocks single-pass summarization.
const OVERSIZED_MESSAGE_FRACTION: f64 = 0.5;

/// Resolved guard configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoCompactConfig {
    pub enabled: bool,
    /// Compact once `total_tokens / context_tokens` reaches this ratio.
    pub threshold_context_ratio: f64,
    /// Minimum milliseconds between compactions of one session.
    pub min_interval_ms: i64,
}

impl Default for AutoCompactConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_context_ratio: 0.5,
            min_interval_ms: 600_000,
        }
    }
}

/// Partial configuration; unset fields take the defaults.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct AutoCompactOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_context_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_interval_ms: Option<i64>,
}

/// Apply defaults to a partial configuration.
pub fn resolve_auto_compact_config(overrides: Option<&AutoCompactOverrides>) -> AutoCompactConfig {
    let defaults = AutoCompactConfig::default();
    let Some(o) = overrides else {
        return defaults;
    };
    AutoCompactConfig {
        enabled: o.enabled.unwrap_or(defaults.enabled),
        threshold_context_ratio: o
            .threshold_context_ratio
            .unwrap_or(defaults.threshold_context_ratio),
        min_interval_ms: o.min_interval_ms.unwrap_or(defaults.min_interval_ms),
    }
}

/// Why the guard decided the way it did. Checks run in this order; the first
/// failing check names the reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoCompactReason {
    Disabled,
    MissingTokenMetrics,
    BelowThreshold,
    RateLimited,
    NoTokenGrowth,
    ThresholdHit,
}

impl AutoCompactReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AutoCompactReason::Disabled => "disabled",
            AutoCompactReason::MissingTokenMetrics => "missing-token-metrics",
            AutoCompactReason::BelowThreshold => "below-threshold",
            AutoCompactReason::RateLimited => "rate-limited",
            AutoCompactReason::NoTokenGrowth => "no-token-growth",
            AutoCompactReason::ThresholdHit => "threshold-hit",
        }
    }
}

impl std::fmt::Display for AutoCompactReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoCompactDecision {
    pub should_compact: bool,
    pub reason: AutoCompactReason,
}

/// Inputs to one guard evaluation.
#[derive(Clone, Copy, Debug)]
pub struct AutoCompactInput {
    pub total_tokens: i64,
    pub context_tokens: i64,
    /// Wall-clock epoch ms of the evaluation.
    pub now_ms: i64,
    /// Persisted epoch ms of the last compaction; 0 when never compacted.
    pub last_at_ms: i64,
    /// Persisted token counter at the last compaction; 0 when never.
    pub last_at_tokens: i64,
}

/// Evaluate the guard. Pure: all state comes in through the arguments.
pub fn decide_session_auto_compact(
    cfg: &AutoCompactConfig,
    input: &AutoCompactInput,
) -> AutoCompactDecision {
    let no = |reason| AutoCompactDecision {
        should_compact: false,
        reason,
    };

    if !cfg.enabled {
        return no(AutoCompactReason::Disabled);
    }
    if input.total_tokens <= 0 || input.context_tokens <= 0 {
        return no(AutoCompactReason::MissingTokenMetrics);
    }
    if (input.total_tokens as f64) / (input.context_tokens as f64) < cfg.threshold_context_ratio {
        return no(AutoCompactReason::BelowThreshold);
    }
    if input.last_at_ms > 0 && input.now_ms - input.last_at_ms < cfg.min_interval_ms {
        return no(AutoCompactReason::RateLimited);
    }
    if input.total_tokens <= input.last_at_tokens {
        return no(AutoCompactReason::NoTokenGrowth);
    }
    AutoCompactDecision {
        should_compact: true,
        reason: AutoCompactReason::ThresholdHit,
    }
}

/// Whether any single message is too large to summarize in one pass.
///
/// Estimates are inflated by a safety multiplier; a message above half the
/// context window blocks auto-compaction because the summarizer cannot see
/// it and its replacement summary at the same time.
pub fn has_oversized_message_for_summary(
    messages: &[HistoryMessage],
    context_window_tokens: usize,
) -> bool {
    let limit = context_window_tokens as f64 * OVERSIZED_MESSAGE_FRACTION;
    messages.iter().any(|m| {
        estimate_message_tokens(m) as f64 * SUMMARY_ESTIMATE_MULTIPLIER > limit
    })
}

/// Evaluate the guard against persisted state and record the compaction,
/// all under one store lock acquisition.
///
/// Reads the session's rate-limit fields, decides, and only when the answer
/// is yes writes `now`/`total_tokens` back before the lock is released.
/// Concurrent processes therefore serialize: the second one re-reads the
/// first one's write and lands on `rate-limited` or `no-token-growth`.
pub fn decide_and_record_session_auto_compact(
    store: &SessionStore,
    session_key: &str,
    cfg: &AutoCompactConfig,
    total_tokens: i64,
    context_tokens: i64,
    now_ms: i64,
) -> Result<AutoCompactDecision, String> {
    store.update_entry(session_key, now_ms, |entry| {
        let input = AutoCompactInput {
            total_tokens,
            context_tokens,
            now_ms,
            last_at_ms: entry.session_auto_compact_last_at.unwrap_or(0),
            last_at_tokens: entry
                .session_auto_compact_last_at_tokens
                .map(|t| t as i64)
                .unwrap_or(0),
        };
        let decision = decide_session_auto_compact(cfg, &input);
        if decision.should_compact {
            entry.session_auto_compact_last_at = Some(now_ms);
            entry.session_auto_compact_last_at_tokens = Some(total_tokens.max(0) as u64);
            info!(
                session_key,
                total_tokens, context_tokens, "session auto-compaction triggered"
            );
        } else {
            debug!(
                session_key,
                reason = decision.reason.as_str(),
                "session auto-compaction skipped"
            );
        }
        decision
    })
}

/// Token-pressure warning configuration. Same guard shape as auto-compact,
/// but tripping it only warns the user, so the default threshold is higher
/// and it is on by default.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenWarningConfig {
    pub enabled: bool,
    pub threshold_context_ratio: f64,
    pub min_interval_ms: i64,
}

impl Default for TokenWarningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_context_ratio: 0.8,
            min_interval_ms: 600_000,
        }
    }
}

/// Decide and record a session token-pressure warning under one lock
/// acquisition, rate-limited exactly like the auto-compact guard but against
/// the `session_token_warning_*` fields.
pub fn decide_and_record_session_token_warning(
    store: &SessionStore,
    session_key: &str,
    cfg: &TokenWarningConfig,
    total_tokens: i64,
    context_tokens: i64,
    now_ms: i64,
) -> Result<AutoCompactDecision, String> {
    let guard_cfg = AutoCompactConfig {
        enabled: cfg.enabled,
        threshold_context_ratio: cfg.threshold_context_ratio,
        min_interval_ms: cfg.min_interval_ms,
    };
    store.update_entry(session_key, now_ms, |entry| {
        let input = AutoCompactInput {
            total_tokens,
            context_tokens,
            now_ms,
            last_at_ms: entry.session_token_warning_last_at.unwrap_or(0),
            last_at_tokens: entry
                .session_token_warning_last_at_tokens
                .map(|t| t as i64)
                .unwrap_or(0),
        };
        let decision = decide_session_auto_compact(&guard_cfg, &input);
        if decision.should_compact {
            entry.session_token_warning_last_at = Some(now_ms);
            entry.session_token_warning_last_at_tokens = Some(total_tokens.max(0) as u64);
        }
        decision
    })
}
