//! Convenience re-exports for common `ballast` types.
//!
//! Meant to be glob-imported by orchestrator code:
//!
//! ```ignore
//! use ballast::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of call sites: the
//! message model, the discipline orchestrator, retry + escalation, the
//! session guards, and the telemetry entry points. Specialized types
//! (regression thresholds, env snapshots, contract schemas) are intentionally
//! excluded; import those from their modules directly.

// ── Message model ───────────────────────────────────────────────────
pub use crate::{ContentPart, HistoryMessage, MessageContent, MessageRole};

// ── Context discipline ──────────────────────────────────────────────
pub use crate::context::{
    BudgetRatioOverrides, DisciplineRequest, HotState, RiskLevel, allocate_budget,
    enforce_context_discipline, estimate_history_tokens, estimate_message_tokens, prune_history,
    truncate_tool_result,
};

// ── Failure economics ───────────────────────────────────────────────
pub use crate::failover::{
    CallFailure, ErrorCategory, EscalationInfo, NoopHooks, RetryHooks, RetryOptions, categorize,
    execute_with_retry, format_escalation,
};

// ── Sessions ────────────────────────────────────────────────────────
pub use crate::session::{
    AutoCompactConfig, SessionStore, decide_and_record_session_auto_compact,
    decide_session_auto_compact, resolve_auto_compact_config,
};

// ── Telemetry ───────────────────────────────────────────────────────
pub use crate::telemetry::{
    CallRole, CallStatus, CallTelemetry, TelemetryOptions, TelemetryStore, TraceContext,
    current_trace_context, emit_telemetry, with_telemetry, with_trace_context,
};

// ── Credentials ─────────────────────────────────────────────────────
pub use crate::auth::{AuthProfileStore, Credential};
