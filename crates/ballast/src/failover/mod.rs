//! Failure economics: taxonomy, retry policy, and escalation.
//!
//! Every provider failure flows through the same three stages:
//!
//! - [`taxonomy`] — classify anything (typed failures, raw JSON, bare
//!   strings) into one of seven categories. Unknown inputs degrade to
//!   `unknown` rather than erroring.
//! - [`retry`] — the at-most-one-retry policy. Transient categories get a
//!   single retry; permanent and unknown categories escalate immediately.
//! - [`escalation`] — structured [`EscalationInfo`](escalation::EscalationInfo)
//!   records and their single-line `[ESCALATION] key=value` rendering.
//!
//! Cancellation is modeled as a failure from the `run` closure that
//! classifies as `unknown`, so it is never retried.

pub mod escalation;
pub mod retry;
pub mod taxonomy;

// Re-export commonly used items at the module level.
pub use escalation::{EscalationContext, EscalationInfo, escalate, format_escalation};
pub use retry::{
    BackoffConfig, HookFuture, MAX_RETRIES, NoopHooks, RetryDecision, RetryHooks, RetryOptions,
    decide, execute_with_retry,
};
pub use taxonomy::{CallFailure, ErrorCategory, FailoverReason, categorize, categorize_value};
