//! Structured escalation records built when a call cannot be retried.
//!
//! An escalation is the durable, operator-facing residue of a failed call:
//! the category, where it happened, how long it took, how many retries were
//! burned, and the original error text. The single-line format is what shows
//! up in logs and alerts.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::failover::taxonomy::{CallFailure, ErrorCategory, categorize};

/// Context the caller carries across a provider call for escalation purposes.
#[derive(Clone, Debug)]
pub struct EscalationContext {
    pub provider: String,
    pub model: String,
    pub retry_count: u32,
    pub started_at: Instant,
}

impl EscalationContext {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            retry_count: 0,
            started_at: Instant::now(),
        }
    }
}

/// The structured escalation record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EscalationInfo {
    pub category: ErrorCategory,
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub retry_count: u32,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// ISO-8601 UTC timestamp of when the escalation was built.
    pub escalated_at: String,
}

/// Build an escalation record from a failure and its call context.
pub fn escalate(failure: &CallFailure, ctx: &EscalationContext) -> EscalationInfo {
    EscalationInfo {
        category: categorize(failure),
        provider: ctx.provider.clone(),
        model: ctx.model.clone(),
        latency_ms: ctx.started_at.elapsed().as_millis() as u64,
        retry_count: ctx.retry_count,
        error_message: failure.message.clone(),
        error_code: failure.code.clone(),
        http_status: failure.status,
        escalated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Render the single-line operator-facing form.
///
/// `http=` and `code=` are omitted when absent; the message is always quoted.
pub fn format_escalation(info: &EscalationInfo) -> String {
    let mut line = format!(
        "[ESCALATION] category={} provider={} model={}",
        info.category, info.provider, info.model,
    );
    if let Some(status) = info.http_status {
        line.push_str(&format!(" http={status}"));
    }
    if let Some(code) = &info.error_code {
        line.push_str(&format!(" code={code}"));
    }
    line.push_str(&format!(
        " latency_ms={} retries={} at={} msg={:?}",
        info.latency_ms, info.retry_count, info.escalated_at, info.error_message,
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalate_captures_failure_fields() {
        let failure = CallFailure::message("too many requests")
            .with_status(429)
            .with_code("RL");
        let ctx = EscalationContext::new("anthropic", "claude-sonnet-4");
        let info = escalate(&failure, &ctx);

        assert_eq!(info.category, ErrorCategory::RateLimit);
        assert_eq!(info.provider, "anthropic");
        assert_eq!(info.http_status, Some(429));
        assert_eq!(info.error_code.as_deref(), Some("RL"));
        assert_eq!(info.retry_count, 0);
        // RFC 3339 UTC with trailing Z.
        assert!(info.escalated_at.ends_with('Z'));
    }

    #[test]
    fn format_includes_all_present_fields() {
        let info = EscalationInfo {
            category: ErrorCategory::ServerError,
            provider: "openai".into(),
            model: "gpt-4o".into(),
            latency_ms: 812,
            retry_count: 1,
            error_message: "internal server error".into(),
            error_code: Some("E500".into()),
            http_status: Some(500),
            escalated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let line = format_escalation(&info);

        assert!(line.starts_with("[ESCALATION] category=server_error"));
        assert!(line.contains("provider=openai"));
        assert!(line.contains("http=500"));
        assert!(line.contains("code=E500"));
        assert!(line.contains("latency_ms=812"));
        assert!(line.contains("retries=1"));
        assert!(line.contains("msg=\"internal server error\""));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn format_omits_absent_http_and_code() {
        let info = EscalationInfo {
            category: ErrorCategory::Unknown,
            provider: "groq".into(),
            model: "llama".into(),
            latency_ms: 5,
            retry_count: 0,
            error_message: "mystery".into(),
            error_code: None,
            http_status: None,
            escalated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let line = format_escalation(&info);
        assert!(!line.contains("http="));
        assert!(!line.contains("code="));
        assert!(line.contains("msg=\"mystery\""));
    }

    #[test]
    fn message_with_quotes_stays_single_line() {
        let info = EscalationInfo {
            category: ErrorCategory::Network,
            provider: "p".into(),
            model: "m".into(),
            latency_ms: 0,
            retry_count: 0,
            error_message: "he said \"no\"\nand hung up".into(),
            error_code: None,
            http_status: None,
            escalated_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let line = format_escalation(&info);
        // Debug quoting escapes the newline, keeping the line single.
        assert!(!line.contains('\n'));
        assert!(line.contains("\\n"));
    }
}
