//! Error taxonomy: classify any provider failure into one of seven
//! categories.
//!
//! Classification sources are consulted in a fixed order: a pre-classified
//! failover reason wins, then the HTTP status, then the OS-level error code,
//! then message pattern matching, and finally `unknown`. The taxonomy accepts
//! arbitrary JSON values (provider SDKs disagree wildly about error shapes)
//! and degrades to `unknown` for anything it cannot read.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// The closed set of failure categories.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimit,
    Auth,
    Timeout,
    InvalidRequest,
    ServerError,
    Network,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::InvalidRequest => "invalid_request",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::Network => "network",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Transient failures may succeed on retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimit
                | ErrorCategory::Timeout
                | ErrorCategory::ServerError
                | ErrorCategory::Network
        )
    }

    /// Permanent failures will not succeed on retry. Note that `unknown` is
    /// neither transient nor permanent; the retry policy treats it as
    /// non-retriable anyway.
    pub fn is_permanent(self) -> bool {
        matches!(self, ErrorCategory::Auth | ErrorCategory::InvalidRequest)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reason attached upstream by a provider failover layer. Takes precedence
/// over everything else during classification.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailoverReason {
    RateLimit,
    Auth,
    Billing,
    Timeout,
    Format,
    Unknown,
}

impl FailoverReason {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "rate_limit" => Some(FailoverReason::RateLimit),
            "auth" => Some(FailoverReason::Auth),
            "billing" => Some(FailoverReason::Billing),
            "timeout" => Some(FailoverReason::Timeout),
            "format" => Some(FailoverReason::Format),
            "unknown" => Some(FailoverReason::Unknown),
            _ => None,
        }
    }

    fn category(self) -> ErrorCategory {
        match self {
            FailoverReason::RateLimit => ErrorCategory::RateLimit,
            FailoverReason::Auth | FailoverReason::Billing => ErrorCategory::Auth,
            FailoverReason::Timeout => ErrorCategory::Timeout,
            FailoverReason::Format => ErrorCategory::InvalidRequest,
            FailoverReason::Unknown => ErrorCategory::Unknown,
        }
    }
}

/// A provider call failure, normalized from whatever shape the caller had.
///
/// Fields mirror the duck-typed error objects seen in the wild: an optional
/// pre-classified reason, an HTTP status, a system error code, and a message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallFailure {
    pub reason: Option<FailoverReason>,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl CallFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_reason(mut self, reason: FailoverReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Normalize an arbitrary JSON value into a failure.
    ///
    /// Objects have `reason`, `status` / `statusCode` (numbers or numeric
    /// strings), `code` (strings only) and `message` extracted. Plain strings
    /// become the message. Anything else (null, numbers, arrays) produces an
    /// empty failure that classifies as `unknown`.
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::message(s.clone()),
            serde_json::Value::Object(obj) => {
                let reason = obj
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .and_then(FailoverReason::parse);
                let status = obj
                    .get("status")
                    .or_else(|| obj.get("statusCode"))
                    .and_then(extract_status);
                let code = obj
                    .get("code")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let message = obj
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_default();
                Self {
                    reason,
                    status,
                    code,
                    message,
                }
            }
            _ => Self::default(),
        }
    }
}

impl From<String> for CallFailure {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

impl From<&str> for CallFailure {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            f.write_str("(no message)")
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Accept numbers and numeric strings for the HTTP status.
pub(crate) fn extract_status(value: &serde_json::Value) -> Option<u16> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn network_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("^(ENOTFOUND|ECONNREFUSED|EHOSTUNREACH|ENETUNREACH|EAI_AGAIN|EPIPE)$")
            .expect("network code regex must compile")
    })
}

fn network_msg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("(?i)network error|fetch failed|dns lookup|socket hang up|ECONNREFUSED")
            .expect("network message regex must compile")
    })
}

fn server_msg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b5\d{2}\b|internal server error|service unavailable|bad gateway")
            .expect("server message regex must compile")
    })
}

fn timeout_msg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("(?i)timed? ?out").expect("timeout regex must compile")
    })
}

fn rate_limit_msg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("(?i)rate limit|too many requests")
            .expect("rate limit regex must compile")
    })
}

fn auth_msg_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("(?i)invalid api key|unauthorized")
            .expect("auth regex must compile")
    })
}

/// Classify a failure. First matching source wins.
pub fn categorize(failure: &CallFailure) -> ErrorCategory {
    // 1. Pre-classified failover reason.
    if let Some(reason) = failure.reason {
        return reason.category();
    }

    // 2. HTTP status.
    if let Some(status) = failure.status {
        match status {
            429 => return ErrorCategory::RateLimit,
            401 | 402 | 403 => return ErrorCategory::Auth,
            408 => return ErrorCategory::Timeout,
            500..=599 => return ErrorCategory::ServerError,
            _ => {}
        }
    }

    // 3. System error code.
    if let Some(code) = &failure.code {
        if network_code_re().is_match(code) {
            return ErrorCategory::Network;
        }
        if code == "ETIMEDOUT" {
            return ErrorCategory::Timeout;
        }
    }

    // 4. Message patterns.
    let msg = &failure.message;
    if !msg.is_empty() {
        if network_msg_re().is_match(msg) {
            return ErrorCategory::Network;
        }
        if server_msg_re().is_match(msg) {
            return ErrorCategory::ServerError;
        }
        if timeout_msg_re().is_match(msg) {
            return ErrorCategory::Timeout;
        }
        if rate_limit_msg_re().is_match(msg) {
            return ErrorCategory::RateLimit;
        }
        if auth_msg_re().is_match(msg) {
            return ErrorCategory::Auth;
        }
    }

    // 5. Nothing recognizable.
    ErrorCategory::Unknown
}

/// Classify an arbitrary JSON value.
pub fn categorize_value(value: &serde_json::Value) -> ErrorCategory {
    categorize(&CallFailure::from_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failover_reason_wins() {
        let failure = CallFailure::message("HTTP 500 internal server error")
            .with_reason(FailoverReason::Billing);
        assert_eq!(categorize(&failure), ErrorCategory::Auth);
    }

    #[test]
    fn status_classification() {
        assert_eq!(categorize_value(&json!({"status": 429})), ErrorCategory::RateLimit);
        assert_eq!(categorize_value(&json!({"status": 401})), ErrorCategory::Auth);
        assert_eq!(categorize_value(&json!({"status": 402})), ErrorCategory::Auth);
        assert_eq!(categorize_value(&json!({"status": 403})), ErrorCategory::Auth);
        assert_eq!(categorize_value(&json!({"status": 408})), ErrorCategory::Timeout);
        assert_eq!(categorize_value(&json!({"status": 503})), ErrorCategory::ServerError);
        assert_eq!(categorize_value(&json!({"status": 418})), ErrorCategory::Unknown);
    }

    #[test]
    fn status_code_field_and_numeric_strings() {
        assert_eq!(
            categorize_value(&json!({"statusCode": "429"})),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            categorize_value(&json!({"status": "503"})),
            ErrorCategory::ServerError
        );
    }

    #[test]
    fn system_codes() {
        assert_eq!(
            categorize(&CallFailure::default().with_code("ECONNREFUSED")),
            ErrorCategory::Network
        );
        assert_eq!(
            categorize(&CallFailure::default().with_code("EAI_AGAIN")),
            ErrorCategory::Network
        );
        assert_eq!(
            categorize(&CallFailure::default().with_code("ETIMEDOUT")),
            ErrorCategory::Timeout
        );
        // Codes must match exactly; prefixes are not enough.
        assert_eq!(
            categorize(&CallFailure::default().with_code("ECONNREFUSED_X")),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn message_patterns() {
        assert_eq!(
            categorize(&CallFailure::message("fetch failed: socket hang up")),
            ErrorCategory::Network
        );
        assert_eq!(
            categorize(&CallFailure::message("upstream returned 502 bad gateway")),
            ErrorCategory::ServerError
        );
        assert_eq!(
            categorize(&CallFailure::message("request timed out after 30s")),
            ErrorCategory::Timeout
        );
        assert_eq!(
            categorize(&CallFailure::message("Rate limit exceeded, slow down")),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            categorize(&CallFailure::message("Invalid API key provided")),
            ErrorCategory::Auth
        );
    }

    #[test]
    fn message_pattern_order_network_before_server() {
        // A message matching both network and 5xx patterns classifies as
        // network, per the fixed pattern order.
        assert_eq!(
            categorize(&CallFailure::message("network error after HTTP 502")),
            ErrorCategory::Network
        );
    }

    #[test]
    fn junk_inputs_degrade_to_unknown() {
        assert_eq!(categorize_value(&json!(null)), ErrorCategory::Unknown);
        assert_eq!(categorize_value(&json!(42)), ErrorCategory::Unknown);
        assert_eq!(categorize_value(&json!([1, 2])), ErrorCategory::Unknown);
        assert_eq!(categorize_value(&json!({})), ErrorCategory::Unknown);
        assert_eq!(
            categorize(&CallFailure::message("something odd happened")),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn string_value_is_a_message() {
        assert_eq!(
            categorize_value(&json!("too many requests")),
            ErrorCategory::RateLimit
        );
    }

    #[test]
    fn classification_is_stable() {
        let failure = CallFailure::message("service unavailable").with_status(503);
        assert_eq!(categorize(&failure), categorize(&failure));
    }

    #[test]
    fn transient_and_permanent_sets() {
        assert!(ErrorCategory::RateLimit.is_transient());
        assert!(ErrorCategory::Timeout.is_transient());
        assert!(ErrorCategory::ServerError.is_transient());
        assert!(ErrorCategory::Network.is_transient());
        assert!(!ErrorCategory::Auth.is_transient());
        assert!(!ErrorCategory::Unknown.is_transient());

        assert!(ErrorCategory::Auth.is_permanent());
        assert!(ErrorCategory::InvalidRequest.is_permanent());
        assert!(!ErrorCategory::Unknown.is_permanent());
        assert!(!ErrorCategory::Network.is_permanent());
    }
}
