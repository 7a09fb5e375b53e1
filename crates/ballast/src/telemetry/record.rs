//! The per-call telemetry record and its closed enums.

use serde::{Deserialize, Serialize};

/// Which stage of the orchestrator issued the call.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CallRole {
    Dispatcher,
    Planner,
    Executor,
    Retriever,
    Subagent,
}

impl CallRole {
    pub fn as_str(self) -> &'static str {
        match self {
            CallRole::Dispatcher => "dispatcher",
            CallRole::Planner => "planner",
            CallRole::Executor => "executor",
            CallRole::Retriever => "retriever",
            CallRole::Subagent => "subagent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dispatcher" => Some(CallRole::Dispatcher),
            "planner" => Some(CallRole::Planner),
            "executor" => Some(CallRole::Executor),
            "retriever" => Some(CallRole::Retriever),
            "subagent" => Some(CallRole::Subagent),
            _ => None,
        }
    }
}

/// Terminal status of a call.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Success,
    Failure,
    Cancelled,
    Timeout,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Failure => "failure",
            CallStatus::Cancelled => "cancelled",
            CallStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(CallStatus::Success),
            "failure" => Some(CallStatus::Failure),
            "cancelled" => Some(CallStatus::Cancelled),
            "timeout" => Some(CallStatus::Timeout),
            _ => None,
        }
    }

    /// Whether this status counts as a failure for scoring purposes.
    pub fn is_failure(self) -> bool {
        !matches!(self, CallStatus::Success)
    }
}

/// Closed set of failure kinds recorded on unsuccessful calls.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Auth,
    Timeout,
    InvalidRequest,
    ServerError,
    Network,
    Cancelled,
    ContextOverflow,
    Parse,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Auth => "auth",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Network => "network",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ContextOverflow => "context_overflow",
            ErrorKind::Parse => "parse",
            ErrorKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rate_limit" => Some(ErrorKind::RateLimit),
            "auth" => Some(ErrorKind::Auth),
            "timeout" => Some(ErrorKind::Timeout),
            "invalid_request" => Some(ErrorKind::InvalidRequest),
            "server_error" => Some(ErrorKind::ServerError),
            "network" => Some(ErrorKind::Network),
            "cancelled" => Some(ErrorKind::Cancelled),
            "context_overflow" => Some(ErrorKind::ContextOverflow),
            "parse" => Some(ErrorKind::Parse),
            "unknown" => Some(ErrorKind::Unknown),
            _ => None,
        }
    }
}

/// Local machine memory pressure observed around the call.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
}

impl MemoryPressure {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryPressure::Low => "low",
            MemoryPressure::Medium => "medium",
            MemoryPressure::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(MemoryPressure::Low),
            "medium" => Some(MemoryPressure::Medium),
            "high" => Some(MemoryPressure::High),
            _ => None,
        }
    }
}

/// One provider call, as emitted on the bus and persisted in the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CallTelemetry {
    pub id: String,
    pub trace_id: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    pub model_id: String,
    pub provider: String,
    pub role: CallRole,
    /// Epoch milliseconds.
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_codes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_bytes: Option<u64>,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_memory_pressure: Option<MemoryPressure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub is_subagent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subagent_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lane: Option<String>,
}

impl CallTelemetry {
    /// A minimal record with the fields every call must carry. Everything
    /// else starts empty and is filled by the emitting site.
    pub fn new(
        id: impl Into<String>,
        model_id: impl Into<String>,
        provider: impl Into<String>,
        role: CallRole,
        started_at: i64,
        status: CallStatus,
    ) -> Self {
        Self {
            id: id.into(),
            trace_id: String::new(),
            request_id: String::new(),
            session_id: None,
            session_key: None,
            model_id: model_id.into(),
            provider: provider.into(),
            role,
            started_at,
            completed_at: None,
            latency_ms: None,
            prompt_tokens: None,
            completion_tokens: None,
            cache_read_tokens: None,
            cache_write_tokens: None,
            total_tokens: None,
            retry_count: 0,
            escalation_codes: None,
            artifact_bytes: None,
            status,
            error_kind: None,
            error_message: None,
            local_memory_pressure: None,
            stop_reason: None,
            is_subagent: false,
            subagent_label: None,
            lane: None,
        }
    }
}
